//! ==============================================================================
//! main.rs - plant monitor entry point
//! ==============================================================================
//!
//! purpose:
//!     one binary for both halves of the pipeline. `role` in plant.toml
//!     decides which half this process runs.
//!
//! responsibilities:
//!     - initialize tracing, then load configuration
//!     - device role: bring up wifi and camera, then run the capture loop
//!     - server role: serve the ingestion endpoint
//!
//! relationships:
//!     - uses: config.rs (plant.toml)
//!     - uses: network.rs, hal.rs, device.rs (device role)
//!     - uses: server.rs, store.rs (server role)
//!
//! architecture:
//!
//!     ┌──────────────────────────┐          ┌──────────────────────────────┐
//!     │ device (role = "device") │          │ server (role = "server")     │
//!     │                          │  POST    │                              │
//!     │  camera ─► classify ─────┼─────────►│  /process_image              │
//!     │              │ (remote)  │  jpeg    │    ├─► data/images/*.jpg     │
//!     │              ▼           │◄─────────┤    └─► data/results.json ◄───┼── dashboard
//!     │   resultados_locais.txt  │  label   │                              │
//!     └──────────────────────────┘          └──────────────────────────────┘
//!
//! ==============================================================================

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use plant_monitor::config::{AppConfig, Role};
use plant_monitor::device::{DeviceLoop, SharedCamera};
use plant_monitor::{hal, network, server};

fn default_filter(level: &str) -> String {
    format!("plant_monitor={},tower_http=info", level)
}

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: logging. RUST_LOG wins; otherwise the level from the config
    // file is applied once it has been read.
    let env_filter = EnvFilter::try_from_default_env().ok();
    let from_env = env_filter.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new(default_filter("info"))));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Plant Monitor v{}", env!("CARGO_PKG_VERSION"));

    // step 2: configuration
    let config = AppConfig::load_or_default();
    if !from_env {
        filter_handle
            .reload(EnvFilter::new(default_filter(&config.logging.level)))
            .context("failed to apply log level")?;
    }
    config.log_summary();

    // step 3: role
    match config.role {
        Role::Server => server::run_server(&config).await,
        Role::Device => run_device(config).await,
    }
}

async fn run_device(config: AppConfig) -> Result<()> {
    // wifi: bounded wait, the loop runs either way
    let network_config = config.network.clone();
    let mut link = network::default_link(&network_config);
    let online = tokio::task::spawn_blocking(move || network::wait_for_network(link.as_mut(), &network_config))
        .await
        .context("network bootstrap task failed")?;
    if !online {
        tracing::warn!("[STARTUP] Running without network - remote uploads will fail");
    }

    // camera: one reinit attempt, then a hard stop
    let camera_config = config.camera.clone();
    let mut camera = hal::default_camera(&camera_config);
    let camera = tokio::task::spawn_blocking(move || {
        hal::init_camera(camera.as_mut(), &camera_config).map(|()| camera)
    })
    .await
    .context("camera init task failed")?
    .context("camera unavailable - reset the device")?;

    let camera: SharedCamera = Arc::new(Mutex::new(camera));
    DeviceLoop::from_config(&config, camera).run().await;
    Ok(())
}
