//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `plant.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - role: which half of the pipeline this process runs (device / server).
//!     - NetworkConfig: wifi credentials and the bounded connect timeout.
//!     - ServerConfig: where the ingestion endpoint listens / where the device uploads.
//!     - DeviceConfig: local vs remote processing, capture interval, local log.
//!     - CameraConfig: frame size and jpeg quality.
//!     - ClassifierConfig: artificial delays of the stand-in models.
//!     - StorageConfig: image directory and result store location.
//!
//! every section has defaults, so a partial file is fine.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// environment variable that points at an explicit config file
pub const CONFIG_ENV: &str = "PLANT_CONFIG";

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub role: Role,
    pub network: NetworkConfig,
    pub server: ServerConfig,
    pub device: DeviceConfig,
    pub camera: CameraConfig,
    pub classifier: ClassifierConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// capture -> classify -> local log loop
    #[default]
    Device,
    /// ingestion endpoint
    Server,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NetworkConfig {
    pub ssid: String,
    pub password: String,
    pub interface: String,
    pub connect_timeout_seconds: u64,
    pub poll_interval_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
            interface: "wlan0".to_string(),
            connect_timeout_seconds: 10,
            poll_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_host: String,
    pub port: u16,
    /// full url the device POSTs images to
    pub upload_url: String,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 5000,
            upload_url: "http://127.0.0.1:5000/process_image".to_string(),
            max_upload_bytes: 8 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    Local,
    #[default]
    Remote,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeviceConfig {
    pub processing: ProcessingMode,
    pub capture_interval_seconds: u64,
    pub local_log_path: PathBuf,
}

impl DeviceConfig {
    pub fn capture_interval(&self) -> Duration {
        Duration::from_secs(self.capture_interval_seconds)
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            processing: ProcessingMode::Remote,
            capture_interval_seconds: 60,
            local_log_path: PathBuf::from("resultados_locais.txt"),
        }
    }
}

/// sensor frame sizes, named like the camera firmware names them
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum FrameSize {
    Qvga,
    #[default]
    Hvga,
    Vga,
    Svga,
    Xga,
    Hd,
    Uxga,
}

impl FrameSize {
    /// (width, height) in pixels
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            FrameSize::Qvga => (320, 240),
            FrameSize::Hvga => (480, 320),
            FrameSize::Vga => (640, 480),
            FrameSize::Svga => (800, 600),
            FrameSize::Xga => (1024, 768),
            FrameSize::Hd => (1280, 720),
            FrameSize::Uxga => (1600, 1200),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CameraConfig {
    pub frame_size: FrameSize,
    /// 0-63, lower is better
    pub quality: u8,
    /// still-capture program used by the command camera
    pub command: String,
}

impl CameraConfig {
    /// map the 0-63 (lower is better) scale onto a 1-100 jpeg quality
    pub fn jpeg_quality(&self) -> u8 {
        let q = u32::from(self.quality.min(63));
        (100 - q * 100 / 63).clamp(1, 100) as u8
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            frame_size: FrameSize::Hvga,
            quality: 10,
            command: "rpicam-still".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClassifierConfig {
    pub local_delay_ms: u64,
    pub server_delay_min_ms: u64,
    pub server_delay_max_ms: u64,
}

impl ClassifierConfig {
    /// no artificial delay at all; used by tests
    pub fn instant() -> Self {
        Self { local_delay_ms: 0, server_delay_min_ms: 0, server_delay_max_ms: 0 }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self { local_delay_ms: 2000, server_delay_min_ms: 500, server_delay_max_ms: 2000 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join("images")
    }

    pub fn results_file(&self) -> PathBuf {
        self.data_dir.join("results.json")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: PathBuf::from("data") }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
    }

    /// Load with default fallback
    ///
    /// `PLANT_CONFIG` wins when set; otherwise `config/plant.toml` and
    /// `../config/plant.toml` are tried in order.
    pub fn load_or_default() -> Self {
        let mut paths = Vec::new();
        if let Ok(explicit) = std::env::var(CONFIG_ENV) {
            paths.push(PathBuf::from(explicit));
        }
        paths.push(PathBuf::from("config").join("plant.toml"));
        paths.push(PathBuf::from("..").join("config").join("plant.toml"));

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        tracing::info!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("[CONFIG] Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        tracing::warn!("[CONFIG] No config file found - using defaults");
        Self::default()
    }

    /// Log configuration summary (password redacted)
    pub fn log_summary(&self) {
        let password = if self.network.password.is_empty() { "<unset>" } else { "<redacted>" };
        tracing::info!(
            role = ?self.role,
            processing = ?self.device.processing,
            interval_s = self.device.capture_interval_seconds,
            upload_url = %self.server.upload_url,
            bind = %self.server.bind_addr(),
            ssid = %self.network.ssid,
            password,
            data_dir = %self.storage.data_dir.display(),
            "[CONFIG] Active configuration"
        );
    }
}
