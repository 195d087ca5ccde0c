//! ==============================================================================
//! server.rs - image ingestion endpoint
//! ==============================================================================
//!
//! purpose:
//!     receives frames from the device, stores them, classifies them with the
//!     server-side stand-in model and records the result for the dashboard.
//!
//! routes:
//!     POST /process_image     raw jpeg body, or multipart form with a `file` field
//!     GET  /api/results       result store, newest first (dashboard feed)
//!     GET  /images/{name}     stored frames
//!     GET  /health            liveness
//!
//! processing order for POST /process_image:
//!     1. filename from the current time (microseconds)
//!     2. write the image          <- the record never points at a missing file
//!     3. classify
//!     4. append the record to results.json
//!     5. respond
//!
//! a failure after step 2 leaves the image on disk without a record; nothing
//! is cleaned up.
//!
//! ==============================================================================

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State},
    http::header::CONTENT_TYPE,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Local};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::classifier::ServerModel;
use crate::config::AppConfig;
use crate::domain::{ProcessImageResponse, ResultRecord, PROCESSED_BY_SERVER};
use crate::error::{Error, Result};
use crate::store::{ImageStore, ResultStore};

const NO_IMAGE: &str = "Nenhuma imagem fornecida";
const NO_FILE_SELECTED: &str = "Nenhum arquivo selecionado";
const EMPTY_FILE: &str = "Arquivo vazio";

// ==============================================================================
// shared state
// ==============================================================================

#[derive(Clone)]
pub struct IngestState {
    pub images: ImageStore,
    pub results: ResultStore,
    pub model: ServerModel,
}

impl IngestState {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            images: ImageStore::new(config.storage.images_dir()),
            results: ResultStore::new(config.storage.results_file()),
            model: ServerModel::new(&config.classifier),
        }
    }
}

// ==============================================================================
// router
// ==============================================================================

pub fn router(state: IngestState, max_upload_bytes: usize) -> Router {
    let images = ServeDir::new(state.images.dir());

    Router::new()
        .route("/process_image", post(process_image))
        .route("/api/results", get(list_results))
        .route("/health", get(health))
        .nest_service("/images", images)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn run_server(config: &AppConfig) -> anyhow::Result<()> {
    let state = IngestState::from_config(config);
    state.images.ensure_dir().await?;

    let app = router(state, config.server.max_upload_bytes);
    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("[INGEST] ✓ Listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

// ==============================================================================
// handlers
// ==============================================================================

async fn process_image(
    State(state): State<IngestState>,
    request: Request,
) -> Result<Json<ProcessImageResponse>> {
    let image = extract_image(request).await?;

    let (taken_at, filename) = loop {
        let now = Local::now();
        let name = image_filename(&now);
        if state.images.save_new(&name, &image).await?.is_some() {
            break (now, name);
        }
        tracing::debug!("[INGEST] {} already taken, regenerating", name);
    };

    let classification = state.model.classify(&filename).await;
    tracing::info!("[INGEST] Classification: {}", classification);

    let record = ResultRecord {
        timestamp: record_timestamp(&taken_at),
        image_filename: filename.clone(),
        classification: classification.to_string(),
        processed_by: PROCESSED_BY_SERVER.to_string(),
    };
    state.results.append(record).await?;

    Ok(Json(ProcessImageResponse {
        classification: classification.to_string(),
        image_saved_as: filename,
    }))
}

/// newest first
async fn list_results(State(state): State<IngestState>) -> Result<Json<Vec<ResultRecord>>> {
    let mut records = state.results.load().await?;
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(Json(records))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

// ==============================================================================
// helpers
// ==============================================================================

/// A multipart `file` part with a filename wins; any other request is
/// taken as a raw image body.
async fn extract_image(request: Request) -> Result<Vec<u8>> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("multipart/form-data"))
        .unwrap_or(false);

    if !is_multipart {
        let body = Bytes::from_request(request, &()).await.map_err(|e| Error::BadBody {
            status: e.status(),
            message: e.body_text(),
        })?;
        if body.is_empty() {
            return Err(Error::MissingImage(NO_IMAGE.into()));
        }
        return Ok(body.to_vec());
    }

    let mut multipart = Multipart::from_request(request, &()).await.map_err(|e| Error::BadBody {
        status: e.status(),
        message: e.body_text(),
    })?;

    while let Some(field) = multipart.next_field().await.map_err(|e| Error::BadBody {
        status: e.status(),
        message: e.body_text(),
    })? {
        if field.name() != Some("file") {
            continue;
        }
        // a part without a filename is a plain form value, not an upload
        let Some(file_name) = field.file_name() else {
            continue;
        };
        if file_name.is_empty() {
            return Err(Error::MissingImage(NO_FILE_SELECTED.into()));
        }

        let bytes = field.bytes().await.map_err(|e| Error::BadBody {
            status: e.status(),
            message: e.body_text(),
        })?;
        if bytes.is_empty() {
            return Err(Error::MissingImage(EMPTY_FILE.into()));
        }
        return Ok(bytes.to_vec());
    }

    Err(Error::MissingImage(NO_IMAGE.into()))
}

/// `plant_YYYYMMDD_HHMMSS_micros.jpg`
pub fn image_filename(at: &DateTime<Local>) -> String {
    at.format("plant_%Y%m%d_%H%M%S_%6f.jpg").to_string()
}

/// iso-8601 with microseconds, local time
pub fn record_timestamp(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}
