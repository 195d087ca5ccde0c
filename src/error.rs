//! Error handling for the plant monitor

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::domain::ErrorBody;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error (image store, result store, local log)
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Result store (de)serialization
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    /// Camera could not be brought up, even after a reinit
    #[error("Camera init failed: {0}")]
    CameraInit(String),

    /// Camera driver failed while grabbing a frame
    #[error("Capture error: {0}")]
    Capture(String),

    /// Upload carried no image data
    #[error("{0}")]
    MissingImage(String),

    /// Body could not be read (malformed multipart, over the size limit, ...)
    #[error("Invalid request body: {message}")]
    BadBody { status: StatusCode, message: String },

    #[error("Network error: {0}")]
    Network(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::MissingImage(_) => StatusCode::BAD_REQUEST,
            Error::BadBody { status, .. } => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("[INGEST] Failed to process image: {}", self);
        } else {
            tracing::warn!("[INGEST] Rejected upload: {}", self);
        }

        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_image_is_client_error() {
        let response = Error::MissingImage("Nenhuma imagem fornecida".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn io_is_server_error() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let response = Error::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn bad_body_keeps_its_status() {
        let err = Error::BadBody { status: StatusCode::PAYLOAD_TOO_LARGE, message: "too big".into() };
        assert_eq!(err.into_response().status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn io_message_is_the_raw_error() {
        let err = Error::from(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"));
        assert_eq!(err.to_string(), "read-only");
    }

    #[test]
    fn missing_image_message_is_bare() {
        let err = Error::MissingImage("Nenhuma imagem fornecida".into());
        assert_eq!(err.to_string(), "Nenhuma imagem fornecida");
    }
}
