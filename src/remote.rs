//! ==============================================================================
//! remote.rs - upload client for server-side classification
//! ==============================================================================
//!
//! purpose:
//!     sends one captured frame to the ingestion server and reports what
//!     happened as a `RemoteOutcome`. nothing here returns an error to the
//!     caller: transport problems are an outcome like any other, and the
//!     device loop collapses the outcome to a label only when it logs it.
//!
//! contract:
//!     - single POST, `Content-Type: image/jpeg`, raw bytes as body
//!     - no retry, no backoff, client default timeouts
//!     - the response body is always consumed before returning
//!
//! ==============================================================================

use reqwest::StatusCode;

use crate::domain::{COMMUNICATION_EXCEPTION, COMMUNICATION_FAILURE, MISSING_CLASSIFICATION};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// 200 with a `classification` string
    Classified(String),
    /// 200, json body without a usable `classification`
    MissingLabel,
    /// any non-200 status
    Rejected { status: u16, body: String },
    /// connection error, or a 200 body that is not json
    Transport(String),
}

impl RemoteOutcome {
    /// label recorded in the local log
    pub fn label(&self) -> &str {
        match self {
            RemoteOutcome::Classified(label) => label,
            RemoteOutcome::MissingLabel => MISSING_CLASSIFICATION,
            RemoteOutcome::Rejected { .. } => COMMUNICATION_FAILURE,
            RemoteOutcome::Transport(_) => COMMUNICATION_EXCEPTION,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RemoteOutcome::Classified(_))
    }
}

#[derive(Debug, Clone)]
pub struct RemoteClassifier {
    client: reqwest::Client,
    upload_url: String,
}

impl RemoteClassifier {
    pub fn new(upload_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), upload_url: upload_url.into() }
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }

    pub async fn classify(&self, image: &[u8]) -> RemoteOutcome {
        tracing::info!("[REMOTE] Sending {} bytes to {}", image.len(), self.upload_url);

        let response = match self
            .client
            .post(&self.upload_url)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(image.to_vec())
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("[REMOTE] Upload failed: {}", e);
                return RemoteOutcome::Transport(e.to_string());
            }
        };

        let status = response.status();
        // text() consumes the response and releases the connection
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("[REMOTE] Failed to read response body: {}", e);
                return RemoteOutcome::Transport(e.to_string());
            }
        };

        if status != StatusCode::OK {
            tracing::warn!("[REMOTE] Server answered {}: {}", status.as_u16(), body);
            return RemoteOutcome::Rejected { status: status.as_u16(), body };
        }

        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(json) => match json.get("classification").and_then(|c| c.as_str()) {
                // the label lands on a single log line
                Some(label) if label.contains(['\r', '\n']) => {
                    tracing::warn!("[REMOTE] Classification spans several lines: {:?}", label);
                    RemoteOutcome::MissingLabel
                }
                Some(label) => {
                    tracing::info!("[REMOTE] Server result: {}", json);
                    RemoteOutcome::Classified(label.to_string())
                }
                None => {
                    tracing::warn!("[REMOTE] Response has no classification: {}", json);
                    RemoteOutcome::MissingLabel
                }
            },
            Err(e) => {
                tracing::warn!("[REMOTE] Response is not json: {}", e);
                RemoteOutcome::Transport(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_collapse_to_sentinels() {
        assert_eq!(RemoteOutcome::Classified("Crítico".into()).label(), "Crítico");
        assert_eq!(RemoteOutcome::MissingLabel.label(), MISSING_CLASSIFICATION);
        assert_eq!(
            RemoteOutcome::Rejected { status: 503, body: String::new() }.label(),
            COMMUNICATION_FAILURE
        );
        assert_eq!(RemoteOutcome::Transport("refused".into()).label(), COMMUNICATION_EXCEPTION);
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_failure() {
        // port 9 (discard) is closed on any sane test host
        let client = RemoteClassifier::new("http://127.0.0.1:9/process_image");
        let outcome = client.classify(b"jpeg").await;
        assert!(matches!(outcome, RemoteOutcome::Transport(_)));
        assert_eq!(outcome.label(), COMMUNICATION_EXCEPTION);
    }
}
