//! Stand-in quality models.
//!
//! Neither model looks at the pixels: both wait for an artificial amount of
//! time and pick a label uniformly at random. The device model is the
//! "lightweight" one (fixed delay, its own label set), the server model is
//! the "heavier" one (random delay, the label set reported to the dashboard).

use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::ClassifierConfig;
use crate::domain::{LOCAL_LABELS, SERVER_LABELS};

/// On-device model.
#[derive(Debug, Clone)]
pub struct LocalModel {
    delay: Duration,
}

impl LocalModel {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self { delay: Duration::from_millis(config.local_delay_ms) }
    }

    pub async fn classify(&self, image: &[u8]) -> &'static str {
        tracing::info!("[LOCAL MODEL] Classifying {} bytes on device", image.len());
        tokio::time::sleep(self.delay).await;
        pick(&LOCAL_LABELS)
    }
}

/// Model run by the ingestion server.
#[derive(Debug, Clone)]
pub struct ServerModel {
    min_delay_ms: u64,
    max_delay_ms: u64,
}

impl ServerModel {
    pub fn new(config: &ClassifierConfig) -> Self {
        let min = config.server_delay_min_ms.min(config.server_delay_max_ms);
        let max = config.server_delay_min_ms.max(config.server_delay_max_ms);
        Self { min_delay_ms: min, max_delay_ms: max }
    }

    pub async fn classify(&self, image_name: &str) -> &'static str {
        let delay_ms = rand::thread_rng().gen_range(self.min_delay_ms..=self.max_delay_ms);
        tracing::info!("[SERVER MODEL] Classifying {} ({} ms)", image_name, delay_ms);
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        pick(&SERVER_LABELS)
    }
}

fn pick(labels: &[&'static str]) -> &'static str {
    labels.choose(&mut rand::thread_rng()).copied().unwrap_or(labels[0])
}
