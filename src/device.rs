//! ==============================================================================
//! device.rs - capture -> classify -> log loop
//! ==============================================================================
//!
//! purpose:
//!     the device half of the pipeline. every iteration grabs one frame,
//!     classifies it (on device, or by uploading it), appends one line to the
//!     local results file and sleeps for the capture interval.
//!
//! flow of one iteration:
//!
//! ```text
//!     timestamp ──► capture ──(no frame)──► CaptureFailed, sleep interval/2
//!                      │
//!                      ▼
//!              ┌───────┴────────┐
//!              │ local          │ remote
//!              ▼                ▼
//!         LocalModel     RemoteClassifier ──► ingestion server
//!              │                │
//!              ▼                ▼
//!       "local_esp32"   "remote_server_confirm"
//!              └───────┬────────┘
//!                      ▼
//!              local log line ──► Completed, sleep interval
//! ```
//!
//! nothing inside an iteration can stop the loop: every failure is logged
//! and absorbed here.
//!
//! ==============================================================================

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

use crate::classifier::LocalModel;
use crate::config::{AppConfig, ProcessingMode};
use crate::domain::{SOURCE_LOCAL, SOURCE_REMOTE_CONFIRM};
use crate::error::{Error, Result};
use crate::hal::CaptureSource;
use crate::local_log::{LocalEntry, LocalLog};
use crate::remote::RemoteClassifier;

/// camera handle that can be moved onto the blocking pool
pub type SharedCamera = Arc<Mutex<Box<dyn CaptureSource>>>;

/// where frames get classified
#[derive(Debug, Clone)]
pub enum Processor {
    Local(LocalModel),
    Remote(RemoteClassifier),
}

impl Processor {
    pub fn from_config(config: &AppConfig) -> Self {
        match config.device.processing {
            ProcessingMode::Local => Processor::Local(LocalModel::new(&config.classifier)),
            ProcessingMode::Remote => Processor::Remote(RemoteClassifier::new(config.server.upload_url.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    Completed(LocalEntry),
    CaptureFailed,
}

pub struct DeviceLoop {
    camera: SharedCamera,
    processor: Processor,
    log: LocalLog,
    interval: Duration,
}

impl DeviceLoop {
    pub fn new(camera: SharedCamera, processor: Processor, log: LocalLog, interval: Duration) -> Self {
        Self { camera, processor, log, interval }
    }

    pub fn from_config(config: &AppConfig, camera: SharedCamera) -> Self {
        Self::new(
            camera,
            Processor::from_config(config),
            LocalLog::new(config.device.local_log_path.clone()),
            config.device.capture_interval(),
        )
    }

    /// Runs forever.
    pub async fn run(&self) {
        tracing::info!(
            "[DEVICE] Starting capture loop ({}s interval, logging to {})",
            self.interval.as_secs(),
            self.log.path().display()
        );

        loop {
            match self.run_iteration().await {
                IterationOutcome::Completed(entry) => {
                    tracing::info!("[DEVICE] Plant classification: {}", entry.classification);
                    tracing::info!("[DEVICE] Waiting {}s for the next capture...", self.interval.as_secs());
                    tokio::time::sleep(self.interval).await;
                }
                IterationOutcome::CaptureFailed => {
                    tracing::warn!("[DEVICE] Could not capture an image - retrying soon");
                    tokio::time::sleep(self.interval / 2).await;
                }
            }
        }
    }

    /// One pass of the loop, without the trailing sleep.
    pub async fn run_iteration(&self) -> IterationOutcome {
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

        let image = match self.capture().await {
            Ok(Some(bytes)) => {
                tracing::info!("[CAMERA] Captured image ({} bytes)", bytes.len());
                bytes
            }
            Ok(None) => {
                tracing::warn!("[CAMERA] Capture returned no data");
                return IterationOutcome::CaptureFailed;
            }
            Err(e) => {
                tracing::warn!("[CAMERA] Capture error: {}", e);
                return IterationOutcome::CaptureFailed;
            }
        };

        let entry = match &self.processor {
            Processor::Local(model) => {
                tracing::info!("[DEVICE] Local processing selected");
                let label = model.classify(&image).await;
                LocalEntry::new(timestamp, SOURCE_LOCAL, label)
            }
            Processor::Remote(client) => {
                tracing::info!("[DEVICE] Remote processing selected");
                let outcome = client.classify(&image).await;
                if !outcome.is_success() {
                    tracing::warn!("[DEVICE] Remote classification failed: {:?}", outcome);
                }
                LocalEntry::new(timestamp, SOURCE_REMOTE_CONFIRM, outcome.label())
            }
        };

        match self.log.append(&entry).await {
            Ok(()) => tracing::info!("[DEVICE] Stored locally: {}", entry),
            Err(e) => tracing::error!("[DEVICE] Failed to store result locally: {}", e),
        }

        IterationOutcome::Completed(entry)
    }

    async fn capture(&self) -> Result<Option<Vec<u8>>> {
        let camera = self.camera.clone();
        tokio::task::spawn_blocking(move || {
            let mut camera = camera
                .lock()
                .map_err(|_| Error::Capture("camera lock poisoned".into()))?;
            camera.capture()
        })
        .await
        .map_err(|e| Error::Capture(format!("capture task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;
    use crate::domain::LOCAL_LABELS;
    use crate::hal::MockCamera;
    use tempfile::TempDir;

    fn shared(camera: MockCamera) -> SharedCamera {
        let camera: Box<dyn CaptureSource> = Box::new(camera);
        Arc::new(Mutex::new(camera))
    }

    fn local_loop(dir: &TempDir, camera: MockCamera) -> DeviceLoop {
        DeviceLoop::new(
            shared(camera),
            Processor::Local(LocalModel::new(&ClassifierConfig::instant())),
            LocalLog::new(dir.path().join("resultados_locais.txt")),
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn local_iteration_logs_one_line() {
        let dir = TempDir::new().unwrap();
        let device = local_loop(&dir, MockCamera::new());

        let entry = match device.run_iteration().await {
            IterationOutcome::Completed(entry) => entry,
            other => panic!("expected a completed iteration, got {:?}", other),
        };
        assert_eq!(entry.source, SOURCE_LOCAL);
        assert!(LOCAL_LABELS.contains(&entry.classification.as_str()));
        assert!(entry.timestamp.ends_with('Z'));

        let lines = LocalLog::new(dir.path().join("resultados_locais.txt")).read_all().await.unwrap();
        assert_eq!(lines, vec![entry]);
    }

    #[tokio::test]
    async fn failed_capture_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let device = local_loop(&dir, MockCamera::with_script([None]));

        assert_eq!(device.run_iteration().await, IterationOutcome::CaptureFailed);
        assert!(!dir.path().join("resultados_locais.txt").exists());

        // next frame is synthetic, so the loop recovers on its own
        assert!(matches!(device.run_iteration().await, IterationOutcome::Completed(_)));
    }

    /// mock camera that notes the (paused) clock on every capture
    struct TimedCamera {
        inner: MockCamera,
        captured_at: Arc<Mutex<Vec<tokio::time::Instant>>>,
    }

    impl CaptureSource for TimedCamera {
        fn init(&mut self, config: &crate::config::CameraConfig) -> Result<()> {
            self.inner.init(config)
        }

        fn deinit(&mut self) -> Result<()> {
            self.inner.deinit()
        }

        fn capture(&mut self) -> Result<Option<Vec<u8>>> {
            if let Ok(mut times) = self.captured_at.lock() {
                times.push(tokio::time::Instant::now());
            }
            self.inner.capture()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_sleeps_half_interval_after_failed_capture() {
        let dir = TempDir::new().unwrap();
        let captured_at = Arc::new(Mutex::new(Vec::new()));
        let camera: Box<dyn CaptureSource> = Box::new(TimedCamera {
            inner: MockCamera::with_script([None]),
            captured_at: captured_at.clone(),
        });
        let log_path = dir.path().join("resultados_locais.txt");
        let interval = Duration::from_secs(60);
        let device = DeviceLoop::new(
            Arc::new(Mutex::new(camera)),
            Processor::Local(LocalModel::new(&ClassifierConfig::instant())),
            LocalLog::new(log_path.clone()),
            interval,
        );

        let task = tokio::spawn(async move { device.run().await });
        // captures land at 0s, 30s, 90s and 150s; the fifth is due at 210s
        tokio::time::sleep(Duration::from_secs(200)).await;
        task.abort();

        let times = captured_at.lock().unwrap().clone();
        assert_eq!(times.len(), 4);
        assert_eq!(times[1] - times[0], interval / 2);
        assert_eq!(times[2] - times[1], interval);
        assert_eq!(times[3] - times[2], interval);

        // the failed capture was never classified or logged
        let entries = LocalLog::new(log_path).read_all().await.unwrap();
        assert_eq!(entries.len(), 3);
    }

    #[tokio::test]
    async fn unwritable_log_does_not_break_iteration() {
        let dir = TempDir::new().unwrap();
        let device = DeviceLoop::new(
            shared(MockCamera::new()),
            Processor::Local(LocalModel::new(&ClassifierConfig::instant())),
            LocalLog::new(dir.path().join("missing-dir").join("log.txt")),
            Duration::from_millis(10),
        );
        assert!(matches!(device.run_iteration().await, IterationOutcome::Completed(_)));
    }

    #[test]
    fn processor_follows_config() {
        let mut config = AppConfig::default();
        config.device.processing = ProcessingMode::Local;
        assert!(matches!(Processor::from_config(&config), Processor::Local(_)));

        config.device.processing = ProcessingMode::Remote;
        config.server.upload_url = "http://10.0.0.5:5000/process_image".into();
        match Processor::from_config(&config) {
            Processor::Remote(client) => assert_eq!(client.upload_url(), "http://10.0.0.5:5000/process_image"),
            other => panic!("expected remote processor, got {:?}", other),
        }
    }
}
