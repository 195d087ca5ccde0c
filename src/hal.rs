//! ==============================================================================
//! hal.rs - Camera Abstraction Layer
//! ==============================================================================
//!
//! purpose:
//!     provides a unified interface for grabbing jpeg frames.
//!     abstracts away the difference between running on the device
//!     (a still-capture program driving the sensor) and a development
//!     machine (synthetic frames).
//!
//! design:
//!     - "Compile Anywhere": both implementations always build; the
//!       `hardware` feature only changes which one `default_camera` returns.
//!     - blocking calls; async callers go through `spawn_blocking`.
//!     - an empty frame is not an error, it is `Ok(None)`.
//!
//! relationships:
//!     - used by: device.rs (capture step), main.rs (startup init)
//!     - uses: std::process::Command (rpicam-still)
//!
//! ==============================================================================

use std::collections::VecDeque;
use std::process::Command;

use crate::config::CameraConfig;
use crate::error::{Error, Result};

pub trait CaptureSource: Send {
    fn init(&mut self, config: &CameraConfig) -> Result<()>;
    fn deinit(&mut self) -> Result<()>;
    /// one jpeg frame, `None` when the sensor handed back nothing
    fn capture(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Bring the camera up. On failure the driver is torn down and one more
/// init is attempted before giving up.
pub fn init_camera(camera: &mut dyn CaptureSource, config: &CameraConfig) -> Result<()> {
    let first = match camera.init(config) {
        Ok(()) => {
            tracing::info!("[CAMERA] Initialized ({:?}, quality {})", config.frame_size, config.quality);
            return Ok(());
        }
        Err(e) => e,
    };

    tracing::warn!("[CAMERA] Init failed: {} - retrying after deinit", first);
    if let Err(e) = camera.deinit() {
        tracing::debug!("[CAMERA] Deinit during recovery failed: {}", e);
    }

    match camera.init(config) {
        Ok(()) => {
            tracing::info!("[CAMERA] Initialized on second attempt");
            Ok(())
        }
        Err(second) => {
            tracing::error!("[CAMERA] Init failed twice: {}", second);
            Err(Error::CameraInit(format!("{} (first attempt: {})", second, first)))
        }
    }
}

/// Pick the camera for this build.
#[cfg(not(feature = "hardware"))]
pub fn default_camera(_config: &CameraConfig) -> Box<dyn CaptureSource> {
    tracing::info!("[CAMERA] Using MOCK camera (no hardware access)");
    Box::new(MockCamera::new())
}

#[cfg(feature = "hardware")]
pub fn default_camera(config: &CameraConfig) -> Box<dyn CaptureSource> {
    tracing::info!("[CAMERA] Using REAL camera ({})", config.command);
    Box::new(CommandCamera::new(config.command.clone()))
}

// ==============================================================================================
// MOCK IMPLEMENTATION (For development machines and tests)
// ==============================================================================================

/// Synthetic camera. Scripted frames are served first, then an endless
/// supply of tiny fake jpegs.
#[derive(Debug, Default)]
pub struct MockCamera {
    script: VecDeque<Option<Vec<u8>>>,
    init_failures: u32,
    pub init_calls: u32,
    pub deinit_calls: u32,
    frames_served: u32,
}

impl MockCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// serve these results (in order) before falling back to synthetic frames
    pub fn with_script(script: impl IntoIterator<Item = Option<Vec<u8>>>) -> Self {
        Self { script: script.into_iter().collect(), ..Self::default() }
    }

    /// make the next `count` init calls fail
    pub fn failing_init(mut self, count: u32) -> Self {
        self.init_failures = count;
        self
    }

    fn synthetic_frame(&mut self) -> Vec<u8> {
        self.frames_served += 1;
        let mut frame = vec![0xFF, 0xD8, 0xFF, 0xE0];
        frame.extend_from_slice(&self.frames_served.to_be_bytes());
        frame.extend_from_slice(&[0xFF, 0xD9]);
        frame
    }
}

impl CaptureSource for MockCamera {
    fn init(&mut self, config: &CameraConfig) -> Result<()> {
        self.init_calls += 1;
        if self.init_failures > 0 {
            self.init_failures -= 1;
            return Err(Error::CameraInit("mock sensor not responding".into()));
        }
        tracing::debug!("[MOCK CAMERA] init {:?}", config.frame_size.dimensions());
        Ok(())
    }

    fn deinit(&mut self) -> Result<()> {
        self.deinit_calls += 1;
        Ok(())
    }

    fn capture(&mut self) -> Result<Option<Vec<u8>>> {
        match self.script.pop_front() {
            Some(Some(bytes)) if bytes.is_empty() => Ok(None),
            Some(scripted) => Ok(scripted),
            None => Ok(Some(self.synthetic_frame())),
        }
    }
}

// ==============================================================================================
// REAL IMPLEMENTATION (rpicam-still writing jpeg to stdout)
// ==============================================================================================

#[derive(Debug)]
pub struct CommandCamera {
    program: String,
    args: Vec<String>,
}

impl CommandCamera {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }
}

impl CaptureSource for CommandCamera {
    fn init(&mut self, config: &CameraConfig) -> Result<()> {
        let output = Command::new(&self.program)
            .arg("--list-cameras")
            .output()
            .map_err(|e| Error::CameraInit(format!("failed to run {}: {}", self.program, e)))?;

        let listing = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() || listing.contains("No cameras available") {
            return Err(Error::CameraInit(format!("no camera detected by {}", self.program)));
        }

        let (width, height) = config.frame_size.dimensions();
        self.args = vec![
            "-n".into(),
            "-t".into(),
            "1".into(),
            "-e".into(),
            "jpg".into(),
            "--width".into(),
            width.to_string(),
            "--height".into(),
            height.to_string(),
            "-q".into(),
            config.jpeg_quality().to_string(),
            "-o".into(),
            "-".into(),
        ];
        Ok(())
    }

    fn deinit(&mut self) -> Result<()> {
        self.args.clear();
        Ok(())
    }

    fn capture(&mut self) -> Result<Option<Vec<u8>>> {
        if self.args.is_empty() {
            return Err(Error::Capture("camera not initialized".into()));
        }

        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|e| Error::Capture(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Capture(stderr.trim().to_string()));
        }

        if output.stdout.is_empty() {
            Ok(None)
        } else {
            Ok(Some(output.stdout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_recovers_after_one_failure() {
        let mut camera = MockCamera::new().failing_init(1);
        init_camera(&mut camera, &CameraConfig::default()).unwrap();
        assert_eq!(camera.init_calls, 2);
        assert_eq!(camera.deinit_calls, 1);
    }

    #[test]
    fn init_gives_up_after_second_failure() {
        let mut camera = MockCamera::new().failing_init(2);
        let err = init_camera(&mut camera, &CameraConfig::default()).unwrap_err();
        assert!(matches!(err, Error::CameraInit(_)));
        assert_eq!(camera.init_calls, 2);
    }

    #[test]
    fn empty_frames_come_back_as_none() {
        let mut camera = MockCamera::with_script([Some(Vec::new()), None]);
        assert_eq!(camera.capture().unwrap(), None);
        assert_eq!(camera.capture().unwrap(), None);
        let frame = camera.capture().unwrap().unwrap();
        assert_eq!(&frame[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn command_camera_refuses_capture_before_init() {
        let mut camera = CommandCamera::new("rpicam-still");
        assert!(matches!(camera.capture(), Err(Error::Capture(_))));
    }

    #[test]
    fn command_camera_init_fails_for_missing_program() {
        let mut camera = CommandCamera::new("definitely-not-a-camera-binary");
        let err = camera.init(&CameraConfig::default()).unwrap_err();
        assert!(matches!(err, Error::CameraInit(_)));
    }
}
