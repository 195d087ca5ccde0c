//! Plant quality telemetry.
//!
//! One crate, two roles: the device captures and classifies frames in a loop,
//! the server ingests uploaded frames and keeps the result store the
//! dashboard reads.

pub mod classifier;
pub mod config;
pub mod device;
pub mod domain;
pub mod error;
pub mod hal;
pub mod local_log;
pub mod network;
pub mod remote;
pub mod server;
pub mod store;

pub use config::AppConfig;
pub use domain::ResultRecord;
pub use error::{Error, Result};
