//! Wifi bootstrap for the device role.
//!
//! The association itself is owned by the OS (NetworkManager on the board);
//! this module only asks for it and waits a bounded amount of time for the
//! link to come up. The result is a plain "network ready" flag: the device
//! keeps running without network and remote uploads fail per call.

use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crate::config::NetworkConfig;
use crate::error::{Error, Result};

pub trait NetworkLink: Send {
    /// kick off association; must not block until connected
    fn begin_connect(&mut self, ssid: &str, password: &str) -> Result<()>;
    fn is_connected(&self) -> bool;
}

/// Blocking. Returns whether the link came up within the configured timeout.
pub fn wait_for_network(link: &mut dyn NetworkLink, config: &NetworkConfig) -> bool {
    if !link.is_connected() {
        tracing::info!("[NETWORK] Connecting to '{}'...", config.ssid);
        if let Err(e) = link.begin_connect(&config.ssid, &config.password) {
            tracing::warn!("[NETWORK] Connect request failed: {}", e);
        }

        let timeout = Duration::from_secs(config.connect_timeout_seconds);
        let poll = Duration::from_millis(config.poll_interval_ms);
        let started = Instant::now();
        while !link.is_connected() && started.elapsed() < timeout {
            std::thread::sleep(poll);
            tracing::debug!("[NETWORK] waiting ({:.0?} elapsed)", started.elapsed());
        }
    }

    if link.is_connected() {
        tracing::info!("[NETWORK] ✓ Connected");
        true
    } else {
        tracing::warn!(
            "[NETWORK] Failed to connect within {}s - continuing offline",
            config.connect_timeout_seconds
        );
        false
    }
}

#[cfg(not(feature = "hardware"))]
pub fn default_link(_config: &NetworkConfig) -> Box<dyn NetworkLink> {
    tracing::info!("[NETWORK] Using MOCK link");
    Box::new(MockLink::connected())
}

#[cfg(feature = "hardware")]
pub fn default_link(config: &NetworkConfig) -> Box<dyn NetworkLink> {
    Box::new(InterfaceLink::new(config.interface.clone()))
}

/// Link that reports connected after a number of polls.
#[derive(Debug, Default)]
pub struct MockLink {
    polls_until_up: Option<u32>,
    polls: AtomicU32,
    pub connect_requests: u32,
}

impl MockLink {
    pub fn connected() -> Self {
        Self { polls_until_up: Some(0), ..Self::default() }
    }

    pub fn up_after(polls: u32) -> Self {
        Self { polls_until_up: Some(polls), ..Self::default() }
    }

    pub fn never() -> Self {
        Self::default()
    }
}

impl NetworkLink for MockLink {
    fn begin_connect(&mut self, _ssid: &str, _password: &str) -> Result<()> {
        self.connect_requests += 1;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        let seen = self.polls.fetch_add(1, Ordering::SeqCst);
        matches!(self.polls_until_up, Some(n) if seen >= n)
    }
}

/// NetworkManager-backed wifi link.
#[derive(Debug)]
pub struct InterfaceLink {
    interface: String,
}

impl InterfaceLink {
    pub fn new(interface: impl Into<String>) -> Self {
        Self { interface: interface.into() }
    }

    fn operstate_path(&self) -> PathBuf {
        PathBuf::from("/sys/class/net").join(&self.interface).join("operstate")
    }
}

impl NetworkLink for InterfaceLink {
    fn begin_connect(&mut self, ssid: &str, password: &str) -> Result<()> {
        let mut cmd = Command::new("nmcli");
        cmd.args(["--wait", "0", "device", "wifi", "connect", ssid]);
        if !password.is_empty() {
            cmd.args(["password", password]);
        }
        cmd.args(["ifname", &self.interface]);

        let status = cmd
            .status()
            .map_err(|e| Error::Network(format!("failed to run nmcli: {}", e)))?;
        if !status.success() {
            return Err(Error::Network(format!("nmcli exited with {}", status)));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        std::fs::read_to_string(self.operstate_path())
            .map(|s| s.trim() == "up")
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config(timeout_s: u64) -> NetworkConfig {
        NetworkConfig {
            ssid: "greenhouse".into(),
            connect_timeout_seconds: timeout_s,
            poll_interval_ms: 5,
            ..NetworkConfig::default()
        }
    }

    #[test]
    fn already_connected_skips_association() {
        let mut link = MockLink::connected();
        assert!(wait_for_network(&mut link, &fast_config(1)));
        assert_eq!(link.connect_requests, 0);
    }

    #[test]
    fn comes_up_within_timeout() {
        let mut link = MockLink::up_after(3);
        assert!(wait_for_network(&mut link, &fast_config(2)));
        assert_eq!(link.connect_requests, 1);
    }

    #[test]
    fn gives_up_after_timeout() {
        let mut link = MockLink::never();
        assert!(!wait_for_network(&mut link, &fast_config(0)));
    }

    #[test]
    fn missing_interface_reads_as_down() {
        let link = InterfaceLink::new("plant-test-does-not-exist0");
        assert!(!link.is_connected());
    }
}
