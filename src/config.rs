//! Monitor configuration.
//!
//! Loaded from an optional TOML file plus `CAMWATCH_`-prefixed environment
//! variables, with documented defaults. A missing backend base URL is not an
//! error; the backend checker surfaces it as a FAIL detail.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;

/// Default signaling relay URL (the relay's WebSocket listen address).
pub const DEFAULT_SIGNALING_URL: &str = "ws://127.0.0.1:8765";

/// Default tick interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Heartbeats older than this are considered stale.
pub const DEFAULT_HEARTBEAT_STALE_MS: u64 = 5000;

/// Client-side timeout for the backend health fetch.
pub const DEFAULT_HEALTH_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    pub signaling_url: String,
    /// Base URL of the detection backend; absent means the backend block
    /// fails with a configuration detail.
    #[serde(default)]
    pub backend_base_url: Option<String>,
    pub poll_interval_ms: u64,
    pub heartbeat_stale_ms: u64,
    pub health_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            signaling_url: DEFAULT_SIGNALING_URL.to_string(),
            backend_base_url: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            heartbeat_stale_ms: DEFAULT_HEARTBEAT_STALE_MS,
            health_timeout_ms: DEFAULT_HEALTH_TIMEOUT_MS,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("signaling_url", DEFAULT_SIGNALING_URL)?
            .set_default("poll_interval_ms", DEFAULT_POLL_INTERVAL_MS)?
            .set_default("heartbeat_stale_ms", DEFAULT_HEARTBEAT_STALE_MS)?
            .set_default("health_timeout_ms", DEFAULT_HEALTH_TIMEOUT_MS)?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(Environment::with_prefix("CAMWATCH"))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat_stale_after(&self) -> Duration {
        Duration::from_millis(self.heartbeat_stale_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }
}
