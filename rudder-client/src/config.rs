//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use rudder_shared::config::RudderConfig;

/// Settings for a [`crate::StatusPoller`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerClientConfig {
    /// Base URL of the server to start polling from.
    pub base_url: String,
    /// Outbound request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Milliseconds between `/status` polls per cluster.
    pub poll_interval_ms: u64,
    /// Consecutive HTTP failures after which a sub-poller gives up.
    pub max_http_errors: u32,
}

impl Default for PollerClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:6380".to_string(),
            timeout_ms: 30_000,
            poll_interval_ms: 500,
            max_http_errors: 10,
        }
    }
}

impl PollerClientConfig {
    pub fn from_rudder_config(base_url: impl Into<String>, config: &RudderConfig) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: config.http.timeout_ms,
            poll_interval_ms: config.poller.interval_ms,
            max_http_errors: config.poller.max_http_errors,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
