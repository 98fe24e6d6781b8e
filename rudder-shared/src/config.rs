//! Configuration for the orchestrator and its clients.
//!
//! Plain serde/TOML structs with defaults that work out of the box. A config
//! file is optional; `${VAR}` references in string values are substituted
//! from the environment at load time.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("parsing config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("environment variable {name} referenced by config is not set")]
    MissingEnvVar { name: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Auto-resolver pacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Seconds to sleep between resolve cycles.
    pub interval_secs: u64,
    /// Deadline for a single rectification; on expiry the scheduler call is
    /// abandoned and a transient error recorded.
    pub rectification_timeout_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            rectification_timeout_secs: 180,
        }
    }
}

impl ResolverConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn rectification_timeout(&self) -> Duration {
        Duration::from_secs(self.rectification_timeout_secs)
    }
}

/// Per-deployment queue sizing and lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Bound of each per-deployment FIFO.
    pub capacity: usize,
    /// Seconds a queue may sit empty before its worker tears it down.
    pub idle_teardown_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            idle_teardown_secs: 60,
        }
    }
}

impl QueueConfig {
    pub fn idle_teardown(&self) -> Duration {
        Duration::from_secs(self.idle_teardown_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity < 8 {
            return Err(ConfigError::Invalid(format!(
                "queues.capacity must be at least 8, got {}",
                self.capacity
            )));
        }
        Ok(())
    }
}

/// Status-poller pacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Milliseconds between `/status` polls per cluster.
    pub interval_ms: u64,
    /// Consecutive HTTP failures after which a sub-poller gives up.
    pub max_http_errors: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            max_http_errors: 10,
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// HTTP server binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub bind_address: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:6380".to_string(),
        }
    }
}

/// Outbound HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            user_agent: format!("rudder/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Top-level configuration for every Rudder component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RudderConfig {
    pub resolver: ResolverConfig,
    pub queues: QueueConfig,
    pub poller: PollerConfig,
    pub web: WebConfig,
    pub http: HttpClientConfig,
}

impl RudderConfig {
    /// Load from a TOML file, substituting `${VAR}` references from the
    /// environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let substituted = substitute_env_vars(&raw)?;
        let config: RudderConfig =
            toml::from_str(&substituted).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.queues.validate()?;
        Ok(config)
    }

    /// Load from the path in `RUDDER_CONFIG`, or defaults when unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("RUDDER_CONFIG") {
            Ok(path) => Self::load(path),
            Err(_) => Ok(Self::default()),
        }
    }
}

/// Replace `${VAR}` references with environment values. An unset variable is
/// an error rather than an empty string.
fn substitute_env_vars(raw: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let name = &after[..end];
        let value = std::env::var(name).map_err(|_| ConfigError::MissingEnvVar {
            name: name.to_string(),
        })?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = RudderConfig::default();
        assert_eq!(config.resolver.interval_secs, 60);
        assert_eq!(config.resolver.rectification_timeout_secs, 180);
        assert_eq!(config.queues.capacity, 10);
        assert_eq!(config.poller.interval_ms, 500);
        assert_eq!(config.poller.max_http_errors, 10);
        assert!(config.queues.validate().is_ok());
    }

    #[test]
    fn partial_toml_overlays_defaults() {
        let config: RudderConfig = toml::from_str(
            r#"
            [resolver]
            interval_secs = 5

            [web]
            bind_address = "0.0.0.0:8080"
            "#,
        )
        .unwrap();
        assert_eq!(config.resolver.interval_secs, 5);
        assert_eq!(config.resolver.rectification_timeout_secs, 180);
        assert_eq!(config.web.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn undersized_queue_capacity_is_rejected() {
        let config = QueueConfig {
            capacity: 4,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_substitution_replaces_references() {
        std::env::set_var("RUDDER_TEST_BIND", "10.0.0.1:9000");
        let out = substitute_env_vars("bind_address = \"${RUDDER_TEST_BIND}\"").unwrap();
        assert_eq!(out, "bind_address = \"10.0.0.1:9000\"");
    }

    #[test]
    fn env_substitution_rejects_unset_variable() {
        let out = substitute_env_vars("addr = \"${RUDDER_DEFINITELY_UNSET_VAR}\"");
        assert!(out.is_err());
    }
}
