//! Per-deployment configuration carried by every manifest and deployment.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// Named resource requests for one deployment, e.g. `cpus`, `memory`, `ports`.
pub type Resources = BTreeMap<String, String>;

/// Environment variables injected into the deployed containers.
pub type Env = BTreeMap<String, String>;

/// A volume mounted into the deployed containers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Volume {
    pub host: String,
    pub container: String,
    #[serde(default)]
    pub mode: String,
}

/// Health-check pacing applied while a deployment starts up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Startup {
    /// Skip the readiness check entirely.
    pub skip_check: bool,
    /// Seconds to wait before the first readiness probe.
    pub connect_delay: u32,
    /// Seconds after which startup is considered failed.
    pub timeout: u32,
    /// Seconds between readiness probes.
    pub connect_interval: u32,
}

/// Scheduler-facing configuration for one deployment.
///
/// Equality of deployments is defined field-by-field over this struct (plus
/// the identity fields on [`super::Deployment`]); `diffs` enumerates the
/// differing fields so resolution logs can say what changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DeployConfig {
    pub resources: Resources,
    pub env: Env,
    pub num_instances: u32,
    pub volumes: Vec<Volume>,
    pub startup: Startup,
    /// Cron expression; meaningful only for `Scheduled` deployments.
    pub schedule: String,
    /// Request id override passed through to the downstream scheduler.
    pub singularity_request_id: String,
}

impl DeployConfig {
    /// Field-level differences against another config, as human-readable
    /// lines. Schedule is excluded here; it only matters for scheduled
    /// deployments and is compared by the owning [`super::Deployment`].
    pub fn diffs(&self, other: &DeployConfig) -> Vec<String> {
        let mut diffs = Vec::new();
        let mut diff = |field: &str, this: &dyn fmt::Debug, that: &dyn fmt::Debug| {
            diffs.push(format!("{field}; this: {this:?}; other: {that:?}"));
        };
        if self.resources != other.resources {
            diff("resources", &self.resources, &other.resources);
        }
        if self.env != other.env {
            diff("env", &self.env, &other.env);
        }
        if self.num_instances != other.num_instances {
            diff("num instances", &self.num_instances, &other.num_instances);
        }
        if self.volumes != other.volumes {
            diff("volumes", &self.volumes, &other.volumes);
        }
        if self.startup != other.startup {
            diff("startup", &self.startup, &other.startup);
        }
        if self.singularity_request_id != other.singularity_request_id {
            diff(
                "singularity request id",
                &self.singularity_request_id,
                &other.singularity_request_id,
            );
        }
        diffs
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, value) in &self.resources {
            if value.is_empty() {
                return Err(ValidationError::new(
                    "resources",
                    format!("resource {name:?} has an empty value"),
                ));
            }
        }
        Ok(())
    }
}
