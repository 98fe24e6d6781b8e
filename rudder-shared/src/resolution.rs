//! Resolution outcomes: what happened when one diff was applied, and the
//! accumulated status of a whole resolve run.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::{Deployment, DeploymentID};
use crate::errors::{RegistryError, SchedulerError};

/// How one diff was (or will be) resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionType {
    /// The active deployment already matches the intended one.
    #[serde(rename = "unchanged")]
    Unchanged,
    /// The intent was accepted and tasks are starting in the cluster.
    #[serde(rename = "coming")]
    Coming,
    /// The deployment was missing and has been created.
    #[serde(rename = "created")]
    Created,
    /// The active deployment differed and has been updated.
    #[serde(rename = "updated")]
    Updated,
    /// An unintended deployment was active and has been deleted.
    #[serde(rename = "deleted")]
    Deleted,
}

impl fmt::Display for ResolutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unchanged => "unchanged",
            Self::Coming => "coming",
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        };
        write!(f, "{s}")
    }
}

/// A serializable record of an error hit while resolving one diff.
///
/// `transient` distinguishes errors the resolver will retry on the next
/// cycle from those it won't; the status poller maps the flag to `ErrRez`
/// versus `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResolutionError {
    pub message: String,
    pub transient: bool,
}

impl ResolutionError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<&SchedulerError> for ResolutionError {
    fn from(err: &SchedulerError) -> Self {
        Self {
            message: err.to_string(),
            transient: err.is_transient(),
        }
    }
}

impl From<&RegistryError> for ResolutionError {
    fn from(err: &RegistryError) -> Self {
        Self {
            message: err.to_string(),
            transient: err.is_transient(),
        }
    }
}

/// The result of applying a single diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DiffResolution {
    #[serde(rename = "DeploymentID")]
    pub deployment_id: DeploymentID,
    pub desc: ResolutionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResolutionError>,
}

impl DiffResolution {
    pub fn new(deployment_id: DeploymentID, desc: ResolutionType) -> Self {
        Self {
            deployment_id,
            desc,
            error: None,
        }
    }

    pub fn with_error(
        deployment_id: DeploymentID,
        desc: ResolutionType,
        error: ResolutionError,
    ) -> Self {
        Self {
            deployment_id,
            desc,
            error: Some(error),
        }
    }
}

impl fmt::Display for DiffResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(err) => write!(f, "{} {} ({err})", self.deployment_id, self.desc),
            None => write!(f, "{} {}", self.deployment_id, self.desc),
        }
    }
}

/// Phase of a resolve run. Advisory; serialized as a plain string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvePhase {
    #[default]
    Starting,
    Applying,
    Finished,
    Failed,
}

impl fmt::Display for ResolvePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Applying => "applying",
            Self::Finished => "finished",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Snapshot of one resolve run: when it ran, what it intended, and what each
/// diff resolved to. `finished == None` means the run is still live.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ResolveStatus {
    pub started: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
    pub phase: ResolvePhase,
    pub intended: Vec<Deployment>,
    pub log: Vec<DiffResolution>,
    pub errors: Vec<ResolutionError>,
}

impl ResolveStatus {
    pub fn is_live(&self) -> bool {
        self.finished.is_none()
    }

    /// The first recorded error, if resolution hit any.
    pub fn first_error(&self) -> Option<&ResolutionError> {
        self.errors.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::{ManifestID, SourceLocation};

    fn did() -> DeploymentID {
        DeploymentID::new(
            ManifestID::new(SourceLocation::new("github.com/x/a", ""), ""),
            "c1",
        )
    }

    #[test]
    fn resolution_type_serializes_to_literal_strings() {
        for (ty, want) in [
            (ResolutionType::Unchanged, "\"unchanged\""),
            (ResolutionType::Coming, "\"coming\""),
            (ResolutionType::Created, "\"created\""),
            (ResolutionType::Updated, "\"updated\""),
            (ResolutionType::Deleted, "\"deleted\""),
        ] {
            assert_eq!(serde_json::to_string(&ty).unwrap(), want);
        }
    }

    #[test]
    fn scheduler_error_classification_flows_into_record() {
        let transient = SchedulerError::Http {
            status: 503,
            message: "unavailable".into(),
        };
        assert!(ResolutionError::from(&transient).transient);

        let permanent = SchedulerError::Http {
            status: 404,
            message: "no such request".into(),
        };
        assert!(!ResolutionError::from(&permanent).transient);
    }

    #[test]
    fn error_is_omitted_from_json_when_absent() {
        let rez = DiffResolution::new(did(), ResolutionType::Created);
        let json = serde_json::to_value(&rez).unwrap();
        assert!(json.get("Error").is_none());
    }

    #[test]
    fn status_without_finished_is_live() {
        let mut status = ResolveStatus {
            started: Some(Utc::now()),
            ..Default::default()
        };
        assert!(status.is_live());
        status.finished = Some(Utc::now());
        assert!(!status.is_live());
    }
}
