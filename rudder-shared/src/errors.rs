//! Error types shared across the Rudder crates.
//!
//! The taxonomy matters more than the shapes: validation errors are rejected
//! at ingress and never enqueued; scheduler errors split into transient
//! (retried on the next resolve cycle) and permanent (recorded, not retried
//! within the run); state-store conflicts are retried once per cycle.

use thiserror::Error;

use crate::deploy::SourceID;

/// A malformed deployment or manifest, rejected before any work is queued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed for {field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Failure applying an intent to the downstream cluster scheduler.
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    /// The scheduler rejected or failed the request with an HTTP status.
    #[error("scheduler returned {status}: {message}")]
    Http { status: u16, message: String },

    /// The scheduler already has a request in flight for this deployment;
    /// expected to clear on a later cycle.
    #[error("request pending in cluster for {deployment_id}")]
    PendingInCluster { deployment_id: String },

    /// The scheduler call exceeded the rectification deadline.
    #[error("scheduler call timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Could not reach the scheduler at all.
    #[error("scheduler unreachable: {0}")]
    Connection(String),

    /// The scheduler rejected the request as malformed.
    #[error("scheduler rejected request: {0}")]
    Invalid(String),
}

impl SchedulerError {
    /// Whether the resolver should expect this to clear on a later cycle.
    ///
    /// 5xx and 429 responses, timeouts, connection failures, and
    /// pending-in-cluster conflicts are transient; everything else is
    /// permanent for the current run.
    pub fn is_transient(&self) -> bool {
        match self {
            SchedulerError::Http { status, .. } => *status >= 500 || *status == 429,
            SchedulerError::PendingInCluster { .. } => true,
            SchedulerError::Timeout { .. } => true,
            SchedulerError::Connection(_) => true,
            SchedulerError::Invalid(_) => false,
        }
    }
}

/// Failure reading or writing the manifest state store.
#[derive(Debug, Clone, Error)]
pub enum StateStoreError {
    /// A concurrent writer won; the caller should re-read and retry once.
    #[error("concurrent write to the state store: {0}")]
    Conflict(String),

    #[error("state store read failed: {0}")]
    Read(String),

    #[error("state store write failed: {0}")]
    Write(String),
}

/// Failure resolving a source id to a deployable artifact.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// No artifact exists for the requested source id. Permanent.
    #[error("no artifact for {source_id}")]
    ImageNotFound { source_id: SourceID },

    /// The registry itself failed; worth retrying on a later cycle.
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

impl RegistryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RegistryError::Unavailable(_))
    }
}

/// A whole resolve cycle failing, as surfaced by the auto-resolver.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("reading intended state: {0}")]
    ReadingState(#[from] StateStoreError),

    #[error("expanding manifests: {0}")]
    ExpandingManifests(#[from] ValidationError),

    #[error("reading actual deployments: {0}")]
    ReadingActual(#[from] SchedulerError),

    #[error("pushing rectification for {deployment_id}: queue full")]
    QueueFull { deployment_id: String },

    #[error("resolution of {failed} of {total} deployments failed")]
    ResolutionsFailed { failed: usize, total: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_hundreds_and_429_are_transient() {
        for status in [500u16, 502, 503, 429] {
            let err = SchedulerError::Http {
                status,
                message: String::new(),
            };
            assert!(err.is_transient(), "{status} should be transient");
        }
    }

    #[test]
    fn other_four_hundreds_are_permanent() {
        for status in [400u16, 404, 409, 422] {
            let err = SchedulerError::Http {
                status,
                message: String::new(),
            };
            assert!(!err.is_transient(), "{status} should be permanent");
        }
    }

    #[test]
    fn pending_and_timeout_are_transient() {
        assert!(SchedulerError::PendingInCluster {
            deployment_id: "github.com/x/a,,:c1".into()
        }
        .is_transient());
        assert!(SchedulerError::Timeout { seconds: 180 }.is_transient());
    }
}
