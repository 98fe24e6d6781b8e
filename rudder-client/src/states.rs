//! Per-cluster resolve states, totally ordered for max-reduction.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The state of one cluster's progress resolving the watched deployment.
///
/// The variant order is the reduction order: the aggregate reported for a
/// whole poll is the maximum across clusters. States at or above
/// [`ResolveState::NotIntended`] are terminal; a sub-poller stops once it
/// reaches one.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ResolveState {
    /// No data received from the server yet.
    #[default]
    NotPolled,
    /// The server is not yet working on the watched deployment; expect the
    /// next resolve cycle to pick it up.
    NotStarted,
    /// The server knows the source location but is resolving a different
    /// version; again, expect the next cycle.
    NotVersion,
    /// The server registered the intent but has made no scheduler request
    /// yet.
    PendingRequest,
    /// The server has acted on the deployment and work is underway.
    InProgress,
    /// Resolution is complete server-side; tasks are starting in the
    /// cluster.
    TasksStarting,
    /// The last `/status` request to this server failed.
    ErrHttp,
    /// The server reported a transient resolution error; polling continues.
    ErrRez,
    /// The cluster does not intend to deploy the watched deployment.
    NotIntended,
    /// Resolution failed permanently for this cluster.
    Failed,
    /// The deployment is resolved and stable.
    Complete,
}

impl ResolveState {
    /// States at which a sub-poller stops polling.
    pub fn is_terminal(self) -> bool {
        self >= ResolveState::NotIntended
    }
}

impl fmt::Display for ResolveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotPolled => "not polled",
            Self::NotStarted => "not started",
            Self::NotVersion => "different version in progress",
            Self::PendingRequest => "request pending",
            Self::InProgress => "in progress",
            Self::TasksStarting => "tasks starting",
            Self::ErrHttp => "status request errored",
            Self::ErrRez => "transient resolve error",
            Self::NotIntended => "not intended",
            Self::Failed => "failed",
            Self::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_matches_reduction_semantics() {
        use ResolveState::*;
        let ordered = [
            NotPolled,
            NotStarted,
            NotVersion,
            PendingRequest,
            InProgress,
            TasksStarting,
            ErrHttp,
            ErrRez,
            NotIntended,
            Failed,
            Complete,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1], "{} must sort below {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn terminal_threshold_is_not_intended() {
        use ResolveState::*;
        for state in [NotPolled, NotStarted, NotVersion, PendingRequest, InProgress, TasksStarting, ErrHttp, ErrRez] {
            assert!(!state.is_terminal(), "{state} must not be terminal");
        }
        for state in [NotIntended, Failed, Complete] {
            assert!(state.is_terminal(), "{state} must be terminal");
        }
    }
}
