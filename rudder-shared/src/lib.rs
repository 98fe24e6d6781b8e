//! # Rudder Shared
//!
//! The deployment model and collaborator contracts shared by the Rudder
//! orchestrator and its clients.
//!
//! Rudder reconciles a desired global state (the GDM: every service's
//! intended deployment in every cluster) against what the downstream
//! scheduler is actually running, and drives the difference to zero. This
//! crate holds everything both sides of that conversation need:
//!
//! - [`deploy`] - source locations, ids, deployments, manifests, and the
//!   diff engine over sets of deployments
//! - [`resolution`] - outcomes of applying individual diffs and the status
//!   of whole resolve runs
//! - [`filter`] - field matchers narrowing which deployments a component
//!   attends to
//! - [`api`] - wire types for the server HTTP surface
//! - [`store`], [`scheduler`], [`artifacts`] - contracts for the external
//!   collaborators (state store, cluster scheduler, image registry)
//! - [`config`], [`logging`], [`errors`] - ambient plumbing

pub mod api;
pub mod artifacts;
pub mod config;
pub mod deploy;
pub mod errors;
pub mod filter;
pub mod logging;
pub mod resolution;
pub mod scheduler;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use artifacts::{Artifact, Registry};
pub use deploy::{
    diff, DeployConfig, DeployablePair, Deployment, DeploymentID, Deployments, ManifestID,
    ManifestKind, PairKind, SourceID, SourceLocation, State,
};
pub use errors::{RegistryError, ResolveError, SchedulerError, StateStoreError, ValidationError};
pub use filter::{FieldMatcher, ResolveFilter};
pub use resolution::{DiffResolution, ResolutionError, ResolutionType, ResolvePhase, ResolveStatus};
pub use scheduler::{DeployOutcome, Deployer};
pub use store::{MemoryStateStore, StateStore};
