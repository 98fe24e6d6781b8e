//! The deployment model: locations, ids, deployments, manifests, and the
//! diff engine over sets of deployments.

pub mod config;
pub mod deployment;
pub mod diff;
pub mod ids;
pub mod manifest;
pub mod source;

pub use config::{DeployConfig, Env, Resources, Startup, Volume};
pub use deployment::{Deployment, Deployments, ManifestKind};
pub use diff::{diff, DeployablePair, PairKind};
pub use ids::{DeploymentID, ManifestID};
pub use manifest::{Cluster, DeploySpec, Manifest, State, GLOBAL_SPEC};
pub use source::{parse_version_strict, SourceID, SourceLocation};
