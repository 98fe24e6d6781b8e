//! The downstream cluster scheduler contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::deploy::{DeployablePair, Deployment, Deployments};
use crate::errors::SchedulerError;

/// What the scheduler reports after accepting an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployOutcome {
    /// The deployment is running and stable.
    Active,
    /// The intent was accepted; tasks are still starting in the cluster.
    Pending,
}

/// Applies deployment intents to the downstream cluster scheduler.
///
/// All methods are idempotent from the resolver's point of view: re-applying
/// an intent the scheduler has already satisfied must not fail.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// The set of deployments the scheduler is currently running (the ADS).
    async fn running(&self) -> Result<Deployments, SchedulerError>;

    /// Create a deployment that does not exist yet.
    async fn create(&self, posterior: &Deployment) -> Result<DeployOutcome, SchedulerError>;

    /// Change a running deployment to match the posterior of the pair.
    async fn modify(&self, pair: &DeployablePair) -> Result<DeployOutcome, SchedulerError>;

    /// Remove a running deployment with no intent behind it.
    async fn delete(&self, prior: &Deployment) -> Result<(), SchedulerError>;
}
