//! In-memory collaborators for development and the demo server.
//!
//! These stand in for the real cluster scheduler and image registry until
//! production adapters are wired in. The deployer keeps its "running" set in
//! memory and accepts every intent; the registry resolves every source id to
//! a conventional image name.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use rudder_shared::artifacts::{Artifact, Registry};
use rudder_shared::deploy::{DeployablePair, Deployment, Deployments, SourceID};
use rudder_shared::errors::{RegistryError, SchedulerError};
use rudder_shared::scheduler::{DeployOutcome, Deployer};

/// Scheduler stand-in: every intent is applied to an in-memory running set.
#[derive(Default)]
pub struct DevDeployer {
    running: Mutex<Deployments>,
}

impl DevDeployer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Deployer for DevDeployer {
    async fn running(&self) -> Result<Deployments, SchedulerError> {
        Ok(self.running.lock().unwrap().clone())
    }

    async fn create(&self, posterior: &Deployment) -> Result<DeployOutcome, SchedulerError> {
        info!(deployment_id = %posterior.id(), "dev deployer: create");
        self.running.lock().unwrap().insert(posterior.clone());
        Ok(DeployOutcome::Active)
    }

    async fn modify(&self, pair: &DeployablePair) -> Result<DeployOutcome, SchedulerError> {
        info!(deployment_id = %pair.id, "dev deployer: modify");
        let posterior = pair
            .posterior
            .clone()
            .ok_or_else(|| SchedulerError::Invalid("modify pair without posterior".into()))?;
        self.running.lock().unwrap().insert(posterior);
        Ok(DeployOutcome::Active)
    }

    async fn delete(&self, prior: &Deployment) -> Result<(), SchedulerError> {
        info!(deployment_id = %prior.id(), "dev deployer: delete");
        let id = prior.id();
        let mut running = self.running.lock().unwrap();
        *running = running.filter(|d| d.id() != id);
        Ok(())
    }
}

/// Registry stand-in resolving every source id to `<repo>:<version>`.
#[derive(Default)]
pub struct DevRegistry;

#[async_trait]
impl Registry for DevRegistry {
    async fn artifact_for(&self, source_id: &SourceID) -> Result<Artifact, RegistryError> {
        Ok(Artifact {
            image_name: format!("{}:{}", source_id.location.repo, source_id.version),
            source_id: source_id.clone(),
        })
    }
}
