//! Shared fakes and builders for tests across the Rudder crates.
//!
//! Gated behind the `test-utils` feature so downstream crates can use them in
//! integration tests without shipping them in release builds.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use semver::Version;

use crate::artifacts::{Artifact, Registry};
use crate::deploy::{
    DeployConfig, DeployablePair, Deployment, DeploymentID, Deployments, ManifestKind, SourceID,
    SourceLocation, State,
};
use crate::errors::{RegistryError, SchedulerError, StateStoreError};
use crate::scheduler::{DeployOutcome, Deployer};
use crate::store::StateStore;

/// Fluent builder for test deployments.
#[derive(Debug, Clone)]
pub struct DeploymentBuilder {
    repo: String,
    dir: String,
    flavor: String,
    cluster: String,
    version: Version,
    config: DeployConfig,
    kind: ManifestKind,
    owners: Vec<String>,
}

/// Start building a deployment of `repo` into `cluster` at `version`.
pub fn deployment(repo: &str, cluster: &str, version: &str) -> DeploymentBuilder {
    DeploymentBuilder {
        repo: repo.to_string(),
        dir: String::new(),
        flavor: String::new(),
        cluster: cluster.to_string(),
        version: Version::parse(version).expect("test version must be semver"),
        config: DeployConfig {
            num_instances: 1,
            ..Default::default()
        },
        kind: ManifestKind::Service,
        owners: Vec::new(),
    }
}

impl DeploymentBuilder {
    pub fn dir(mut self, dir: &str) -> Self {
        self.dir = dir.to_string();
        self
    }

    pub fn flavor(mut self, flavor: &str) -> Self {
        self.flavor = flavor.to_string();
        self
    }

    pub fn instances(mut self, n: u32) -> Self {
        self.config.num_instances = n;
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.config.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn kind(mut self, kind: ManifestKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn schedule(mut self, schedule: &str) -> Self {
        self.config.schedule = schedule.to_string();
        self
    }

    pub fn owner(mut self, owner: &str) -> Self {
        self.owners.push(owner.to_string());
        self
    }

    pub fn build(self) -> Deployment {
        Deployment {
            deploy_config: self.config,
            cluster_name: self.cluster,
            source_id: SourceID::new(SourceLocation::new(self.repo, self.dir), self.version),
            flavor: self.flavor,
            owners: self.owners.into_iter().collect(),
            kind: self.kind,
            user: String::new(),
        }
    }
}

/// In-memory state store with scriptable write conflicts.
#[derive(Default)]
pub struct ScriptedStateStore {
    inner: Mutex<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    state: State,
    conflicts_remaining: u32,
    writes: u32,
}

impl ScriptedStateStore {
    pub fn new(state: State) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                state,
                conflicts_remaining: 0,
                writes: 0,
            }),
        }
    }

    /// Make the next `n` writes fail with a conflict.
    pub fn fail_next_writes_with_conflict(&self, n: u32) {
        self.inner.lock().unwrap().conflicts_remaining = n;
    }

    pub fn write_count(&self) -> u32 {
        self.inner.lock().unwrap().writes
    }

    pub fn replace_state(&self, state: State) {
        self.inner.lock().unwrap().state = state;
    }
}

#[async_trait]
impl StateStore for ScriptedStateStore {
    async fn read_state(&self) -> Result<State, StateStoreError> {
        Ok(self.inner.lock().unwrap().state.clone())
    }

    async fn write_state(&self, state: State) -> Result<(), StateStoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.conflicts_remaining > 0 {
            inner.conflicts_remaining -= 1;
            return Err(StateStoreError::Conflict(
                "scripted conflict from test store".to_string(),
            ));
        }
        inner.state = state;
        inner.writes += 1;
        Ok(())
    }
}

/// What a [`ScriptedDeployer`] was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliedIntent {
    Create(DeploymentID),
    Modify(DeploymentID),
    Delete(DeploymentID),
}

/// Deployer fake: tracks a running set, records every applied intent, and
/// fails scripted calls before succeeding.
#[derive(Default)]
pub struct ScriptedDeployer {
    inner: Mutex<DeployerInner>,
}

#[derive(Default)]
struct DeployerInner {
    running: Deployments,
    failures: HashMap<DeploymentID, VecDeque<SchedulerError>>,
    pending_once: HashMap<DeploymentID, u32>,
    applied: Vec<AppliedIntent>,
}

impl ScriptedDeployer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_running(running: Deployments) -> Self {
        let deployer = Self::default();
        deployer.inner.lock().unwrap().running = running;
        deployer
    }

    pub fn set_running(&self, running: Deployments) {
        self.inner.lock().unwrap().running = running;
    }

    /// Script the next call touching `did` to fail with `err`. Queued errors
    /// are consumed in order before calls succeed.
    pub fn enqueue_failure(&self, did: DeploymentID, err: SchedulerError) {
        self.inner
            .lock()
            .unwrap()
            .failures
            .entry(did)
            .or_default()
            .push_back(err);
    }

    /// Make the next `n` successful create/modify calls for `did` report
    /// [`DeployOutcome::Pending`] instead of `Active`.
    pub fn report_pending(&self, did: DeploymentID, n: u32) {
        self.inner.lock().unwrap().pending_once.insert(did, n);
    }

    pub fn applied(&self) -> Vec<AppliedIntent> {
        self.inner.lock().unwrap().applied.clone()
    }

    fn apply(
        &self,
        did: &DeploymentID,
        intent: AppliedIntent,
        update: impl FnOnce(&mut Deployments),
    ) -> Result<DeployOutcome, SchedulerError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(queue) = inner.failures.get_mut(did) {
            if let Some(err) = queue.pop_front() {
                return Err(err);
            }
        }
        inner.applied.push(intent);
        update(&mut inner.running);
        if let Some(remaining) = inner.pending_once.get_mut(did) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(DeployOutcome::Pending);
            }
        }
        Ok(DeployOutcome::Active)
    }
}

#[async_trait]
impl Deployer for ScriptedDeployer {
    async fn running(&self) -> Result<Deployments, SchedulerError> {
        Ok(self.inner.lock().unwrap().running.clone())
    }

    async fn create(&self, posterior: &Deployment) -> Result<DeployOutcome, SchedulerError> {
        let did = posterior.id();
        let posterior = posterior.clone();
        self.apply(&did.clone(), AppliedIntent::Create(did), move |running| {
            running.insert(posterior);
        })
    }

    async fn modify(&self, pair: &DeployablePair) -> Result<DeployOutcome, SchedulerError> {
        let did = pair.id.clone();
        let posterior = pair
            .posterior
            .clone()
            .expect("modify pair must carry a posterior");
        self.apply(&did.clone(), AppliedIntent::Modify(did), move |running| {
            running.insert(posterior);
        })
    }

    async fn delete(&self, prior: &Deployment) -> Result<(), SchedulerError> {
        let did = prior.id();
        let id = did.clone();
        self.apply(&did, AppliedIntent::Delete(id.clone()), move |running| {
            *running = running.filter(|d| d.id() != id);
        })
        .map(|_| ())
    }
}

/// Registry fake that resolves every source id unless told it's missing.
#[derive(Default)]
pub struct StaticRegistry {
    missing: Mutex<Vec<SourceID>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_missing(&self, source_id: SourceID) {
        self.missing.lock().unwrap().push(source_id);
    }
}

#[async_trait]
impl Registry for StaticRegistry {
    async fn artifact_for(&self, source_id: &SourceID) -> Result<Artifact, RegistryError> {
        if self.missing.lock().unwrap().contains(source_id) {
            return Err(RegistryError::ImageNotFound {
                source_id: source_id.clone(),
            });
        }
        Ok(Artifact {
            image_name: format!(
                "docker.example.com/{}:{}",
                source_id.location.repo, source_id.version
            ),
            source_id: source_id.clone(),
        })
    }
}
