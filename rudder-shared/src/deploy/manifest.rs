//! Manifests and their expansion into deployments.
//!
//! A manifest is the human-authored description of one service: its source
//! location, flavor, owners, kind, and a per-cluster table of deploy specs.
//! `State::deployments` expands every manifest against the cluster
//! definitions into the intended [`Deployments`] set for one resolve cycle.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use semver::Version;
use serde::{Deserialize, Serialize};

use super::config::{DeployConfig, Env};
use super::deployment::{Deployment, Deployments, ManifestKind};
use super::ids::ManifestID;
use super::source::{SourceID, SourceLocation};
use crate::errors::ValidationError;

/// The manifest table key whose spec supplies defaults for every cluster.
pub const GLOBAL_SPEC: &str = "Global";

/// One cluster's fragment of a manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DeploySpec {
    /// Version to deploy. Falls back to the `Global` spec's version.
    pub version: Option<Version>,
    pub deploy_config: DeployConfig,
}

/// A cluster known to this orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Cluster {
    pub name: String,
    /// Base URL of the rudder server fronting this cluster.
    #[serde(rename = "URL")]
    pub url: String,
    /// Environment entries injected into every deployment in this cluster,
    /// unless the manifest overrides the key.
    pub env: Env,
}

/// Human-authored description of one service across clusters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Manifest {
    pub source: SourceLocation,
    pub flavor: String,
    pub owners: BTreeSet<String>,
    pub kind: ManifestKind,
    /// Cluster name (or [`GLOBAL_SPEC`]) to deploy spec.
    pub deployments: BTreeMap<String, DeploySpec>,
}

impl Manifest {
    pub fn id(&self) -> ManifestID {
        ManifestID::new(self.source.clone(), self.flavor.clone())
    }
}

/// The full intended state: every manifest plus the cluster definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct State {
    pub manifests: Vec<Manifest>,
    pub clusters: BTreeMap<String, Cluster>,
}

impl State {
    /// Expand every manifest into its per-cluster deployments.
    ///
    /// Each derived deployment is validated; a manifest that names an unknown
    /// cluster or leaves a deployment without a version is an error.
    pub fn deployments(&self) -> Result<Deployments, ValidationError> {
        let mut all = Deployments::new();
        for manifest in &self.manifests {
            for d in self.deployments_from_manifest(manifest)? {
                all.insert(d);
            }
        }
        Ok(all)
    }

    /// Record `deployment` as the intended state for its id, creating the
    /// manifest or cluster entry as needed. This is the write half of the
    /// single-deployment surface.
    pub fn apply_deployment(&mut self, deployment: &Deployment) {
        let mid = deployment.manifest_id();
        let spec = DeploySpec {
            version: Some(deployment.source_id.version.clone()),
            deploy_config: deployment.deploy_config.clone(),
        };
        if let Some(manifest) = self.manifests.iter_mut().find(|m| m.id() == mid) {
            manifest
                .deployments
                .insert(deployment.cluster_name.clone(), spec);
            return;
        }
        self.manifests.push(Manifest {
            source: deployment.source_id.location.clone(),
            flavor: deployment.flavor.clone(),
            owners: deployment.owners.clone(),
            kind: deployment.kind,
            deployments: BTreeMap::from([(deployment.cluster_name.clone(), spec)]),
        });
    }

    fn deployments_from_manifest(
        &self,
        manifest: &Manifest,
    ) -> Result<Vec<Deployment>, ValidationError> {
        let global = manifest.deployments.get(GLOBAL_SPEC);
        let mut out = Vec::new();
        for (cluster_name, spec) in &manifest.deployments {
            if cluster_name == GLOBAL_SPEC {
                continue;
            }
            let cluster = self.clusters.get(cluster_name).ok_or_else(|| {
                ValidationError::new(
                    "cluster",
                    format!(
                        "manifest {} names unknown cluster {cluster_name:?}",
                        manifest.id()
                    ),
                )
            })?;
            let deployment = build_deployment(manifest, cluster, spec, global)?;
            deployment.validate()?;
            out.push(deployment);
        }
        Ok(out)
    }
}

/// Merge a cluster spec over the global spec and the cluster defaults.
fn build_deployment(
    manifest: &Manifest,
    cluster: &Cluster,
    spec: &DeploySpec,
    global: Option<&DeploySpec>,
) -> Result<Deployment, ValidationError> {
    let version = spec
        .version
        .clone()
        .or_else(|| global.and_then(|g| g.version.clone()))
        .ok_or_else(|| {
            ValidationError::new(
                "version",
                format!(
                    "manifest {} has no version for cluster {:?}",
                    manifest.id(),
                    cluster.name
                ),
            )
        })?;

    let mut config = spec.deploy_config.clone();
    if let Some(global) = global {
        let defaults = &global.deploy_config;
        if config.num_instances == 0 {
            config.num_instances = defaults.num_instances;
        }
        if config.resources.is_empty() {
            config.resources = defaults.resources.clone();
        }
        for (key, value) in &defaults.env {
            config.env.entry(key.clone()).or_insert_with(|| value.clone());
        }
        if config.schedule.is_empty() {
            config.schedule = defaults.schedule.clone();
        }
        if config.startup == Default::default() {
            config.startup = defaults.startup.clone();
        }
    }
    for (key, value) in &cluster.env {
        config.env.entry(key.clone()).or_insert_with(|| value.clone());
    }

    Ok(Deployment {
        deploy_config: config,
        cluster_name: cluster.name.clone(),
        source_id: SourceID::new(manifest.source.clone(), version),
        flavor: manifest.flavor.clone(),
        owners: manifest.owners.clone(),
        kind: manifest.kind,
        user: String::new(),
    })
}
