//! Fully-resolved deployments and the typed collection over them.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::config::DeployConfig;
use super::ids::{DeploymentID, ManifestID};
use super::source::SourceID;
use crate::errors::ValidationError;

/// The kind of workload a manifest describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestKind {
    /// A long-running HTTP service.
    #[default]
    Service,
    /// A cron-style job; requires a non-empty schedule.
    Scheduled,
    /// A task run on demand, not kept running.
    OnDemand,
}

impl fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service => write!(f, "service"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::OnDemand => write!(f, "on_demand"),
        }
    }
}

impl FromStr for ManifestKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "service" => Ok(Self::Service),
            "scheduled" => Ok(Self::Scheduled),
            "on_demand" => Ok(Self::OnDemand),
            other => Err(ValidationError::new(
                "kind",
                format!("unknown manifest kind {other:?}"),
            )),
        }
    }
}

/// A completely configured deployment of a piece of software: one version,
/// one cluster, all the data needed to hand the downstream scheduler.
///
/// Deployments are derived from manifests on each resolve cycle and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Deployment {
    pub deploy_config: DeployConfig,
    pub cluster_name: String,
    #[serde(rename = "SourceID")]
    pub source_id: SourceID,
    #[serde(default)]
    pub flavor: String,
    #[serde(default)]
    pub owners: BTreeSet<String>,
    pub kind: ManifestKind,
    /// Operator who requested this deployment, when known.
    #[serde(default)]
    pub user: String,
}

impl Deployment {
    pub fn id(&self) -> DeploymentID {
        DeploymentID::new(self.manifest_id(), self.cluster_name.clone())
    }

    pub fn manifest_id(&self) -> ManifestID {
        ManifestID::new(self.source_id.location.clone(), self.flavor.clone())
    }

    /// Whether two deployments are interchangeable from the scheduler's point
    /// of view. Compares the identity fields plus the scheduler-facing config;
    /// schedule participates only for `Scheduled` deployments.
    pub fn equal(&self, other: &Deployment) -> bool {
        self.differences(other).is_empty()
    }

    /// The differing fields against another deployment of the same id.
    pub fn differences(&self, other: &Deployment) -> Vec<String> {
        let mut diffs = Vec::new();
        if self.cluster_name != other.cluster_name {
            diffs.push(format!(
                "cluster name; this: {:?}; other: {:?}",
                self.cluster_name, other.cluster_name
            ));
        }
        if self.source_id != other.source_id {
            diffs.push(format!(
                "source id; this: {}; other: {}",
                self.source_id, other.source_id
            ));
        }
        if self.flavor != other.flavor {
            diffs.push(format!(
                "flavor; this: {:?}; other: {:?}",
                self.flavor, other.flavor
            ));
        }
        if self.kind != other.kind {
            diffs.push(format!(
                "kind; this: {}; other: {}",
                self.kind, other.kind
            ));
        }
        if self.kind == ManifestKind::Scheduled
            && self.deploy_config.schedule != other.deploy_config.schedule
        {
            diffs.push(format!(
                "schedule; this: {:?}; other: {:?}",
                self.deploy_config.schedule, other.deploy_config.schedule
            ));
        }
        if self.owners != other.owners {
            diffs.push(format!(
                "owners; this: {:?}; other: {:?}",
                self.owners, other.owners
            ));
        }
        diffs.extend(self.deploy_config.diffs(&other.deploy_config));
        diffs
    }

    /// Reject deployments that must never reach a queue.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.id().validate()?;
        self.deploy_config.validate()?;
        if self.kind == ManifestKind::Scheduled && self.deploy_config.schedule.is_empty() {
            return Err(ValidationError::new(
                "schedule",
                format!("scheduled deployment {} has no schedule", self.id()),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?} @ {} x{}",
            self.source_id, self.flavor, self.cluster_name, self.deploy_config.num_instances
        )
    }
}

/// A set of deployments keyed by id. Ordered so that iteration, diffing, and
/// wire listings are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deployments(BTreeMap<DeploymentID, Deployment>);

impl Deployments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, keyed by the deployment's own id. Returns the displaced
    /// deployment if the id was already present.
    pub fn insert(&mut self, deployment: Deployment) -> Option<Deployment> {
        self.0.insert(deployment.id(), deployment)
    }

    pub fn get(&self, id: &DeploymentID) -> Option<&Deployment> {
        self.0.get(id)
    }

    pub fn contains(&self, id: &DeploymentID) -> bool {
        self.0.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DeploymentID, &Deployment)> {
        self.0.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &Deployment> {
        self.0.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &DeploymentID> {
        self.0.keys()
    }

    /// The subset satisfying `keep`.
    pub fn filter(&self, keep: impl Fn(&Deployment) -> bool) -> Deployments {
        Deployments(
            self.0
                .iter()
                .filter(|(_, d)| keep(d))
                .map(|(id, d)| (id.clone(), d.clone()))
                .collect(),
        )
    }

    /// The unique deployment satisfying `pred`, if exactly one does.
    pub fn single(&self, pred: impl Fn(&Deployment) -> bool) -> Option<&Deployment> {
        let mut found = None;
        for d in self.0.values() {
            if pred(d) {
                if found.is_some() {
                    return None;
                }
                found = Some(d);
            }
        }
        found
    }
}

impl FromIterator<Deployment> for Deployments {
    fn from_iter<T: IntoIterator<Item = Deployment>>(iter: T) -> Self {
        let mut ds = Deployments::new();
        for d in iter {
            ds.insert(d);
        }
        ds
    }
}

impl IntoIterator for Deployments {
    type Item = (DeploymentID, Deployment);
    type IntoIter = std::collections::btree_map::IntoIter<DeploymentID, Deployment>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::source::SourceLocation;
    use semver::Version;

    fn deployment(cluster: &str, version: Version) -> Deployment {
        Deployment {
            deploy_config: DeployConfig {
                num_instances: 2,
                ..Default::default()
            },
            cluster_name: cluster.to_string(),
            source_id: SourceID::new(SourceLocation::new("github.com/x/a", ""), version),
            flavor: String::new(),
            owners: BTreeSet::new(),
            kind: ManifestKind::Service,
            user: String::new(),
        }
    }

    #[test]
    fn equal_deployments_report_no_differences() {
        let d = deployment("c1", Version::new(1, 0, 0));
        assert!(d.equal(&d.clone()));
    }

    #[test]
    fn version_change_is_a_difference() {
        let a = deployment("c1", Version::new(1, 0, 0));
        let b = deployment("c1", Version::new(1, 1, 0));
        let diffs = a.differences(&b);
        assert_eq!(diffs.len(), 1);
        assert!(diffs[0].starts_with("source id"));
    }

    #[test]
    fn schedule_only_compared_for_scheduled_kind() {
        let mut a = deployment("c1", Version::new(1, 0, 0));
        let mut b = a.clone();
        a.deploy_config.schedule = "0 * * * *".into();
        assert!(a.equal(&b), "service kind must ignore schedule");

        a.kind = ManifestKind::Scheduled;
        b.kind = ManifestKind::Scheduled;
        assert!(!a.equal(&b), "scheduled kind must compare schedule");
    }

    #[test]
    fn owners_compared_as_set() {
        let mut a = deployment("c1", Version::new(1, 0, 0));
        let mut b = a.clone();
        a.owners = BTreeSet::from(["ops@example.com".to_string(), "dev@example.com".to_string()]);
        b.owners = BTreeSet::from(["dev@example.com".to_string(), "ops@example.com".to_string()]);
        assert!(a.equal(&b));
    }

    #[test]
    fn scheduled_without_schedule_is_invalid() {
        let mut d = deployment("c1", Version::new(1, 0, 0));
        d.kind = ManifestKind::Scheduled;
        assert!(d.validate().is_err());
        d.deploy_config.schedule = "@hourly".into();
        assert!(d.validate().is_ok());
    }

    #[test]
    fn single_requires_exactly_one_match() {
        let ds: Deployments = [
            deployment("c1", Version::new(1, 0, 0)),
            deployment("c2", Version::new(1, 0, 0)),
        ]
        .into_iter()
        .collect();
        assert!(ds.single(|d| d.cluster_name == "c1").is_some());
        assert!(ds.single(|_| true).is_none());
        assert!(ds.single(|_| false).is_none());
    }
}
