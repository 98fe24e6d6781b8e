//! The diff engine: intended set vs. actual set.
//!
//! `diff` is pure and total. It emits one [`DeployablePair`] per deployment
//! id present on either side, tagged by what reconciliation must do. The
//! output order is the id order of the union, so the same inputs always
//! produce the same output.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::deployment::{Deployment, Deployments};
use super::ids::DeploymentID;

/// What reconciling a pair requires of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairKind {
    /// Intended but not running: the scheduler must create it.
    Create,
    /// Running but not intended: the scheduler must delete it.
    Delete,
    /// Running a different configuration than intended.
    Modify,
    /// Intended and actual agree.
    Unchanged,
}

impl fmt::Display for PairKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Delete => write!(f, "delete"),
            Self::Modify => write!(f, "modify"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Prior and posterior deployment of one id.
///
/// `prior` is what the scheduler is running, `posterior` what the manifests
/// intend. At least one side is always present, and when both are, their ids
/// agree with `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeployablePair {
    pub prior: Option<Deployment>,
    pub posterior: Option<Deployment>,
    #[serde(rename = "ID")]
    pub id: DeploymentID,
}

impl DeployablePair {
    /// A pair for a deployment that should exist but doesn't.
    pub fn create(posterior: Deployment) -> Self {
        let id = posterior.id();
        Self {
            prior: None,
            posterior: Some(posterior),
            id,
        }
    }

    /// A pair for a deployment running without any intent behind it.
    pub fn delete(prior: Deployment) -> Self {
        let id = prior.id();
        Self {
            prior: Some(prior),
            posterior: None,
            id,
        }
    }

    /// A pair with both sides present.
    pub fn change(prior: Deployment, posterior: Deployment) -> Self {
        debug_assert_eq!(prior.id(), posterior.id());
        let id = posterior.id();
        Self {
            prior: Some(prior),
            posterior: Some(posterior),
            id,
        }
    }

    pub fn kind(&self) -> PairKind {
        match (&self.prior, &self.posterior) {
            (None, Some(_)) => PairKind::Create,
            (Some(_), None) => PairKind::Delete,
            (Some(prior), Some(posterior)) => {
                if prior.equal(posterior) {
                    PairKind::Unchanged
                } else {
                    PairKind::Modify
                }
            }
            (None, None) => unreachable!("DeployablePair constructed with neither side"),
        }
    }
}

impl fmt::Display for DeployablePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id)
    }
}

/// Diff the intended set against the actual set.
pub fn diff(intended: &Deployments, actual: &Deployments) -> Vec<DeployablePair> {
    let ids: BTreeSet<&DeploymentID> = intended.ids().chain(actual.ids()).collect();
    ids.into_iter()
        .map(|id| match (actual.get(id), intended.get(id)) {
            (None, Some(post)) => DeployablePair::create(post.clone()),
            (Some(prior), None) => DeployablePair::delete(prior.clone()),
            (Some(prior), Some(post)) => DeployablePair::change(prior.clone(), post.clone()),
            (None, None) => unreachable!("id drawn from the union of both sets"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::config::DeployConfig;
    use crate::deploy::deployment::ManifestKind;
    use crate::deploy::source::{SourceID, SourceLocation};
    use semver::Version;
    use std::collections::BTreeSet as Set;

    fn dep(repo: &str, cluster: &str, version: &str, instances: u32) -> Deployment {
        Deployment {
            deploy_config: DeployConfig {
                num_instances: instances,
                ..Default::default()
            },
            cluster_name: cluster.to_string(),
            source_id: SourceID::new(
                SourceLocation::new(repo, ""),
                Version::parse(version).unwrap(),
            ),
            flavor: String::new(),
            owners: Set::new(),
            kind: ManifestKind::Service,
            user: String::new(),
        }
    }

    fn set(deployments: impl IntoIterator<Item = Deployment>) -> Deployments {
        deployments.into_iter().collect()
    }

    #[test]
    fn diff_of_set_against_itself_is_all_unchanged() {
        let a = set([
            dep("github.com/x/a", "c1", "1.0.0", 2),
            dep("github.com/x/b", "c2", "2.0.0", 1),
        ]);
        let pairs = diff(&a, &a);
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|p| p.kind() == PairKind::Unchanged));
    }

    #[test]
    fn missing_from_actual_is_create() {
        let intended = set([dep("github.com/x/a", "c1", "1.0.0", 2)]);
        let pairs = diff(&intended, &Deployments::new());
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].kind(), PairKind::Create);
        assert!(pairs[0].prior.is_none());
    }

    #[test]
    fn missing_from_intended_is_delete() {
        let actual = set([dep("github.com/x/a", "c1", "1.0.0", 2)]);
        let pairs = diff(&Deployments::new(), &actual);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].kind(), PairKind::Delete);
        assert!(pairs[0].posterior.is_none());
    }

    #[test]
    fn version_difference_is_modify() {
        let intended = set([dep("github.com/x/a", "c1", "1.1.0", 2)]);
        let actual = set([dep("github.com/x/a", "c1", "1.0.0", 2)]);
        let pairs = diff(&intended, &actual);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].kind(), PairKind::Modify);
        assert_eq!(
            pairs[0].prior.as_ref().unwrap().source_id.version,
            Version::new(1, 0, 0)
        );
        assert_eq!(
            pairs[0].posterior.as_ref().unwrap().source_id.version,
            Version::new(1, 1, 0)
        );
    }

    #[test]
    fn diff_is_stable_across_calls() {
        let intended = set([
            dep("github.com/x/a", "c1", "1.0.0", 2),
            dep("github.com/x/b", "c1", "1.0.0", 2),
            dep("github.com/x/c", "c2", "1.0.0", 2),
        ]);
        let actual = set([dep("github.com/x/b", "c1", "0.9.0", 2)]);
        let first = diff(&intended, &actual);
        let second = diff(&intended, &actual);
        assert_eq!(first, second);
    }
}
