//! Resolve filters: which deployments a component attends to.
//!
//! Filters are built from operator input (CLI flags, query parameters), so a
//! field can be required-equal, required-absent, or unconstrained. The status
//! poller also derives narrower filters from a base filter: a location-only
//! filter to find a deployment in server intent, and an id filter (location
//! plus version) to decide whether the server is working on *our* version.

use std::fmt;

use crate::deploy::{Deployment, DeploymentID, ManifestID};

/// Constraint on a single string field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldMatcher {
    /// No constraint.
    #[default]
    Any,
    /// The field must be empty.
    Absent,
    /// The field must equal this value.
    Equal(String),
}

impl FieldMatcher {
    pub fn equals(value: impl Into<String>) -> Self {
        Self::Equal(value.into())
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Absent => value.is_empty(),
            Self::Equal(want) => want == value,
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    /// The constrained value, when the matcher is `Equal`.
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Equal(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for FieldMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Absent => write!(f, "!"),
            Self::Equal(v) => write!(f, "{v}"),
        }
    }
}

/// Field matchers narrowing which deployments a component attends to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveFilter {
    pub repo: FieldMatcher,
    pub offset: FieldMatcher,
    pub flavor: FieldMatcher,
    pub tag: FieldMatcher,
    pub revision: FieldMatcher,
    pub cluster: FieldMatcher,
}

impl ResolveFilter {
    /// A filter that admits every deployment.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches_deployment(&self, d: &Deployment) -> bool {
        self.repo.matches(&d.source_id.location.repo)
            && self.offset.matches(&d.source_id.location.dir)
            && self.flavor.matches(&d.flavor)
            && self.tag.matches(&d.source_id.version.to_string())
            && self.cluster.matches(&d.cluster_name)
    }

    pub fn matches_manifest_id(&self, mid: &ManifestID) -> bool {
        self.repo.matches(&mid.source.repo)
            && self.offset.matches(&mid.source.dir)
            && self.flavor.matches(&mid.flavor)
    }

    pub fn matches_deployment_id(&self, did: &DeploymentID) -> bool {
        self.matches_manifest_id(&did.manifest_id) && self.cluster.matches(&did.cluster)
    }

    pub fn matches_cluster_name(&self, name: &str) -> bool {
        self.cluster.matches(name)
    }

    /// This filter reduced to its source location: cluster, tag, and revision
    /// constraints removed.
    pub fn location_only(&self) -> ResolveFilter {
        ResolveFilter {
            repo: self.repo.clone(),
            offset: self.offset.clone(),
            flavor: self.flavor.clone(),
            tag: FieldMatcher::Any,
            revision: FieldMatcher::Any,
            cluster: FieldMatcher::Any,
        }
    }

    /// This filter with only the cluster constraint removed; keeps tag and
    /// revision so version mismatches are still detected.
    pub fn without_cluster(&self) -> ResolveFilter {
        ResolveFilter {
            cluster: FieldMatcher::Any,
            ..self.clone()
        }
    }
}

impl fmt::Display for ResolveFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<repo:{} offset:{} flavor:{} tag:{} revision:{} cluster:{}>",
            self.repo, self.offset, self.flavor, self.tag, self.revision, self.cluster
        )
    }
}
