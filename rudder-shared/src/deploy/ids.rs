//! Manifest and deployment identifiers.
//!
//! The string form of a [`DeploymentID`] is `repo,dir,flavor:cluster` with
//! empty fields preserved; parsing is the exact inverse of `Display`, so ids
//! round-trip through their string form. That string is the key in queue
//! listings and the `/all-deploy-queues` response.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::source::SourceLocation;
use crate::errors::ValidationError;

/// Identifies a manifest: a source location plus a flavor.
///
/// Flavor distinguishes multiple deployments of the same source in the same
/// cluster (e.g. a canary). Most manifests use the empty flavor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManifestID {
    pub source: SourceLocation,
    #[serde(default)]
    pub flavor: String,
}

impl ManifestID {
    pub fn new(source: SourceLocation, flavor: impl Into<String>) -> Self {
        Self {
            source,
            flavor: flavor.into(),
        }
    }
}

impl fmt::Display for ManifestID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}~{}", self.source, self.flavor)
    }
}

/// Identifies one deployment: a manifest deployed to one cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeploymentID {
    pub manifest_id: ManifestID,
    pub cluster: String,
}

impl DeploymentID {
    pub fn new(manifest_id: ManifestID, cluster: impl Into<String>) -> Self {
        Self {
            manifest_id,
            cluster: cluster.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.manifest_id.source.validate()?;
        if self.cluster.is_empty() {
            return Err(ValidationError::new("cluster", "cluster name is empty"));
        }
        Ok(())
    }
}

impl fmt::Display for DeploymentID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{}:{}",
            self.manifest_id.source.repo,
            self.manifest_id.source.dir,
            self.manifest_id.flavor,
            self.cluster
        )
    }
}

impl FromStr for DeploymentID {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (manifest, cluster) = s.rsplit_once(':').ok_or_else(|| {
            ValidationError::new("deployment_id", "expected `repo,dir,flavor:cluster`")
        })?;
        let mut fields = manifest.split(',');
        let (repo, dir, flavor) = match (fields.next(), fields.next(), fields.next(), fields.next())
        {
            (Some(repo), Some(dir), Some(flavor), None) => (repo, dir, flavor),
            _ => {
                return Err(ValidationError::new(
                    "deployment_id",
                    "expected exactly three comma-separated fields before `:`",
                ))
            }
        };
        Ok(DeploymentID {
            manifest_id: ManifestID::new(SourceLocation::new(repo, dir), flavor),
            cluster: cluster.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn did(repo: &str, dir: &str, flavor: &str, cluster: &str) -> DeploymentID {
        DeploymentID::new(
            ManifestID::new(SourceLocation::new(repo, dir), flavor),
            cluster,
        )
    }

    #[test]
    fn display_matches_wire_format() {
        let d = did("github.com/x/a", "", "", "c1");
        assert_eq!(d.to_string(), "github.com/x/a,,:c1");
    }

    #[test]
    fn parse_inverts_display() {
        let cases = [
            did("github.com/x/a", "", "", "c1"),
            did("github.com/x/a", "svc/api", "canary", "east-1"),
            did("example.org/r", "", "blue", "c2"),
        ];
        for d in cases {
            let parsed: DeploymentID = d.to_string().parse().unwrap();
            assert_eq!(parsed, d, "round-trip failed for {d}");
        }
    }

    #[test]
    fn parse_rejects_missing_cluster_separator() {
        assert!("github.com/x/a,,".parse::<DeploymentID>().is_err());
    }

    #[test]
    fn parse_rejects_wrong_field_count() {
        assert!("github.com/x/a,:c1".parse::<DeploymentID>().is_err());
        assert!("a,b,c,d:c1".parse::<DeploymentID>().is_err());
    }

    #[test]
    fn empty_cluster_fails_validation() {
        assert!(did("github.com/x/a", "", "", "").validate().is_err());
    }
}
