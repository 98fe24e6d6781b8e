//! Source locations and pinned source versions.
//!
//! A [`SourceLocation`] names a buildable piece of software (repository plus
//! an offset directory inside it); a [`SourceID`] pins that location to one
//! semver version. Deployment identity and artifact resolution both hang off
//! these two types.

use std::fmt;
use std::str::FromStr;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// The location of a piece of deployable software: a source repository and a
/// directory offset within it. The empty offset means the repository root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SourceLocation {
    /// Source repository, e.g. `github.com/example/app`.
    pub repo: String,
    /// Directory offset within the repository. Empty for the root.
    #[serde(default)]
    pub dir: String,
}

impl SourceLocation {
    pub fn new(repo: impl Into<String>, dir: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            dir: dir.into(),
        }
    }

    /// A location is usable only when it names a repository.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.repo.is_empty() {
            return Err(ValidationError::new("repo", "source repository is empty"));
        }
        Ok(())
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.repo, self.dir)
    }
}

impl FromStr for SourceLocation {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (repo, dir) = s
            .split_once(',')
            .ok_or_else(|| ValidationError::new("source_location", "expected `repo,dir`"))?;
        Ok(Self::new(repo, dir))
    }
}

/// A precise version of a piece of software: location plus semver version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SourceID {
    pub location: SourceLocation,
    pub version: Version,
}

impl SourceID {
    pub fn new(location: SourceLocation, version: Version) -> Self {
        Self { location, version }
    }
}

impl fmt::Display for SourceID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.location, self.version)
    }
}

/// Parse a user-supplied version tag.
///
/// Strict semver, and build metadata (`+meta`) is rejected: two tags that
/// differ only in metadata would compare equal, which makes them useless as
/// deployment versions.
pub fn parse_version_strict(tag: &str) -> Result<Version, ValidationError> {
    let version = Version::parse(tag)
        .map_err(|e| ValidationError::new("version", format!("{tag:?} is not semver: {e}")))?;
    if !version.build.is_empty() {
        return Err(ValidationError::new(
            "version",
            format!("{tag:?} carries build metadata"),
        ));
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_display_round_trips() {
        let loc = SourceLocation::new("github.com/example/app", "services/api");
        let parsed: SourceLocation = loc.to_string().parse().unwrap();
        assert_eq!(parsed, loc);
    }

    #[test]
    fn location_empty_dir_round_trips() {
        let loc = SourceLocation::new("github.com/example/app", "");
        assert_eq!(loc.to_string(), "github.com/example/app,");
        let parsed: SourceLocation = loc.to_string().parse().unwrap();
        assert_eq!(parsed, loc);
    }

    #[test]
    fn empty_repo_is_invalid() {
        assert!(SourceLocation::new("", "dir").validate().is_err());
    }

    #[test]
    fn strict_version_accepts_plain_semver() {
        assert_eq!(parse_version_strict("1.2.3").unwrap(), Version::new(1, 2, 3));
    }

    #[test]
    fn strict_version_accepts_prerelease() {
        let v = parse_version_strict("1.2.3-rc.1").unwrap();
        assert_eq!(v.pre.as_str(), "rc.1");
    }

    #[test]
    fn strict_version_rejects_build_metadata() {
        assert!(parse_version_strict("1.2.3+build.9").is_err());
    }

    #[test]
    fn strict_version_rejects_garbage() {
        assert!(parse_version_strict("not-a-version").is_err());
    }
}
