//! The container-registry contract: source ids to deployable artifacts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::deploy::SourceID;
use crate::errors::RegistryError;

/// A built, deployable image for one source id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Artifact {
    /// Image name as the scheduler will pull it, e.g. `registry/app:1.2.3`.
    pub image_name: String,
    #[serde(rename = "SourceID")]
    pub source_id: SourceID,
}

/// Resolves a source id to the artifact the scheduler should run.
///
/// A missing artifact is a permanent error for the current resolve run: no
/// amount of retrying deploys an image that was never built.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn artifact_for(&self, source_id: &SourceID) -> Result<Artifact, RegistryError>;
}
