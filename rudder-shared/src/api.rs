//! Wire types for the server HTTP surface.
//!
//! Shared between the axum handlers in `rudder-orchestration` and the
//! reqwest client in `rudder-client` so the two cannot drift. Field names are
//! PascalCase on the wire.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::deploy::Deployment;
use crate::resolution::{DiffResolution, ResolveStatus};

/// One sibling server fronting a cluster. `GET /servers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerDescriptor {
    pub cluster_name: String,
    #[serde(rename = "URL")]
    pub url: String,
}

/// Response body of `GET /servers`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerListData {
    pub servers: Vec<ServerDescriptor>,
}

/// Response body of `GET /gdm`: the current intended deployments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GdmData {
    pub deployments: Vec<Deployment>,
}

/// Response body of `GET /status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct StatusData {
    /// Deprecated top-level intended list, still emitted (and parsed) for
    /// servers and clients that predate per-status `Intended`.
    pub deployments: Vec<Deployment>,
    pub completed: Option<ResolveStatus>,
    pub in_progress: Option<ResolveStatus>,
}

impl StatusData {
    /// Backfill `Intended` from the deprecated top-level `Deployments` list
    /// when talking to an old server.
    pub fn normalize(&mut self) {
        for status in [&mut self.completed, &mut self.in_progress]
            .into_iter()
            .flatten()
        {
            if status.intended.is_empty() {
                status.intended = self.deployments.clone();
            }
        }
    }
}

/// Queue length for one deployment id. `GET /all-deploy-queues`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueueLengthData {
    pub length: usize,
}

/// Response body of `GET /all-deploy-queues`, keyed by deployment id string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeployQueuesData {
    pub queues: BTreeMap<String, QueueLengthData>,
}

/// One queued rectification in a queue listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueuedItemData {
    #[serde(rename = "ID")]
    pub id: u64,
    pub position: usize,
}

/// Response body of `GET /deploy-queue-item?cluster=...`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeployQueueData {
    pub queue: Vec<QueuedItemData>,
}

/// Response body of `GET /deploy-queue-item/<r11n-id>`.
///
/// `queue_position` is the number of items ahead of this one; `-1` once the
/// item has left the queue (resolved or in flight).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct R11nStateData {
    pub queue_position: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<DiffResolution>,
}

/// Metadata accompanying a single deployment on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DeploymentMeta {
    #[serde(rename = "DeploymentID")]
    pub deployment_id: String,
    /// Operator recorded on the last write, when known.
    pub updated_by: String,
}

/// Body of `GET`/`PUT /single-deployment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SingleDeploymentData {
    pub deployment: Deployment,
    #[serde(default)]
    pub meta: DeploymentMeta,
}
