//! Queue inspection endpoints.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use rudder_shared::api::{DeployQueueData, DeployQueuesData, QueueLengthData, QueuedItemData, R11nStateData};
use rudder_shared::deploy::{DeploymentID, ManifestID, SourceLocation};

use crate::rectify::R11nId;
use crate::web::error::{ApiError, ApiResult};
use crate::web::state::AppState;

/// Query parameters naming one deployment id.
#[derive(Debug, Default, Deserialize)]
pub struct DeploymentIdQuery {
    pub repo: Option<String>,
    pub offset: Option<String>,
    pub flavor: Option<String>,
    pub cluster: Option<String>,
}

impl DeploymentIdQuery {
    /// Assemble the deployment id, requiring at least repo and cluster.
    pub fn deployment_id(&self) -> Result<DeploymentID, ApiError> {
        let repo = self
            .repo
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| ApiError::not_found("No repo given"))?;
        let cluster = self
            .cluster
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ApiError::not_found("No cluster given"))?;
        Ok(DeploymentID::new(
            ManifestID::new(
                SourceLocation::new(repo, self.offset.clone().unwrap_or_default()),
                self.flavor.clone().unwrap_or_default(),
            ),
            cluster,
        ))
    }
}

/// `GET /all-deploy-queues` - lengths of every live queue.
pub async fn all_deploy_queues(State(state): State<AppState>) -> Json<DeployQueuesData> {
    let queues: BTreeMap<String, QueueLengthData> = state
        .queue_set
        .queues()
        .into_iter()
        .map(|(did, items)| {
            (
                did.to_string(),
                QueueLengthData {
                    length: items.len(),
                },
            )
        })
        .collect();
    Json(DeployQueuesData { queues })
}

/// `GET /deploy-queue-item?cluster=&repo=&offset=&flavor=` - one deployment's
/// queue, in order. 404 with an empty queue body when no queue exists.
pub async fn deploy_queue(
    State(state): State<AppState>,
    Query(query): Query<DeploymentIdQuery>,
) -> Result<Json<DeployQueueData>, (StatusCode, Json<DeployQueueData>)> {
    let did = match query.deployment_id() {
        Ok(did) => did,
        Err(_) => return Err((StatusCode::NOT_FOUND, Json(DeployQueueData::default()))),
    };
    match state.queue_set.queues().remove(&did) {
        Some(items) => Ok(Json(DeployQueueData {
            queue: items
                .into_iter()
                .map(|item| QueuedItemData {
                    id: item.id.0,
                    position: item.position,
                })
                .collect(),
        })),
        None => Err((StatusCode::NOT_FOUND, Json(DeployQueueData::default()))),
    }
}

/// `GET /deploy-queue-item/<r11n-id>` - where one rectification stands.
pub async fn deploy_queue_item(
    State(state): State<AppState>,
    Path(r11n_id): Path<u64>,
) -> ApiResult<Json<R11nStateData>> {
    let id = R11nId(r11n_id);
    if !state.queue_set.knows(id) {
        return Err(ApiError::not_found(format!("no rectification {id}")));
    }
    let queue_position = state
        .queue_set
        .position(id)
        .map_or(-1, |position| position as i64);
    Ok(Json(R11nStateData {
        queue_position,
        resolution: state.queue_set.resolution(id),
    }))
}
