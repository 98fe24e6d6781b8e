//! Read-only views of the orchestrator's state: sibling servers, the
//! intended deployments, and resolve-run status.

use axum::extract::State;
use axum::Json;
use tracing::debug;

use rudder_shared::api::{GdmData, ServerDescriptor, ServerListData, StatusData};

use crate::web::error::ApiResult;
use crate::web::state::AppState;

/// `GET /servers` - the cluster servers known to this one.
pub async fn servers(State(state): State<AppState>) -> ApiResult<Json<ServerListData>> {
    let intended = state.state_store.read_state().await?;
    let servers = intended
        .clusters
        .values()
        .map(|cluster| ServerDescriptor {
            cluster_name: cluster.name.clone(),
            url: cluster.url.clone(),
        })
        .collect();
    Ok(Json(ServerListData { servers }))
}

/// `GET /gdm` - the current intended deployments.
pub async fn gdm(State(state): State<AppState>) -> ApiResult<Json<GdmData>> {
    let intended = state.state_store.read_state().await?;
    let deployments = intended.deployments()?;
    debug!(count = deployments.len(), "serving gdm");
    Ok(Json(GdmData {
        deployments: deployments.values().cloned().collect(),
    }))
}

/// `GET /status` - the completed and in-progress resolve statuses.
pub async fn status(State(state): State<AppState>) -> Json<StatusData> {
    let (completed, in_progress) = state.board.snapshot();
    // Deprecated top-level list, still emitted for old clients.
    let deployments = completed
        .as_ref()
        .map(|status| status.intended.clone())
        .unwrap_or_default();
    Json(StatusData {
        deployments,
        completed,
        in_progress,
    })
}
