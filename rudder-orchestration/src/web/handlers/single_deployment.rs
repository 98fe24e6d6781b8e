//! Read and write one deployment's intended state.
//!
//! `GET` serves the deployment with an `Etag` derived from its content.
//! `PUT` validates the submitted deployment, honors `If-Match`, writes the
//! manifest change through the state store (retrying once on conflict), and
//! enqueues a rectification whose location is returned in the `Location`
//! header. A no-op PUT (intended state already matches) returns an empty
//! `Location` unless `force=true`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::{debug, info};

use rudder_shared::api::{DeploymentMeta, SingleDeploymentData};
use rudder_shared::deploy::{parse_version_strict, DeployablePair, Deployment, DeploymentID};
use rudder_shared::errors::StateStoreError;

use super::queues::DeploymentIdQuery;
use crate::rectify::Rectification;
use crate::web::error::{ApiError, ApiResult};
use crate::web::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SingleDeploymentQuery {
    pub repo: Option<String>,
    pub offset: Option<String>,
    pub flavor: Option<String>,
    pub cluster: Option<String>,
    /// Passed as `force=true`; kept as a string because query values are
    /// strings on the wire.
    pub force: Option<String>,
}

impl SingleDeploymentQuery {
    fn deployment_id(&self) -> Result<DeploymentID, ApiError> {
        DeploymentIdQuery {
            repo: self.repo.clone(),
            offset: self.offset.clone(),
            flavor: self.flavor.clone(),
            cluster: self.cluster.clone(),
        }
        .deployment_id()
    }

    fn force(&self) -> bool {
        matches!(self.force.as_deref(), Some("true") | Some("1"))
    }
}

/// Content hash served as the `Etag` for conditional writes.
fn etag_for(deployment: &Deployment) -> String {
    let canonical =
        serde_json::to_string(deployment).expect("deployments always serialize");
    let mut hasher = DefaultHasher::new();
    canonical.hash(&mut hasher);
    format!("\"{:016x}\"", hasher.finish())
}

async fn intended_deployment(
    state: &AppState,
    did: &DeploymentID,
) -> ApiResult<Option<Deployment>> {
    let stored = state.state_store.read_state().await?;
    let intended = stored.deployments()?;
    Ok(intended.get(did).cloned())
}

/// `GET /single-deployment?cluster=&repo=&offset=&flavor=`
pub async fn get_single_deployment(
    State(state): State<AppState>,
    Query(query): Query<SingleDeploymentQuery>,
) -> ApiResult<Response> {
    let did = query.deployment_id()?;
    let Some(deployment) = intended_deployment(&state, &did).await? else {
        return Err(ApiError::not_found(format!("no intended deployment {did}")));
    };
    let etag = etag_for(&deployment);
    let body = SingleDeploymentData {
        deployment,
        meta: DeploymentMeta {
            deployment_id: did.to_string(),
            updated_by: String::new(),
        },
    };
    Ok(([(header::ETAG, etag)], Json(body)).into_response())
}

/// `PUT /single-deployment?cluster=&repo=&offset=&flavor=&force=`
pub async fn put_single_deployment(
    State(state): State<AppState>,
    Query(query): Query<SingleDeploymentQuery>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Response> {
    let did = query.deployment_id()?;

    // The version tag is checked before the body is decoded so a non-semver
    // or metadata-carrying version is a 406 rather than a decode failure.
    let version_tag = body
        .pointer("/Deployment/SourceID/Version")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ApiError::bad_request("body is missing Deployment.SourceID.Version"))?;
    parse_version_strict(version_tag)
        .map_err(|err| ApiError::not_acceptable(err.to_string()))?;

    let data: SingleDeploymentData = serde_json::from_value(body)
        .map_err(|err| ApiError::bad_request(format!("malformed deployment body: {err}")))?;
    let deployment = data.deployment;

    if deployment.id() != did {
        return Err(ApiError::bad_request(format!(
            "deployment in body has id {}, query names {did}",
            deployment.id()
        )));
    }
    deployment.validate()?;

    let stored = state.state_store.read_state().await?;
    if !stored.clusters.contains_key(&deployment.cluster_name) {
        return Err(ApiError::bad_request(format!(
            "unknown cluster {:?}",
            deployment.cluster_name
        )));
    }
    let current = stored.deployments()?.get(&did).cloned();

    if let Some(if_match) = headers.get(header::IF_MATCH) {
        let provided = if_match
            .to_str()
            .map_err(|_| ApiError::bad_request("unreadable If-Match header"))?;
        let matches = current
            .as_ref()
            .map(|c| etag_for(c) == provided)
            .unwrap_or(false);
        if !matches {
            return Err(ApiError::precondition_failed(
                "intended deployment changed since it was read",
            ));
        }
    }

    let unchanged = current
        .as_ref()
        .is_some_and(|c| c.equal(&deployment));
    if unchanged && !query.force() {
        debug!(deployment_id = %did, "intended state already matches, nothing queued");
        return Ok(([(header::LOCATION, String::new())], StatusCode::OK).into_response());
    }

    write_with_retry(&state, &deployment).await?;

    let pair = match current {
        Some(prior) => DeployablePair::change(prior, deployment),
        None => DeployablePair::create(deployment),
    };
    let queued = state
        .queue_set
        .push(std::sync::Arc::new(Rectification::new(pair)))
        .ok_or_else(|| {
            ApiError::unavailable(format!("rectification queue for {did} is full"))
        })?;

    info!(deployment_id = %did, r11n_id = %queued.id, "deployment update queued");
    let location = format!("/deploy-queue-item/{}", queued.id);
    Ok(([(header::LOCATION, location)], StatusCode::OK).into_response())
}

/// Apply the deployment to the stored manifests, retrying once when a
/// concurrent writer wins the first attempt.
async fn write_with_retry(state: &AppState, deployment: &Deployment) -> ApiResult<()> {
    for attempt in 0..2 {
        let mut stored = state.state_store.read_state().await?;
        stored.apply_deployment(deployment);
        match state.state_store.write_state(stored).await {
            Ok(()) => return Ok(()),
            Err(StateStoreError::Conflict(reason)) if attempt == 0 => {
                debug!(reason = %reason, "state write conflicted, retrying once");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(ApiError::conflict("state store kept conflicting"))
}
