//! Route definitions for the server surface.

use axum::routing::get;
use axum::Router;

use crate::web::handlers;
use crate::web::state::AppState;

/// The full server router:
/// - `GET /servers` - sibling cluster servers
/// - `GET /gdm` - intended deployments
/// - `GET /status` - completed and in-progress resolve statuses
/// - `GET /all-deploy-queues` - every queue's length
/// - `GET /deploy-queue-item` - one deployment's queue (by query)
/// - `GET /deploy-queue-item/:r11n_id` - one rectification's state
/// - `GET|PUT /single-deployment` - read or update one deployment
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/servers", get(handlers::gdm::servers))
        .route("/gdm", get(handlers::gdm::gdm))
        .route("/status", get(handlers::gdm::status))
        .route("/all-deploy-queues", get(handlers::queues::all_deploy_queues))
        .route("/deploy-queue-item", get(handlers::queues::deploy_queue))
        .route(
            "/deploy-queue-item/:r11n_id",
            get(handlers::queues::deploy_queue_item),
        )
        .route(
            "/single-deployment",
            get(handlers::single_deployment::get_single_deployment)
                .put(handlers::single_deployment::put_single_deployment),
        )
        .with_state(state)
}
