//! Shared state threaded through the HTTP handlers.

use std::sync::Arc;

use rudder_shared::store::StateStore;

use crate::rectify::DeployQueueSet;
use crate::resolver::StatusBoard;

/// Everything the server surface needs: the state store for GDM reads and
/// single-deployment writes, the queue set for queue inspection and PUT
/// enqueues, and the resolver's status board.
#[derive(Clone)]
pub struct AppState {
    pub state_store: Arc<dyn StateStore>,
    pub queue_set: Arc<DeployQueueSet>,
    pub board: StatusBoard,
}

impl AppState {
    pub fn new(
        state_store: Arc<dyn StateStore>,
        queue_set: Arc<DeployQueueSet>,
        board: StatusBoard,
    ) -> Self {
        Self {
            state_store,
            queue_set,
            board,
        }
    }
}
