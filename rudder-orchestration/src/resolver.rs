//! The auto-resolver: the loop that drives intended and actual state
//! together.
//!
//! Each cycle reads the intended state, reads what the scheduler is running,
//! diffs the two, pushes one rectification per changed deployment into the
//! queue set, and records the outcomes through a [`ResolveRecorder`]. Cycles
//! are strictly serialized; a new cycle starts only after the previous
//! recorder has finished.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use rudder_shared::config::ResolverConfig;
use rudder_shared::deploy::{diff, Deployments, PairKind};
use rudder_shared::errors::{ResolveError, StateStoreError};
use rudder_shared::filter::ResolveFilter;
use rudder_shared::resolution::{DiffResolution, ResolutionError, ResolvePhase, ResolveStatus};
use rudder_shared::store::StateStore;

use crate::rectify::{
    DeployQueueSet, QueuedRectification, Rectification, RectificationHandler, RectifyContext,
    ResolveRecorder,
};

/// The handler every queue worker runs: begin the queued rectification
/// against the scheduler.
pub struct RectifyHandler {
    ctx: RectifyContext,
}

impl RectifyHandler {
    pub fn new(ctx: RectifyContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl RectificationHandler for RectifyHandler {
    async fn handle(&self, queued: &QueuedRectification) -> DiffResolution {
        queued.rectification.begin(&self.ctx).await
    }
}

/// Published statuses of the most recent resolve runs: the last completed
/// run and the live one, as served by `GET /status`.
#[derive(Clone, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<BoardInner>>,
}

#[derive(Default)]
struct BoardInner {
    stable: Option<ResolveStatus>,
    live: Option<ResolveRecorder>,
}

impl StatusBoard {
    /// `(completed, in_progress)` snapshots for the status endpoint.
    pub fn snapshot(&self) -> (Option<ResolveStatus>, Option<ResolveStatus>) {
        let inner = self.inner.read().unwrap();
        (
            inner.stable.clone(),
            inner.live.as_ref().map(|r| r.current_status()),
        )
    }

    fn begin_run(&self, recorder: ResolveRecorder) {
        self.inner.write().unwrap().live = Some(recorder);
    }

    fn finish_run(&self) {
        let mut inner = self.inner.write().unwrap();
        if let Some(recorder) = inner.live.take() {
            inner.stable = Some(recorder.current_status());
        }
    }
}

/// Driver loop reconciling intended state against the scheduler.
pub struct AutoResolver {
    state_store: Arc<dyn StateStore>,
    queue_set: Arc<DeployQueueSet>,
    ctx: RectifyContext,
    filter: ResolveFilter,
    config: ResolverConfig,
    board: StatusBoard,
}

impl AutoResolver {
    pub fn new(
        state_store: Arc<dyn StateStore>,
        queue_set: Arc<DeployQueueSet>,
        ctx: RectifyContext,
        filter: ResolveFilter,
        config: ResolverConfig,
    ) -> Self {
        Self {
            state_store,
            queue_set,
            ctx,
            filter,
            config,
            board: StatusBoard::default(),
        }
    }

    /// The board this resolver publishes its statuses to.
    pub fn board(&self) -> StatusBoard {
        self.board.clone()
    }

    /// Run resolve cycles until `shutdown` flips to true. The shutdown token
    /// is consulted between cycles; an in-flight cycle always completes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(filter = %self.filter, "auto-resolver starting");
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.resolve_once().await {
                Ok(status) => {
                    debug!(
                        resolutions = status.log.len(),
                        errors = status.errors.len(),
                        "resolve cycle finished"
                    );
                }
                Err(err) => warn!(error = %err, "resolve cycle failed"),
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval()) => {}
                _ = shutdown.changed() => {}
            }
        }
        info!("auto-resolver stopped");
    }

    /// One full resolve cycle. Public so tests and the single-shot CLI can
    /// drive cycles directly.
    pub async fn resolve_once(&self) -> Result<ResolveStatus, ResolveError> {
        let intended = self.read_intended().await?;
        let actual = self.ctx.deployer.running().await?;
        let actual = actual.filter(|d| self.filter.matches_deployment(d));

        let recorder = self.begin_resolution(&intended, &actual);
        self.board.begin_run(recorder.clone());
        let outcome = recorder.wait().await;
        self.board.finish_run();
        match outcome {
            Ok(()) => Ok(recorder.current_status()),
            Err(err) => Err(err),
        }
    }

    /// Read and expand the intended state, retrying once on a store conflict.
    async fn read_intended(&self) -> Result<Deployments, ResolveError> {
        let state = match self.state_store.read_state().await {
            Ok(state) => state,
            Err(StateStoreError::Conflict(reason)) => {
                debug!(reason = %reason, "state read conflicted, retrying once");
                self.state_store.read_state().await?
            }
            Err(err) => return Err(err.into()),
        };
        let intended = state.deployments()?;
        Ok(intended.filter(|d| self.filter.matches_deployment(d)))
    }

    /// Diff, enqueue, and start a recorder that awaits every pushed item.
    fn begin_resolution(&self, intended: &Deployments, actual: &Deployments) -> ResolveRecorder {
        let pairs = diff(intended, actual);
        let mut queued = Vec::new();
        let mut rejected = Vec::new();
        for pair in pairs {
            if pair.kind() == PairKind::Unchanged {
                continue;
            }
            debug!(deployment_id = %pair.id, kind = %pair.kind(), "queueing rectification");
            let rectification = Arc::new(Rectification::new(pair));
            match self.queue_set.push(rectification.clone()) {
                Some(item) => queued.push(item),
                None => rejected.push(rectification.pair().id.clone()),
            }
        }

        let queue_set = Arc::clone(&self.queue_set);
        ResolveRecorder::new(intended, move |sink| async move {
            sink.set_phase(ResolvePhase::Applying);
            for did in rejected {
                warn!(deployment_id = %did, "queue full, deferring to next cycle");
                sink.record(DiffResolution::with_error(
                    did.clone(),
                    rudder_shared::resolution::ResolutionType::Coming,
                    ResolutionError::transient(format!("rectification queue for {did} is full")),
                ))
                .await;
            }
            for item in queued {
                match queue_set.wait(&item.deployment_id, item.id).await {
                    Some(resolution) => sink.record(resolution).await,
                    None => {
                        sink.record(DiffResolution::with_error(
                            item.deployment_id.clone(),
                            rudder_shared::resolution::ResolutionType::Coming,
                            ResolutionError::transient("rectification abandoned before completion"),
                        ))
                        .await;
                    }
                }
            }
            Ok(())
        })
    }
}
