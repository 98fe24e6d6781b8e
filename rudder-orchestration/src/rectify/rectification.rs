//! A single unit of reconciliation work: one deployable pair applied to the
//! downstream scheduler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use rudder_shared::deploy::{DeployablePair, PairKind};
use rudder_shared::errors::SchedulerError;
use rudder_shared::resolution::{DiffResolution, ResolutionError, ResolutionType};
use rudder_shared::scheduler::{DeployOutcome, Deployer};
use rudder_shared::Registry;

/// Collaborators a rectification needs to run.
#[derive(Clone)]
pub struct RectifyContext {
    pub deployer: Arc<dyn Deployer>,
    pub registry: Arc<dyn Registry>,
    /// Deadline for the scheduler call; on expiry the call is abandoned and a
    /// transient error recorded.
    pub timeout: Duration,
}

impl RectifyContext {
    pub fn new(deployer: Arc<dyn Deployer>, registry: Arc<dyn Registry>) -> Self {
        Self {
            deployer,
            registry,
            timeout: Duration::from_secs(180),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// One deployable pair, applied to the scheduler at most once.
///
/// `begin` is idempotent: the first caller performs the work, every later
/// caller (and `wait`) just receives the recorded result.
pub struct Rectification {
    pair: DeployablePair,
    begun: AtomicBool,
    result_tx: watch::Sender<Option<DiffResolution>>,
}

impl Rectification {
    pub fn new(pair: DeployablePair) -> Self {
        let (result_tx, _) = watch::channel(None);
        Self {
            pair,
            begun: AtomicBool::new(false),
            result_tx,
        }
    }

    pub fn pair(&self) -> &DeployablePair {
        &self.pair
    }

    /// Apply the pair to the scheduler. Subsequent calls no-op and return the
    /// first call's result.
    pub async fn begin(&self, ctx: &RectifyContext) -> DiffResolution {
        if self.begun.swap(true, Ordering::SeqCst) {
            return self.wait().await;
        }
        let resolution = rectify_pair(&self.pair, ctx).await;
        // Send can only fail if no receiver exists, and we always hold one
        // implicitly through wait(); the stored value is what matters.
        self.result_tx.send_replace(Some(resolution.clone()));
        resolution
    }

    /// Block until the first `begin` completes and return its result.
    pub async fn wait(&self) -> DiffResolution {
        let mut rx = self.result_tx.subscribe();
        loop {
            if let Some(resolution) = rx.borrow_and_update().clone() {
                return resolution;
            }
            if rx.changed().await.is_err() {
                unreachable!("result sender lives as long as the rectification");
            }
        }
    }

    /// Whether a result has been recorded yet.
    pub fn resolved(&self) -> Option<DiffResolution> {
        self.result_tx.borrow().clone()
    }
}

/// Apply one pair, classifying failures into the resolution record.
async fn rectify_pair(pair: &DeployablePair, ctx: &RectifyContext) -> DiffResolution {
    let did = pair.id.clone();
    match pair.kind() {
        PairKind::Unchanged => DiffResolution::new(did, ResolutionType::Unchanged),
        PairKind::Create => {
            let posterior = pair.posterior.as_ref().expect("create pair has a posterior");
            if let Err(err) = ctx.registry.artifact_for(&posterior.source_id).await {
                warn!(deployment_id = %did, error = %err, "artifact lookup failed");
                return DiffResolution::with_error(
                    did,
                    ResolutionType::Created,
                    ResolutionError::from(&err),
                );
            }
            let call = ctx.deployer.create(posterior);
            finish(did, ResolutionType::Created, deadline(ctx.timeout, call).await)
        }
        PairKind::Modify => {
            let posterior = pair.posterior.as_ref().expect("modify pair has a posterior");
            if let Err(err) = ctx.registry.artifact_for(&posterior.source_id).await {
                warn!(deployment_id = %did, error = %err, "artifact lookup failed");
                return DiffResolution::with_error(
                    did,
                    ResolutionType::Updated,
                    ResolutionError::from(&err),
                );
            }
            let call = ctx.deployer.modify(pair);
            finish(did, ResolutionType::Updated, deadline(ctx.timeout, call).await)
        }
        PairKind::Delete => {
            let prior = pair.prior.as_ref().expect("delete pair has a prior");
            let call = ctx.deployer.delete(prior);
            let outcome = deadline(ctx.timeout, call).await.map(|()| DeployOutcome::Active);
            finish(did, ResolutionType::Deleted, outcome)
        }
    }
}

/// Bound a scheduler call by the rectification deadline.
async fn deadline<T>(
    timeout: Duration,
    call: impl std::future::Future<Output = Result<T, SchedulerError>>,
) -> Result<T, SchedulerError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(SchedulerError::Timeout {
            seconds: timeout.as_secs(),
        }),
    }
}

fn finish(
    did: rudder_shared::DeploymentID,
    applied: ResolutionType,
    outcome: Result<DeployOutcome, SchedulerError>,
) -> DiffResolution {
    match outcome {
        Ok(DeployOutcome::Active) => {
            debug!(deployment_id = %did, desc = %applied, "rectified");
            DiffResolution::new(did, applied)
        }
        Ok(DeployOutcome::Pending) => {
            debug!(deployment_id = %did, "intent accepted, tasks starting");
            DiffResolution::new(did, ResolutionType::Coming)
        }
        Err(err) => {
            warn!(deployment_id = %did, error = %err, transient = err.is_transient(), "rectification failed");
            DiffResolution::with_error(did, applied, ResolutionError::from(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rudder_shared::test_utils::{deployment, ScriptedDeployer, StaticRegistry};
    use rudder_shared::Deployments;

    fn ctx(deployer: Arc<ScriptedDeployer>) -> RectifyContext {
        RectifyContext::new(deployer, Arc::new(StaticRegistry::new()))
    }

    #[tokio::test]
    async fn create_pair_resolves_created() {
        let deployer = Arc::new(ScriptedDeployer::new());
        let pair = DeployablePair::create(deployment("github.com/x/a", "c1", "1.0.0").build());
        let r11n = Rectification::new(pair);
        let resolution = r11n.begin(&ctx(deployer)).await;
        assert_eq!(resolution.desc, ResolutionType::Created);
        assert!(resolution.error.is_none());
    }

    #[tokio::test]
    async fn begin_is_idempotent() {
        let deployer = Arc::new(ScriptedDeployer::new());
        let pair = DeployablePair::create(deployment("github.com/x/a", "c1", "1.0.0").build());
        let r11n = Rectification::new(pair);
        let ctx = ctx(deployer.clone());
        let first = r11n.begin(&ctx).await;
        let second = r11n.begin(&ctx).await;
        assert_eq!(first, second);
        assert_eq!(deployer.applied().len(), 1, "scheduler called exactly once");
    }

    #[tokio::test]
    async fn wait_returns_the_recorded_result() {
        let deployer = Arc::new(ScriptedDeployer::new());
        let pair = DeployablePair::create(deployment("github.com/x/a", "c1", "1.0.0").build());
        let r11n = Arc::new(Rectification::new(pair));
        let ctx = ctx(deployer);

        let waiter = {
            let r11n = r11n.clone();
            tokio::spawn(async move { r11n.wait().await })
        };
        let begun = r11n.begin(&ctx).await;
        let waited = waiter.await.unwrap();
        assert_eq!(begun, waited);
    }

    #[tokio::test]
    async fn transient_scheduler_error_is_flagged() {
        let deployer = Arc::new(ScriptedDeployer::new());
        let d = deployment("github.com/x/a", "c1", "1.0.0").build();
        deployer.enqueue_failure(
            d.id(),
            SchedulerError::Http {
                status: 503,
                message: "unavailable".into(),
            },
        );
        let r11n = Rectification::new(DeployablePair::create(d));
        let resolution = r11n.begin(&ctx(deployer)).await;
        assert!(resolution.error.as_ref().unwrap().transient);
    }

    #[tokio::test]
    async fn missing_image_is_permanent() {
        let deployer = Arc::new(ScriptedDeployer::new());
        let registry = Arc::new(StaticRegistry::new());
        let d = deployment("github.com/x/a", "c1", "1.0.0").build();
        registry.mark_missing(d.source_id.clone());
        let r11n = Rectification::new(DeployablePair::create(d));
        let ctx = RectifyContext::new(deployer.clone(), registry);
        let resolution = r11n.begin(&ctx).await;
        let err = resolution.error.unwrap();
        assert!(!err.transient);
        assert!(deployer.applied().is_empty(), "scheduler never called");
    }

    #[tokio::test]
    async fn pending_outcome_resolves_coming() {
        let deployer = Arc::new(ScriptedDeployer::new());
        let d = deployment("github.com/x/a", "c1", "1.0.0").build();
        deployer.report_pending(d.id(), 1);
        let r11n = Rectification::new(DeployablePair::create(d));
        let resolution = r11n.begin(&ctx(deployer)).await;
        assert_eq!(resolution.desc, ResolutionType::Coming);
    }

    #[tokio::test]
    async fn unchanged_pair_touches_nothing() {
        let deployer = Arc::new(ScriptedDeployer::new());
        let d = deployment("github.com/x/a", "c1", "1.0.0").build();
        deployer.set_running(Deployments::from_iter([d.clone()]));
        let r11n = Rectification::new(DeployablePair::change(d.clone(), d));
        let resolution = r11n.begin(&ctx(deployer.clone())).await;
        assert_eq!(resolution.desc, ResolutionType::Unchanged);
        assert!(deployer.applied().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_scheduler_times_out_as_transient() {
        struct StuckDeployer;
        #[async_trait::async_trait]
        impl Deployer for StuckDeployer {
            async fn running(&self) -> Result<Deployments, SchedulerError> {
                Ok(Deployments::new())
            }
            async fn create(
                &self,
                _: &rudder_shared::Deployment,
            ) -> Result<DeployOutcome, SchedulerError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(DeployOutcome::Active)
            }
            async fn modify(&self, _: &DeployablePair) -> Result<DeployOutcome, SchedulerError> {
                unimplemented!()
            }
            async fn delete(&self, _: &rudder_shared::Deployment) -> Result<(), SchedulerError> {
                unimplemented!()
            }
        }

        let ctx = RectifyContext::new(Arc::new(StuckDeployer), Arc::new(StaticRegistry::new()))
            .with_timeout(Duration::from_secs(180));
        let r11n = Rectification::new(DeployablePair::create(
            deployment("github.com/x/a", "c1", "1.0.0").build(),
        ));
        let resolution = r11n.begin(&ctx).await;
        let err = resolution.error.unwrap();
        assert!(err.transient);
        assert!(err.message.contains("timed out"));
    }
}
