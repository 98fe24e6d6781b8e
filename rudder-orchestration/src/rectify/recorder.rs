//! Incremental collector for one resolve run.
//!
//! The recorder spawns the runner it is given plus a drain task that folds
//! every emitted [`DiffResolution`] into a status buffer. Callers can snapshot
//! the status at any time (`current_status`), poll for completion (`done`),
//! or block on it (`wait`).

use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use rudder_shared::deploy::Deployments;
use rudder_shared::errors::ResolveError;
use rudder_shared::resolution::{DiffResolution, ResolvePhase, ResolveStatus};

/// Handed to the runner so it can report progress.
#[derive(Clone)]
pub struct ResolveSink {
    log_tx: mpsc::Sender<DiffResolution>,
    status: Arc<RwLock<ResolveStatus>>,
}

impl ResolveSink {
    /// Record the outcome of one diff. Order of calls is the order of the
    /// status log.
    pub async fn record(&self, resolution: DiffResolution) {
        // The drain outlives every sink; a send failure means the process is
        // tearing down and the log no longer matters.
        let _ = self.log_tx.send(resolution).await;
    }

    /// Advance the advisory phase. No-op once the run has failed.
    pub fn set_phase(&self, phase: ResolvePhase) {
        let mut status = self.status.write().unwrap();
        if status.phase != ResolvePhase::Failed {
            status.phase = phase;
        }
    }
}

/// The status of one resolve run, updated live while the run executes.
#[derive(Clone)]
pub struct ResolveRecorder {
    status: Arc<RwLock<ResolveStatus>>,
    err: Arc<Mutex<Option<ResolveError>>>,
    done_rx: watch::Receiver<bool>,
}

impl ResolveRecorder {
    /// Start recording: spawns `runner` and a drain that appends each emitted
    /// resolution to the status log. Returns immediately.
    pub fn new<F, Fut>(intended: &Deployments, runner: F) -> Self
    where
        F: FnOnce(ResolveSink) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), ResolveError>> + Send + 'static,
    {
        let status = Arc::new(RwLock::new(ResolveStatus {
            started: Some(Utc::now()),
            finished: None,
            phase: ResolvePhase::Starting,
            intended: intended.values().cloned().collect(),
            log: Vec::new(),
            errors: Vec::new(),
        }));
        let err = Arc::new(Mutex::new(None));
        let (log_tx, mut log_rx) = mpsc::channel::<DiffResolution>(10);
        let (done_tx, done_rx) = watch::channel(false);

        let sink = ResolveSink {
            log_tx,
            status: Arc::clone(&status),
        };

        // Drain: fold emitted resolutions into the status buffer, then
        // finalize once the runner has dropped its sink.
        {
            let status = Arc::clone(&status);
            let err = Arc::clone(&err);
            tokio::spawn(async move {
                while let Some(resolution) = log_rx.recv().await {
                    let mut status = status.write().unwrap();
                    if let Some(error) = &resolution.error {
                        debug!(deployment_id = %resolution.deployment_id, error = %error, "resolve error");
                        status.errors.push(error.clone());
                    }
                    status.log.push(resolution);
                }
                {
                    let mut status = status.write().unwrap();
                    status.finished = Some(Utc::now());
                    if status.phase != ResolvePhase::Failed && err.lock().unwrap().is_none() {
                        status.phase = ResolvePhase::Finished;
                    }
                }
                let _ = done_tx.send(true);
            });
        }

        // Runner: owns the only sink; dropping it closes the log channel.
        {
            let status = Arc::clone(&status);
            let err = Arc::clone(&err);
            tokio::spawn(async move {
                if let Err(run_err) = runner(sink).await {
                    let mut status = status.write().unwrap();
                    status.phase = ResolvePhase::Failed;
                    *err.lock().unwrap() = Some(run_err);
                }
            });
        }

        Self {
            status,
            err,
            done_rx,
        }
    }

    /// Deep-copied snapshot of the run's status.
    pub fn current_status(&self) -> ResolveStatus {
        self.status.read().unwrap().clone()
    }

    /// Whether the run (and its drain) has finished. Non-blocking.
    pub fn done(&self) -> bool {
        *self.done_rx.borrow()
    }

    /// Block until the run finishes. A runner error supersedes accumulated
    /// per-diff errors; otherwise those surface as `ResolutionsFailed`.
    pub async fn wait(&self) -> Result<(), ResolveError> {
        let mut done_rx = self.done_rx.clone();
        while !*done_rx.borrow_and_update() {
            if done_rx.changed().await.is_err() {
                break;
            }
        }
        if let Some(err) = self.err.lock().unwrap().as_ref() {
            return Err(err.clone());
        }
        let status = self.status.read().unwrap();
        if status.errors.is_empty() {
            Ok(())
        } else {
            Err(ResolveError::ResolutionsFailed {
                failed: status.errors.len(),
                total: status.log.len(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rudder_shared::resolution::{ResolutionError, ResolutionType};
    use rudder_shared::test_utils::deployment;
    use rudder_shared::Deployments;

    fn intended() -> Deployments {
        Deployments::from_iter([deployment("github.com/x/a", "c1", "1.0.0").build()])
    }

    fn created(repo: &str) -> DiffResolution {
        DiffResolution::new(
            deployment(repo, "c1", "1.0.0").build().id(),
            ResolutionType::Created,
        )
    }

    #[tokio::test]
    async fn records_resolutions_in_emission_order() {
        let recorder = ResolveRecorder::new(&intended(), |sink| async move {
            sink.set_phase(ResolvePhase::Applying);
            sink.record(created("github.com/x/b")).await;
            sink.record(created("github.com/x/a")).await;
            Ok(())
        });
        recorder.wait().await.unwrap();
        let status = recorder.current_status();
        assert_eq!(status.phase, ResolvePhase::Finished);
        assert_eq!(status.log.len(), 2);
        assert_eq!(
            status.log[0].deployment_id.to_string(),
            "github.com/x/b,,:c1"
        );
        assert!(status.finished.is_some());
    }

    #[tokio::test]
    async fn current_status_returns_fresh_copies() {
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let recorder = ResolveRecorder::new(&intended(), |sink| async move {
            sink.record(created("github.com/x/a")).await;
            let _ = release_rx.await;
            Ok(())
        });
        // Two snapshots during the run are equal but independent copies.
        let first = recorder.current_status();
        let second = recorder.current_status();
        assert_eq!(first.intended, second.intended);
        assert!(first.is_live());
        release_tx.send(()).unwrap();
        recorder.wait().await.unwrap();
        assert!(!recorder.current_status().is_live());
        // The earlier snapshot is unaffected by the run finishing.
        assert!(first.is_live());
    }

    #[tokio::test]
    async fn runner_error_supersedes_diff_errors_and_fails_phase() {
        let recorder = ResolveRecorder::new(&intended(), |sink| async move {
            sink.record(DiffResolution::with_error(
                deployment("github.com/x/a", "c1", "1.0.0").build().id(),
                ResolutionType::Created,
                ResolutionError::transient("scheduler 503"),
            ))
            .await;
            Err(ResolveError::QueueFull {
                deployment_id: "github.com/x/a,,:c1".into(),
            })
        });
        let err = recorder.wait().await.unwrap_err();
        assert!(matches!(err, ResolveError::QueueFull { .. }));
        assert_eq!(recorder.current_status().phase, ResolvePhase::Failed);
    }

    #[tokio::test]
    async fn diff_errors_surface_from_wait() {
        let recorder = ResolveRecorder::new(&intended(), |sink| async move {
            sink.record(created("github.com/x/a")).await;
            sink.record(DiffResolution::with_error(
                deployment("github.com/x/b", "c1", "1.0.0").build().id(),
                ResolutionType::Updated,
                ResolutionError::permanent("bad request"),
            ))
            .await;
            Ok(())
        });
        let err = recorder.wait().await.unwrap_err();
        match err {
            ResolveError::ResolutionsFailed { failed, total } => {
                assert_eq!((failed, total), (1, 2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn done_is_nonblocking() {
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let recorder = ResolveRecorder::new(&intended(), |_sink| async move {
            let _ = release_rx.await;
            Ok(())
        });
        assert!(!recorder.done());
        release_tx.send(()).unwrap();
        recorder.wait().await.unwrap();
        assert!(recorder.done());
    }

    #[tokio::test]
    async fn phase_failed_is_sticky() {
        let recorder = ResolveRecorder::new(&intended(), |sink| async move {
            sink.set_phase(ResolvePhase::Applying);
            Err(ResolveError::QueueFull {
                deployment_id: "x".into(),
            })
        });
        let _ = recorder.wait().await;
        let status = recorder.current_status();
        assert_eq!(status.phase, ResolvePhase::Failed);
    }
}
