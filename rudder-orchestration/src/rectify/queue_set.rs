//! Per-deployment rectification queues.
//!
//! Maps each `DeploymentID` to a bounded FIFO drained by exactly one worker
//! task, so at most one rectification per deployment is ever in flight.
//! Queues and workers are created lazily on first push and torn down again
//! after sitting empty for the configured grace interval.
//!
//! Locking discipline: the set's map and the per-queue mirrors live behind a
//! single std mutex that is never held across an await; workers run the
//! handler without any lock held. Waiters are woken through a watch channel
//! that is bumped on every completion.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use rudder_shared::config::QueueConfig;
use rudder_shared::deploy::DeploymentID;
use rudder_shared::resolution::DiffResolution;

use super::rectification::Rectification;

/// Identifier of one queued rectification, unique (and monotonic) within the
/// process lifetime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct R11nId(pub u64);

impl fmt::Display for R11nId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for R11nId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(R11nId(s.parse()?))
    }
}

/// A rectification that has been accepted into a queue.
#[derive(Clone)]
pub struct QueuedRectification {
    pub id: R11nId,
    pub deployment_id: DeploymentID,
    pub rectification: Arc<Rectification>,
}

/// A queue entry as reported by [`DeployQueueSet::queues`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedSummary {
    pub id: R11nId,
    pub deployment_id: DeploymentID,
    pub position: usize,
}

/// Processes one queued rectification; supplied at queue-set construction.
#[async_trait]
pub trait RectificationHandler: Send + Sync + 'static {
    async fn handle(&self, queued: &QueuedRectification) -> DiffResolution;
}

/// The set of per-deployment rectification queues.
pub struct DeployQueueSet {
    inner: Arc<Mutex<SetInner>>,
    handler: Arc<dyn RectificationHandler>,
    config: QueueConfig,
    next_id: AtomicU64,
    /// Bumped on every completed (or abandoned) item; waiters poll the result
    /// map on each change.
    completions: watch::Sender<u64>,
}

#[derive(Default)]
struct SetInner {
    queues: HashMap<DeploymentID, QueueState>,
    /// Every id ever accepted by a push.
    known: HashSet<R11nId>,
    /// Results of processed items, kept for the process lifetime so late
    /// waiters and the queue-item endpoint can read them.
    results: HashMap<R11nId, DiffResolution>,
}

struct QueueState {
    tx: mpsc::Sender<QueuedRectification>,
    /// Queued-but-unfinished items in order; the head is the one in flight
    /// once the worker has picked it up.
    pending: VecDeque<QueuedSummary>,
}

impl DeployQueueSet {
    pub fn new(handler: Arc<dyn RectificationHandler>, config: QueueConfig) -> Self {
        let (completions, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(SetInner::default())),
            handler,
            config,
            next_id: AtomicU64::new(1),
            completions,
        }
    }

    /// Append a rectification to its deployment's queue, creating the queue
    /// and its worker on first use. Returns `None` when the queue is full;
    /// nothing is mutated in that case. Never blocks.
    pub fn push(&self, rectification: Arc<Rectification>) -> Option<QueuedRectification> {
        self.push_inner(rectification, false)
    }

    /// Push only when the deployment's queue is empty and idle.
    pub fn push_if_empty(&self, rectification: Arc<Rectification>) -> Option<QueuedRectification> {
        self.push_inner(rectification, true)
    }

    fn push_inner(
        &self,
        rectification: Arc<Rectification>,
        only_if_empty: bool,
    ) -> Option<QueuedRectification> {
        let deployment_id = rectification.pair().id.clone();
        let queued = QueuedRectification {
            id: R11nId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            deployment_id: deployment_id.clone(),
            rectification,
        };

        let mut inner = self.inner.lock().unwrap();
        loop {
            let Some(queue) = inner.queues.get(&deployment_id) else {
                self.spawn_queue(&mut inner, deployment_id.clone());
                continue;
            };
            // The pending mirror counts the in-flight head as well as the
            // channel contents, so it is the authoritative bound.
            if only_if_empty && !queue.pending.is_empty() {
                return None;
            }
            if queue.pending.len() >= self.config.capacity {
                debug!(deployment_id = %deployment_id, "queue full, rejecting push");
                return None;
            }
            match queue.tx.try_send(queued.clone()) {
                Ok(()) => {
                    let position = queue.pending.len();
                    inner.known.insert(queued.id);
                    inner
                        .queues
                        .get_mut(&deployment_id)
                        .expect("queue looked up above")
                        .pending
                        .push_back(QueuedSummary {
                            id: queued.id,
                            deployment_id: deployment_id.clone(),
                            position,
                        });
                    trace!(deployment_id = %deployment_id, r11n_id = %queued.id, "queued rectification");
                    return Some(queued);
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(deployment_id = %deployment_id, "queue full, rejecting push");
                    return None;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // The worker tore the queue down between our lookup and
                    // the send; replace it and retry.
                    inner.queues.remove(&deployment_id);
                }
            }
        }
    }

    /// Block until the named item has been processed, returning its
    /// resolution. Returns `None` immediately for ids that were never pushed,
    /// and `None` if the item is abandoned (set dropped) before processing.
    pub async fn wait(
        &self,
        deployment_id: &DeploymentID,
        id: R11nId,
    ) -> Option<DiffResolution> {
        let mut completions = self.completions.subscribe();
        loop {
            {
                let inner = self.inner.lock().unwrap();
                if let Some(resolution) = inner.results.get(&id) {
                    if resolution.deployment_id == *deployment_id {
                        return Some(resolution.clone());
                    }
                    return None;
                }
                if !inner.known.contains(&id) {
                    return None;
                }
            }
            if completions.changed().await.is_err() {
                return None;
            }
        }
    }

    /// The recorded resolution for an id, if it has been processed.
    pub fn resolution(&self, id: R11nId) -> Option<DiffResolution> {
        self.inner.lock().unwrap().results.get(&id).cloned()
    }

    /// Whether this id was ever accepted by a push.
    pub fn knows(&self, id: R11nId) -> bool {
        self.inner.lock().unwrap().known.contains(&id)
    }

    /// How many items sit ahead of `id` in its queue, or `None` once the item
    /// is no longer queued.
    pub fn position(&self, id: R11nId) -> Option<usize> {
        let inner = self.inner.lock().unwrap();
        inner
            .queues
            .values()
            .find_map(|q| q.pending.iter().position(|item| item.id == id))
    }

    /// Copy-on-read snapshot of every queue's contents, in order.
    pub fn queues(&self) -> BTreeMap<DeploymentID, Vec<QueuedSummary>> {
        let inner = self.inner.lock().unwrap();
        inner
            .queues
            .iter()
            .map(|(did, q)| {
                let items = q
                    .pending
                    .iter()
                    .enumerate()
                    .map(|(position, item)| QueuedSummary {
                        position,
                        ..item.clone()
                    })
                    .collect();
                (did.clone(), items)
            })
            .collect()
    }

    /// Current length of one deployment's queue.
    pub fn len(&self, deployment_id: &DeploymentID) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .queues
            .get(deployment_id)
            .map_or(0, |q| q.pending.len())
    }

    pub fn is_empty(&self, deployment_id: &DeploymentID) -> bool {
        self.len(deployment_id) == 0
    }

    /// Create the channel and worker for a deployment id. Caller holds the
    /// set lock; the map entry is installed before the lock is released, so
    /// pushes racing with creation see the new queue.
    fn spawn_queue(&self, inner: &mut SetInner, deployment_id: DeploymentID) {
        let (tx, rx) = mpsc::channel(self.config.capacity);
        inner
            .queues
            .insert(deployment_id.clone(), QueueState {
                tx,
                pending: VecDeque::new(),
            });
        debug!(deployment_id = %deployment_id, "starting queue worker");
        tokio::spawn(queue_worker(
            deployment_id,
            rx,
            Arc::clone(&self.inner),
            Arc::clone(&self.handler),
            self.completions.clone(),
            self.config.idle_teardown(),
        ));
    }
}

/// Drains one deployment's queue. Exactly one of these runs per live queue;
/// the handler is invoked with no lock held.
async fn queue_worker(
    deployment_id: DeploymentID,
    mut rx: mpsc::Receiver<QueuedRectification>,
    inner: Arc<Mutex<SetInner>>,
    handler: Arc<dyn RectificationHandler>,
    completions: watch::Sender<u64>,
    idle_teardown: std::time::Duration,
) {
    loop {
        let queued = match tokio::time::timeout(idle_teardown, rx.recv()).await {
            Ok(Some(queued)) => queued,
            Ok(None) => break,
            Err(_) => {
                // Idle past the grace interval: tear down if still empty.
                let mut guard = inner.lock().unwrap();
                let empty = guard
                    .queues
                    .get(&deployment_id)
                    .is_some_and(|q| q.pending.is_empty());
                if empty {
                    debug!(deployment_id = %deployment_id, "tearing down idle queue");
                    guard.queues.remove(&deployment_id);
                    break;
                }
                continue;
            }
        };

        let resolution = handler.handle(&queued).await;

        {
            let mut guard = inner.lock().unwrap();
            if let Some(queue) = guard.queues.get_mut(&deployment_id) {
                let head = queue.pending.pop_front();
                debug_assert_eq!(head.map(|h| h.id), Some(queued.id));
            }
            guard.results.insert(queued.id, resolution);
        }
        completions.send_modify(|n| *n += 1);
    }
}
