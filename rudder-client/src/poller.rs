//! Multi-cluster status polling.
//!
//! The poller asks one server for its siblings (`/servers`) and the intended
//! deployments (`/gdm`), then runs one sub-poller per interesting cluster.
//! Each sub-poller hits `/status` every poll interval and feeds a per-cluster
//! state machine; the outer poller reduces those states to a single answer.
//!
//! A sub-poller derives a resolve id from the server's in-progress `Started`
//! timestamp. The first id it observes belongs to a resolve cycle that was
//! already underway (a carry-over), so any result from that cycle is reported
//! as `InProgress`; only once the id has changed at least once do terminal
//! states count.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use rudder_shared::api::{GdmData, ServerListData, StatusData};
use rudder_shared::deploy::{Deployment, Deployments};
use rudder_shared::filter::ResolveFilter;
use rudder_shared::resolution::{DiffResolution, ResolveStatus};

use crate::config::PollerClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::states::ResolveState;

/// One sub-poller's report for its cluster.
#[derive(Debug, Clone)]
struct PollResult {
    cluster: String,
    state: ResolveState,
    /// True once the sub-poller has seen the server's resolve id change,
    /// meaning results are no longer from the carried-over cycle.
    past_first_cycle: bool,
    error: Option<String>,
}

#[derive(Default)]
struct PollerStates {
    clusters: BTreeMap<String, PollResult>,
    /// High-water mark of the aggregate, so the reported state never moves
    /// backwards once every cluster is past its first cycle.
    floor: ResolveState,
}

/// Polls every interesting cluster until all reach a terminal state.
pub struct StatusPoller {
    config: PollerClientConfig,
    filter: ResolveFilter,
    client: reqwest::Client,
    states: Arc<Mutex<PollerStates>>,
}

impl StatusPoller {
    pub fn new(config: PollerClientConfig, filter: ResolveFilter) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            config,
            filter,
            client,
            states: Arc::new(Mutex::new(PollerStates::default())),
        })
    }

    /// Poll until every cluster is terminal, returning the aggregate state.
    ///
    /// Flipping `cancel` to true aborts all sub-pollers; the error carries
    /// the last computed aggregate, and [`StatusPoller::cluster_states`]
    /// still holds the per-cluster snapshot.
    pub async fn wait(&self, mut cancel: watch::Receiver<bool>) -> ClientResult<ResolveState> {
        if *cancel.borrow() {
            return Err(ClientError::Cancelled {
                last_state: self.aggregate(),
            });
        }

        let servers: ServerListData = self.get_json(&self.config.base_url, "/servers").await?;
        let gdm: GdmData = self.get_json(&self.config.base_url, "/gdm").await?;

        let intended: Deployments = gdm.deployments.into_iter().collect();
        let watched = intended.filter(|d| self.filter.matches_deployment(d));
        if watched.is_empty() {
            debug!(filter = %self.filter, "no intended deployments match");
            return Ok(ResolveState::NotIntended);
        }

        let subs = self.sub_pollers(&servers, &watched);
        if subs.is_empty() {
            return Ok(ResolveState::NotIntended);
        }

        let (result_tx, mut result_rx) = mpsc::channel::<PollResult>(16);
        let (done_tx, done_rx) = watch::channel(false);
        for sub in subs {
            tokio::spawn(sub.run(result_tx.clone(), done_rx.clone()));
        }
        drop(result_tx);

        loop {
            tokio::select! {
                maybe_result = result_rx.recv() => {
                    match maybe_result {
                        Some(result) => {
                            self.observe(result);
                            if self.finished() {
                                let _ = done_tx.send(true);
                                return Ok(self.aggregate());
                            }
                        }
                        // Every sub-poller has exited.
                        None => return Ok(self.aggregate()),
                    }
                }
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        let _ = done_tx.send(true);
                        return Err(ClientError::Cancelled {
                            last_state: self.aggregate(),
                        });
                    }
                }
            }
        }
    }

    /// The last reported state of each cluster.
    pub fn cluster_states(&self) -> BTreeMap<String, ResolveState> {
        self.states
            .lock()
            .unwrap()
            .clusters
            .iter()
            .map(|(cluster, result)| (cluster.clone(), result.state))
            .collect()
    }

    fn sub_pollers(&self, servers: &ServerListData, watched: &Deployments) -> Vec<SubPoller> {
        let mut subs = Vec::new();
        for server in &servers.servers {
            if !self.filter.matches_cluster_name(&server.cluster_name) {
                debug!(cluster = %server.cluster_name, "cluster not requested for polling");
                continue;
            }
            let cluster = server.cluster_name.clone();
            if watched.single(|d| d.cluster_name == cluster).is_none() {
                debug!(cluster = %cluster, "no intention to deploy into cluster");
                continue;
            }
            debug!(cluster = %cluster, url = %server.url, "starting sub-poller");
            subs.push(SubPoller {
                cluster_name: cluster,
                base_url: server.url.trim_end_matches('/').to_string(),
                client: self.client.clone(),
                location_filter: self.filter.location_only(),
                id_filter: self.filter.without_cluster(),
                interval: self.config.poll_interval(),
                max_http_errors: self.config.max_http_errors,
                http_error_count: 0,
                seen_resolve_id: String::new(),
                past_first_cycle: false,
            });
        }
        subs
    }

    fn observe(&self, result: PollResult) {
        debug!(
            cluster = %result.cluster,
            state = %result.state,
            error = ?result.error,
            "cluster reported"
        );
        self.states
            .lock()
            .unwrap()
            .clusters
            .insert(result.cluster.clone(), result);
    }

    /// Reduce per-cluster states to the aggregate.
    ///
    /// Carried-over results count as `InProgress`: a terminal state from a
    /// cluster still in its first observed cycle is clamped, and any such
    /// cluster still short of terminal forces the whole aggregate to
    /// `InProgress`. Once every cluster is past its first cycle the aggregate
    /// is the max across clusters, and never moves backwards.
    fn aggregate(&self) -> ResolveState {
        let mut states = self.states.lock().unwrap();
        let mut aggregate = ResolveState::NotPolled;
        let mut first_cycle_pending = false;
        for result in states.clusters.values() {
            let effective = if !result.past_first_cycle && result.state.is_terminal() {
                ResolveState::InProgress
            } else {
                result.state
            };
            if !result.past_first_cycle && !effective.is_terminal() {
                first_cycle_pending = true;
            }
            aggregate = aggregate.max(effective);
        }
        if first_cycle_pending {
            return ResolveState::InProgress;
        }
        aggregate = aggregate.max(states.floor);
        states.floor = aggregate;
        aggregate
    }

    fn finished(&self) -> bool {
        let states = self.states.lock().unwrap();
        !states.clusters.is_empty()
            && states
                .clusters
                .values()
                .all(|r| r.past_first_cycle && r.state.is_terminal())
    }

    async fn get_json<T: DeserializeOwned>(&self, base: &str, path: &str) -> ClientResult<T> {
        get_json(&self.client, base, path).await
    }
}

async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    base: &str,
    path: &str,
) -> ClientResult<T> {
    let url = format!("{}{}", base.trim_end_matches('/'), path);
    let response = client.get(&url).send().await?.error_for_status()?;
    Ok(response.json::<T>().await?)
}

/// Per-cluster polling state machine.
struct SubPoller {
    cluster_name: String,
    base_url: String,
    client: reqwest::Client,
    /// The watched source location, any version: used to find the deployment
    /// in server intent.
    location_filter: ResolveFilter,
    /// Location plus version constraints: used to detect the server working
    /// on a different version.
    id_filter: ResolveFilter,
    interval: std::time::Duration,
    max_http_errors: u32,
    http_error_count: u32,
    seen_resolve_id: String,
    past_first_cycle: bool,
}

impl SubPoller {
    async fn run(mut self, tx: mpsc::Sender<PollResult>, mut done: watch::Receiver<bool>) {
        let _ = tx
            .send(self.result(ResolveState::NotPolled, None))
            .await;
        let mut latest = self.poll_once().await;
        if tx.send(latest.clone()).await.is_err() {
            return;
        }
        loop {
            if latest.state.is_terminal() && latest.past_first_cycle {
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    latest = self.poll_once().await;
                    if tx.send(latest.clone()).await.is_err() {
                        return;
                    }
                }
                _ = done.changed() => {
                    if *done.borrow() {
                        return;
                    }
                }
            }
        }
    }

    fn result(&self, state: ResolveState, error: Option<String>) -> PollResult {
        PollResult {
            cluster: self.cluster_name.clone(),
            state,
            past_first_cycle: self.past_first_cycle,
            error,
        }
    }

    async fn poll_once(&mut self) -> PollResult {
        let mut data: StatusData =
            match get_json(&self.client, &self.base_url, "/status").await {
                Ok(data) => data,
                Err(err) => {
                    self.http_error_count += 1;
                    debug!(
                        cluster = %self.cluster_name,
                        errors = self.http_error_count,
                        error = %err,
                        "status request failed"
                    );
                    if self.http_error_count > self.max_http_errors {
                        warn!(cluster = %self.cluster_name, "giving up after repeated HTTP errors");
                        // A dead server has no resolve cycles to wait out;
                        // let the failure count immediately.
                        self.past_first_cycle = true;
                        return self.result(
                            ResolveState::Failed,
                            Some(format!(
                                "more than {} HTTP errors, giving up; latest: {err}",
                                self.max_http_errors
                            )),
                        );
                    }
                    return self.result(ResolveState::ErrHttp, Some(err.to_string()));
                }
            };
        self.http_error_count = 0;
        data.normalize();

        self.track_resolve_id(&data);

        let (intent, current) = state_features(data.in_progress.as_ref(), &self.location_filter);
        let (state, error) = self.compute_state(intent, current);

        // Answers that say "not acted on yet" may be stale views of a cycle
        // that has already finished; consult the completed snapshot too.
        if matches!(
            state,
            ResolveState::NotStarted | ResolveState::NotVersion | ResolveState::PendingRequest
        ) {
            let (intent, current) = state_features(data.completed.as_ref(), &self.location_filter);
            let (state, error) = self.compute_state(intent, current);
            return self.result(state, error);
        }

        self.result(state, error)
    }

    /// Watch the server's resolve id (its in-progress `Started` timestamp).
    /// The first id seen marks the carried-over cycle; once it changes, this
    /// sub-poller is past its first cycle.
    fn track_resolve_id(&mut self, data: &StatusData) {
        let resolve_id = data
            .in_progress
            .as_ref()
            .and_then(|status| status.started.as_ref())
            .map(|started| started.to_rfc3339())
            .unwrap_or_default();
        if resolve_id.is_empty() {
            return;
        }
        if self.seen_resolve_id.is_empty() {
            self.seen_resolve_id = resolve_id;
        } else if self.seen_resolve_id != resolve_id {
            debug!(cluster = %self.cluster_name, "resolve id changed, past carried-over cycle");
            self.seen_resolve_id = resolve_id;
            self.past_first_cycle = true;
        }
    }

    /// The state machine proper: from the server's intent for the watched
    /// deployment and its latest resolution of it, compute this cluster's
    /// state.
    fn compute_state(
        &self,
        server_intent: Option<&Deployment>,
        current: Option<&DiffResolution>,
    ) -> (ResolveState, Option<String>) {
        // No intent in this resolution: the cluster hasn't started on the
        // deployment. The freshest GDM does include it (we checked before
        // spawning), so the next cycle should pick it up.
        let Some(intent) = server_intent else {
            return (ResolveState::NotStarted, None);
        };

        // The cluster is resolving a different version than we watch for.
        if !self.id_filter.matches_deployment(intent) {
            return (ResolveState::NotVersion, None);
        }

        // Intent registered but nothing resolved yet.
        let Some(current) = current else {
            return (ResolveState::PendingRequest, None);
        };

        if let Some(error) = &current.error {
            if error.transient {
                debug!(cluster = %self.cluster_name, error = %error, "transient resolve error, retrying");
                return (ResolveState::ErrRez, Some(error.message.clone()));
            }
            warn!(cluster = %self.cluster_name, error = %error, "resolution failed");
            return (ResolveState::Failed, Some(error.message.clone()));
        }

        match current.desc {
            rudder_shared::resolution::ResolutionType::Unchanged => (ResolveState::Complete, None),
            rudder_shared::resolution::ResolutionType::Coming => {
                (ResolveState::TasksStarting, None)
            }
            _ => (ResolveState::InProgress, None),
        }
    }
}

/// Extract the server's intent for the watched deployment and its latest
/// resolution of it from one status snapshot.
fn state_features<'a>(
    status: Option<&'a ResolveStatus>,
    location_filter: &ResolveFilter,
) -> (Option<&'a Deployment>, Option<&'a DiffResolution>) {
    let Some(status) = status else {
        return (None, None);
    };
    let mut intent = None;
    for deployment in &status.intended {
        if location_filter.matches_deployment(deployment) {
            if intent.is_some() {
                // More than one match means the filter is too loose to name
                // a single deployment; report no intent.
                intent = None;
                break;
            }
            intent = Some(deployment);
        }
    }
    let current = status
        .log
        .iter()
        .find(|rez| location_filter.matches_manifest_id(&rez.deployment_id.manifest_id));
    (intent, current)
}
