//! End-to-end poller tests against canned HTTP servers.
//!
//! Each test runs a real axum server on an ephemeral port that serves
//! `/servers`, `/gdm`, and a scripted sequence of `/status` responses, then
//! drives the real reqwest-based poller against it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use rudder_client::{ClientError, PollerClientConfig, ResolveState, StatusPoller};
use rudder_shared::api::{GdmData, ServerDescriptor, ServerListData, StatusData};
use rudder_shared::deploy::Deployment;
use rudder_shared::resolution::{
    DiffResolution, ResolutionError, ResolutionType, ResolvePhase, ResolveStatus,
};
use rudder_shared::test_utils::deployment;
use rudder_shared::{FieldMatcher, ResolveFilter};

/// Scripted single-cluster server: `/status` pops the next canned response,
/// repeating the last one forever.
#[derive(Clone)]
struct CannedServer {
    gdm: Arc<Vec<Deployment>>,
    statuses: Arc<Mutex<VecDeque<StatusData>>>,
    cluster: String,
    url: Arc<Mutex<String>>,
}

async fn serve(canned: CannedServer) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    *canned.url.lock().unwrap() = base_url.clone();

    let app = Router::new()
        .route(
            "/servers",
            get(|State(s): State<CannedServer>| async move {
                Json(ServerListData {
                    servers: vec![ServerDescriptor {
                        cluster_name: s.cluster.clone(),
                        url: s.url.lock().unwrap().clone(),
                    }],
                })
            }),
        )
        .route(
            "/gdm",
            get(|State(s): State<CannedServer>| async move {
                Json(GdmData {
                    deployments: s.gdm.as_ref().clone(),
                })
            }),
        )
        .route(
            "/status",
            get(|State(s): State<CannedServer>| async move {
                let mut statuses = s.statuses.lock().unwrap();
                let next = if statuses.len() > 1 {
                    statuses.pop_front().unwrap()
                } else {
                    statuses.front().cloned().unwrap_or_default()
                };
                Json(next)
            }),
        )
        .with_state(canned);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base_url
}

fn canned(gdm: Vec<Deployment>, statuses: Vec<StatusData>) -> CannedServer {
    CannedServer {
        gdm: Arc::new(gdm),
        statuses: Arc::new(Mutex::new(statuses.into())),
        cluster: "c1".to_string(),
        url: Arc::new(Mutex::new(String::new())),
    }
}

fn cycle_started(n: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(1_700_000_000 + n * 60, 0)
}

fn status(cycle: i64, intended: Vec<Deployment>, log: Vec<DiffResolution>) -> ResolveStatus {
    ResolveStatus {
        started: cycle_started(cycle),
        finished: None,
        phase: ResolvePhase::Applying,
        intended,
        log,
        errors: Vec::new(),
    }
}

fn watched_filter() -> ResolveFilter {
    ResolveFilter {
        repo: FieldMatcher::equals("github.com/x/a"),
        tag: FieldMatcher::equals("1.1.0"),
        ..Default::default()
    }
}

fn fast_config(base_url: String) -> PollerClientConfig {
    PollerClientConfig {
        base_url,
        poll_interval_ms: 25,
        timeout_ms: 2_000,
        max_http_errors: 10,
    }
}

fn unchanged(d: &Deployment) -> DiffResolution {
    DiffResolution::new(d.id(), ResolutionType::Unchanged)
}

#[tokio::test]
async fn empty_gdm_is_not_intended_immediately() {
    let base_url = serve(canned(vec![], vec![StatusData::default()])).await;
    let poller = StatusPoller::new(fast_config(base_url), watched_filter()).unwrap();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    assert_eq!(poller.wait(cancel_rx).await.unwrap(), ResolveState::NotIntended);
}

#[tokio::test]
async fn completes_once_past_the_carried_over_cycle() {
    let wanted = deployment("github.com/x/a", "c1", "1.1.0").build();
    // Cycle 0 is the carry-over; cycle 1 reports the deployment unchanged.
    let statuses = vec![
        StatusData {
            deployments: vec![],
            completed: None,
            in_progress: Some(status(0, vec![wanted.clone()], vec![unchanged(&wanted)])),
        },
        StatusData {
            deployments: vec![],
            completed: Some(status(1, vec![wanted.clone()], vec![unchanged(&wanted)])),
            in_progress: Some(status(1, vec![wanted.clone()], vec![unchanged(&wanted)])),
        },
    ];
    let base_url = serve(canned(vec![wanted], statuses)).await;
    let poller = StatusPoller::new(fast_config(base_url), watched_filter()).unwrap();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    assert_eq!(poller.wait(cancel_rx).await.unwrap(), ResolveState::Complete);
}

#[tokio::test]
async fn version_change_ends_complete() {
    let old = deployment("github.com/x/a", "c1", "1.0.0").build();
    let wanted = deployment("github.com/x/a", "c1", "1.1.0").build();
    // The server first resolves the old version, then picks up the new one,
    // works on it, and finally reports it stable.
    let statuses = vec![
        StatusData {
            deployments: vec![],
            completed: None,
            in_progress: Some(status(0, vec![old.clone()], vec![unchanged(&old)])),
        },
        StatusData {
            deployments: vec![],
            completed: None,
            in_progress: Some(status(
                1,
                vec![wanted.clone()],
                vec![DiffResolution::new(wanted.id(), ResolutionType::Updated)],
            )),
        },
        StatusData {
            deployments: vec![],
            completed: None,
            in_progress: Some(status(
                2,
                vec![wanted.clone()],
                vec![DiffResolution::new(wanted.id(), ResolutionType::Coming)],
            )),
        },
        StatusData {
            deployments: vec![],
            completed: None,
            in_progress: Some(status(3, vec![wanted.clone()], vec![unchanged(&wanted)])),
        },
    ];
    let base_url = serve(canned(vec![wanted], statuses)).await;
    let poller = StatusPoller::new(fast_config(base_url), watched_filter()).unwrap();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    assert_eq!(poller.wait(cancel_rx).await.unwrap(), ResolveState::Complete);
}

#[tokio::test]
async fn transient_resolve_error_does_not_fail_the_poll() {
    let wanted = deployment("github.com/x/a", "c1", "1.1.0").build();
    let mut errored = DiffResolution::new(wanted.id(), ResolutionType::Updated);
    errored.error = Some(ResolutionError::transient("scheduler returned 503"));
    let statuses = vec![
        StatusData {
            deployments: vec![],
            completed: None,
            in_progress: Some(status(0, vec![wanted.clone()], vec![])),
        },
        StatusData {
            deployments: vec![],
            completed: None,
            in_progress: Some(status(1, vec![wanted.clone()], vec![errored])),
        },
        StatusData {
            deployments: vec![],
            completed: None,
            in_progress: Some(status(2, vec![wanted.clone()], vec![unchanged(&wanted)])),
        },
    ];
    let base_url = serve(canned(vec![wanted], statuses)).await;
    let poller = StatusPoller::new(fast_config(base_url), watched_filter()).unwrap();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    assert_eq!(poller.wait(cancel_rx).await.unwrap(), ResolveState::Complete);
}

#[tokio::test]
async fn permanent_resolve_error_fails_terminally() {
    let wanted = deployment("github.com/x/a", "c1", "1.1.0").build();
    let mut errored = DiffResolution::new(wanted.id(), ResolutionType::Updated);
    errored.error = Some(ResolutionError::permanent("image was never built"));
    let statuses = vec![
        StatusData {
            deployments: vec![],
            completed: None,
            in_progress: Some(status(0, vec![wanted.clone()], vec![])),
        },
        StatusData {
            deployments: vec![],
            completed: None,
            in_progress: Some(status(1, vec![wanted.clone()], vec![errored])),
        },
    ];
    let base_url = serve(canned(vec![wanted], statuses)).await;
    let poller = StatusPoller::new(fast_config(base_url), watched_filter()).unwrap();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    assert_eq!(poller.wait(cancel_rx).await.unwrap(), ResolveState::Failed);
}

#[tokio::test]
async fn cancellation_returns_error_with_nonterminal_snapshot() {
    let wanted = deployment("github.com/x/a", "c1", "1.1.0").build();
    // The server never leaves its first cycle, so the poll cannot finish.
    let statuses = vec![StatusData {
        deployments: vec![],
        completed: None,
        in_progress: Some(status(0, vec![wanted.clone()], vec![])),
    }];
    let base_url = serve(canned(vec![wanted], statuses)).await;
    let poller = StatusPoller::new(fast_config(base_url), watched_filter()).unwrap();

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        let _ = cancel_tx.send(true);
    });

    let err = poller.wait(cancel_rx).await.unwrap_err();
    match err {
        ClientError::Cancelled { last_state } => {
            assert!(!last_state.is_terminal(), "got {last_state}");
        }
        other => panic!("expected cancellation, got {other}"),
    }
    let states = poller.cluster_states();
    assert!(states.values().any(|s| !s.is_terminal()));
}

#[tokio::test]
async fn old_server_without_intended_behaves_identically() {
    let wanted = deployment("github.com/x/a", "c1", "1.1.0").build();
    // An old server: `Intended` always empty, top-level `Deployments` set.
    let old_style = |cycle: i64, log: Vec<DiffResolution>| StatusData {
        deployments: vec![wanted.clone()],
        completed: Some(ResolveStatus {
            started: cycle_started(cycle),
            log: log.clone(),
            ..Default::default()
        }),
        in_progress: Some(ResolveStatus {
            started: cycle_started(cycle),
            log,
            ..Default::default()
        }),
    };
    let statuses = vec![
        old_style(0, vec![unchanged(&wanted)]),
        old_style(1, vec![unchanged(&wanted)]),
    ];
    let base_url = serve(canned(vec![wanted], statuses)).await;
    let poller = StatusPoller::new(fast_config(base_url), watched_filter()).unwrap();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    assert_eq!(poller.wait(cancel_rx).await.unwrap(), ResolveState::Complete);
}

#[tokio::test]
async fn unreachable_cluster_fails_after_http_error_budget() {
    let wanted = deployment("github.com/x/a", "c1", "1.1.0").build();
    let canned_server = canned(vec![wanted], vec![]);
    let base_url = serve(canned_server.clone()).await;

    // Point the sub-poller at a dead port while /servers and /gdm work.
    *canned_server.url.lock().unwrap() = "http://127.0.0.1:1".to_string();

    let mut config = fast_config(base_url);
    config.max_http_errors = 3;
    config.timeout_ms = 200;
    let poller = StatusPoller::new(config, watched_filter()).unwrap();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    assert_eq!(poller.wait(cancel_rx).await.unwrap(), ResolveState::Failed);
}
