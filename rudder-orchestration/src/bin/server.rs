//! Rudder server binary: runs the auto-resolver and the HTTP surface.
//!
//! Collaborators are the in-memory development stand-ins until production
//! adapters (git state store, cluster scheduler, image registry) are wired
//! in. Configuration comes from the file named by `RUDDER_CONFIG`, with
//! every setting defaulted.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;

use rudder_orchestration::rectify::{DeployQueueSet, RectifyContext};
use rudder_orchestration::resolver::{AutoResolver, RectifyHandler};
use rudder_orchestration::web::{router, AppState};
use rudder_orchestration::dev::{DevDeployer, DevRegistry};
use rudder_shared::config::RudderConfig;
use rudder_shared::filter::ResolveFilter;
use rudder_shared::logging::init_tracing;
use rudder_shared::store::{MemoryStateStore, StateStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = RudderConfig::from_env().context("loading configuration")?;

    let state_store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::default());
    let ctx = RectifyContext::new(Arc::new(DevDeployer::new()), Arc::new(DevRegistry))
        .with_timeout(config.resolver.rectification_timeout());
    let queue_set = Arc::new(DeployQueueSet::new(
        Arc::new(RectifyHandler::new(ctx.clone())),
        config.queues.clone(),
    ));

    let resolver = AutoResolver::new(
        Arc::clone(&state_store),
        Arc::clone(&queue_set),
        ctx,
        ResolveFilter::all(),
        config.resolver.clone(),
    );
    let board = resolver.board();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let resolver_handle = tokio::spawn(async move { resolver.run(shutdown_rx).await });

    let app = router(AppState::new(state_store, queue_set, board));
    let listener = tokio::net::TcpListener::bind(&config.web.bind_address)
        .await
        .with_context(|| format!("binding {}", config.web.bind_address))?;
    info!(address = %config.web.bind_address, "rudder server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await
        .context("serving HTTP")?;

    let _ = shutdown_tx.send(true);
    resolver_handle.await.context("stopping auto-resolver")?;
    Ok(())
}
