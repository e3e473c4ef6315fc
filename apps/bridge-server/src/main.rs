//! Messaging bridge server.
//!
//! Holds one session with the messaging network through the protocol
//! sidecar and exposes it over HTTP and a WebSocket event channel.

mod config;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use bridge_core::BroadcastHub;
use bridge_dispatch::{BulkScheduler, DispatchGateway, RngSource, SchedulerConfig};
use bridge_session::{SessionController, sidecar::SidecarTransport, storage::FileCredentialStore};
use bridge_transport::{AppState, router};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Time the session loop gets to stop after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::parse();
    let shutdown = CancellationToken::new();

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let transport = Arc::new(SidecarTransport::new(config.sidecar(), events_tx));
    let credentials = Arc::new(FileCredentialStore::new(config.auth_dir.clone()));
    let hub = Arc::new(BroadcastHub::new(config.hub()));

    let session = Arc::new(SessionController::new(
        transport.clone(),
        credentials,
        hub.clone(),
        config.session(),
    ));
    let gateway = Arc::new(DispatchGateway::new(
        session.clone(),
        transport,
        config.gateway(),
    ));
    let scheduler = Arc::new(BulkScheduler::new(
        gateway.clone(),
        hub,
        Box::new(RngSource::from_os()),
        SchedulerConfig::default(),
        shutdown.clone(),
    ));

    let session_task = tokio::spawn({
        let session = session.clone();
        let shutdown = shutdown.clone();
        async move { session.run(events_rx, shutdown).await }
    });

    let app = router(AppState::new(session, gateway, scheduler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(
        auth_dir = %config.auth_dir.display(),
        sidecar = %config.sidecar_url,
        "Server listening on http://{addr}"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("server error")?;

    shutdown.cancel();
    if tokio::time::timeout(SHUTDOWN_GRACE, session_task).await.is_err() {
        tracing::warn!("session loop did not stop within {SHUTDOWN_GRACE:?}");
    }
    tracing::info!("bridge stopped");
    Ok(())
}

/// Resolve on Ctrl-C, cancelling `shutdown` so the session loop and any
/// bulk job stop with the server.
async fn shutdown_signal(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            shutdown.cancelled().await;
        }
    }
    shutdown.cancel();
}
