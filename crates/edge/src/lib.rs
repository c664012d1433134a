// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat-edge: stateless streaming edge instance for the chat platform.
//!
//! Accepts submissions over HTTP, hands them to the workflow tier via the
//! bus, and streams the generated reply back to subscribers as ordered SSE
//! chunk events, reordering out-of-order fragments per message.

pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod ingest;
pub mod persist;
pub mod registry;
pub mod reorder;
pub mod state;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::EdgeConfig;
use crate::directory::redis::RedisDirectory;
use crate::persist::LoggingSink;
use crate::state::EdgeState;
use crate::transport::nats::NatsBus;

/// Upper bound on the graceful drain after the acceptor stops.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the edge instance until shutdown.
pub async fn run(config: EdgeConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();
    let pod_id = config.resolve_pod_id();

    let directory = RedisDirectory::connect(&config).await?;
    let bus = NatsBus::connect(&config).await?;
    let nats_client = bus.client();

    let state = Arc::new(EdgeState::new(
        config,
        pod_id.clone(),
        Arc::new(directory),
        Arc::new(bus),
        Arc::new(LoggingSink),
        shutdown.clone(),
    ));

    spawn_signal_handler(shutdown.clone());
    reorder::sweeper::spawn_sweeper(Arc::clone(&state));
    registry::spawn_ping_task(Arc::clone(&state));
    transport::nats::spawn_fragment_subscriber(Arc::clone(&state), nats_client);

    tracing::info!(pod_id = %pod_id, "chat-edge listening on {addr}");
    let router = transport::build_router(Arc::clone(&state));
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    drain(&state).await;
    Ok(())
}

/// Graceful drain: flush the bus, close every subscriber stream, and remove
/// this instance's directory markers.  Bounded by [`DRAIN_TIMEOUT`].
async fn drain(state: &EdgeState) {
    tracing::info!("draining");
    match tokio::time::timeout(DRAIN_TIMEOUT, drain_inner(state)).await {
        Ok(()) => tracing::info!("drain complete"),
        Err(_) => tracing::warn!("drain timed out"),
    }
}

async fn drain_inner(state: &EdgeState) {
    if let Err(e) = state.bus.flush().await {
        tracing::warn!(err = %e, "bus flush failed");
    }

    state.registry.close_all().await;

    // Remove every marker this instance owns; TTL expiry covers whatever a
    // transport error leaves behind.
    match state.directory.streams_of(&state.pod_id).await {
        Ok(streams) => {
            for (stream_id, session_id) in streams {
                if let Err(e) =
                    state.directory.deregister(&session_id, &state.pod_id, &stream_id).await
                {
                    tracing::warn!(stream_id = %stream_id, err = %e, "directory cleanup failed");
                }
            }
        }
        Err(e) => tracing::warn!(err = %e, "directory cleanup skipped"),
    }
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(err = %e, "failed to install SIGINT handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!(err = %e, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }
        tracing::info!("shutdown signal received");
        shutdown.cancel();
    });
}
