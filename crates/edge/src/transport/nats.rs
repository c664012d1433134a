// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NATS bus client: workflow request publisher and fragment subscriber.
//!
//! Publishes one subject (`chat.workflow.execute.<session_id>`) and
//! subscribes two: the instance-scoped response subject and the wildcard
//! broadcast fallback.  Broadcast fragments are dropped unless a local
//! stream is subscribed to the session, otherwise every instance would
//! allocate a buffer for every message in the cluster.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;

use crate::config::EdgeConfig;
use crate::events::{pod_subject, workflow_subject, ChunkEnvelope, WorkflowRequest, BROADCAST_SUBJECT};
use crate::ingest;
use crate::state::EdgeState;

// -- Publish seam --------------------------------------------------------------

/// Publish-side view of the bus.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Publish a workflow request; one publish per accepted submission.
    async fn publish_workflow(&self, request: &WorkflowRequest) -> anyhow::Result<()>;

    /// Whether the underlying connection is currently established.
    fn is_connected(&self) -> bool;

    /// Flush pending publishes; called on graceful drain.
    async fn flush(&self) -> anyhow::Result<()>;
}

// -- NATS client ---------------------------------------------------------------

/// Bus client over a NATS connection.
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    /// Connect to the broker.  Initial connection failure is fatal; once
    /// established, reconnects retry per the configured policy.
    pub async fn connect(config: &EdgeConfig) -> anyhow::Result<Self> {
        let wait = config.nats_reconnect_wait();
        let max_reconnects = if config.nats_max_reconnects < 0 {
            None
        } else {
            Some(config.nats_max_reconnects as usize)
        };

        let opts = async_nats::ConnectOptions::new()
            .max_reconnects(max_reconnects)
            .reconnect_delay_callback(move |_attempts| wait)
            .event_callback(|event| async move {
                match event {
                    async_nats::Event::Connected => tracing::info!("nats connected"),
                    async_nats::Event::Disconnected => tracing::warn!("nats disconnected"),
                    other => tracing::debug!(event = %other, "nats event"),
                }
            });

        tracing::info!(url = %config.nats_url, "connecting to nats");
        let client = opts.connect(&config.nats_url).await?;
        Ok(Self { client })
    }

    /// Clone of the underlying client, for the subscriber loop.
    pub fn client(&self) -> async_nats::Client {
        self.client.clone()
    }
}

#[async_trait]
impl Bus for NatsBus {
    async fn publish_workflow(&self, request: &WorkflowRequest) -> anyhow::Result<()> {
        let subject = workflow_subject(&request.session_id);
        let payload = serde_json::to_vec(request)?;
        self.client.publish(subject, Bytes::from(payload)).await?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        matches!(self.client.connection_state(), async_nats::connection::State::Connected)
    }

    async fn flush(&self) -> anyhow::Result<()> {
        self.client.flush().await?;
        Ok(())
    }
}

// -- Fragment subscriber -------------------------------------------------------

/// Spawn the fragment subscriber as a background task.
pub fn spawn_fragment_subscriber(state: Arc<EdgeState>, client: async_nats::Client) {
    tokio::spawn(async move {
        if let Err(e) = run_subscriber(state, client).await {
            tracing::error!(err = %e, "fragment subscriber failed");
        }
    });
}

async fn run_subscriber(state: Arc<EdgeState>, client: async_nats::Client) -> anyhow::Result<()> {
    let direct_subject = pod_subject(&state.pod_id);
    let mut direct = client.subscribe(direct_subject.clone()).await?;
    let mut broadcast = client.subscribe(BROADCAST_SUBJECT.to_owned()).await?;
    tracing::info!(direct = %direct_subject, broadcast = BROADCAST_SUBJECT, "fragment subscriber started");

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            msg = direct.next() => {
                let Some(msg) = msg else { break };
                handle_fragment_payload(&state, &msg.payload, false).await;
            }
            msg = broadcast.next() => {
                let Some(msg) = msg else { break };
                handle_fragment_payload(&state, &msg.payload, true).await;
            }
        }
    }

    tracing::debug!("fragment subscriber shutting down");
    Ok(())
}

/// Decode one bus payload and feed it through the ingest pipeline.
///
/// Undecodable payloads are logged and skipped; they must never terminate
/// the subscription.  Broadcast fragments are filtered by local stream
/// presence before a buffer is allocated.
pub(crate) async fn handle_fragment_payload(state: &EdgeState, payload: &[u8], broadcast: bool) {
    let envelope: ChunkEnvelope = match serde_json::from_slice(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(err = %e, "undecodable fragment payload; skipping");
            return;
        }
    };

    if broadcast && !state.registry.has_streams(&envelope.session_id).await {
        tracing::debug!(
            session_id = %envelope.session_id,
            message_id = %envelope.message_id,
            "broadcast fragment for session with no local streams; dropped"
        );
        return;
    }

    ingest::handle_fragment(state, envelope).await;
}

#[cfg(test)]
#[path = "nats_tests.rs"]
mod tests;
