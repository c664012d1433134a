// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fragment ingest pipeline: reorder, fan out, finalize.
//!
//! Runs once per fragment delivered by the bus subscriber.  Anything that
//! goes wrong here affects at most one fragment, buffer, or stream; the
//! pipeline itself never fails.

use crate::events::{ChunkEnvelope, OutboundEvent};
use crate::reorder::IngestOutcome;
use crate::state::EdgeState;

/// Feed one fragment through reorder → drain → fan-out → finalize.
pub async fn handle_fragment(state: &EdgeState, chunk: ChunkEnvelope) {
    let session_id = chunk.session_id.clone();
    let message_id = chunk.message_id.clone();

    match state.reorder.ingest(chunk).await {
        Ok(IngestOutcome::Stored) => {}
        Ok(IngestOutcome::Duplicate) => {
            tracing::debug!(message_id = %message_id, "duplicate fragment absorbed");
        }
        Ok(IngestOutcome::PayloadMismatch) => {
            tracing::warn!(
                message_id = %message_id,
                session_id = %session_id,
                "fragment payload mismatch at same sequence; keeping first"
            );
        }
        Err(reject) => {
            tracing::warn!(
                message_id = %message_id,
                session_id = %session_id,
                reason = %reject,
                "fragment rejected; dropped"
            );
            return;
        }
    }

    let (emit, complete) = state.reorder.drain(&message_id).await;
    for envelope in &emit {
        state.registry.send_to_session(&session_id, OutboundEvent::chunk(envelope)).await;
    }

    if complete {
        match state.reorder.finalize(&message_id).await {
            Ok(message) => {
                if let Err(e) = state.sink.store(&message).await {
                    // The sink owns retries; the client contract is
                    // independent of durable storage.
                    tracing::warn!(message_id = %message.id, err = %e, "persistence hand-off failed");
                }
                state
                    .registry
                    .send_to_session(
                        &session_id,
                        OutboundEvent::message_complete(&message.id, message.token_count),
                    )
                    .await;
                tracing::debug!(
                    message_id = %message.id,
                    session_id = %session_id,
                    token_count = message.token_count,
                    "message finalized"
                );
            }
            Err(e) => {
                tracing::warn!(message_id = %message_id, err = %e, "finalize failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "ingest_tests.rs"]
mod tests;
