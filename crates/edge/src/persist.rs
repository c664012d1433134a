// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence hand-off for finalized messages.
//!
//! The relational store lives in another tier; the edge only hands each
//! assembled message across this seam exactly once.  Failures are the sink's
//! problem to retry — the SSE completion event is emitted regardless.

use async_trait::async_trait;

use crate::reorder::Message;

/// Destination for finalized messages.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn store(&self, message: &Message) -> anyhow::Result<()>;
}

/// Sink that records the hand-off in the log.  Stands in for the external
/// persistence consumer in deployments where that tier subscribes to the
/// bus directly.
pub struct LoggingSink;

#[async_trait]
impl MessageSink for LoggingSink {
    async fn store(&self, message: &Message) -> anyhow::Result<()> {
        tracing::info!(
            message_id = %message.id,
            session_id = %message.session_id,
            correlation_id = %message.correlation_id,
            token_count = message.token_count,
            content_len = message.content.len(),
            "finalized message handed off"
        );
        Ok(())
    }
}
