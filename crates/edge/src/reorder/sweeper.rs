// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background sweeper evicting stale reorder buffers.

use std::sync::Arc;
use std::time::Instant;

use crate::reorder::EvictReason;
use crate::state::EdgeState;

/// Spawn the periodic buffer sweep as a background task.
pub fn spawn_sweeper(state: Arc<EdgeState>) {
    let interval = state.config.cleanup_interval();
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            for evicted in state.reorder.sweep(Instant::now()).await {
                match evicted.reason {
                    EvictReason::Lossy => tracing::warn!(
                        message_id = %evicted.message_id,
                        session_id = %evicted.session_id,
                        missing = ?evicted.state.missing_seqs,
                        age_secs = evicted.age_secs,
                        "evicting buffer with missing fragments; no completion will be emitted"
                    ),
                    EvictReason::Stuck => tracing::warn!(
                        message_id = %evicted.message_id,
                        session_id = %evicted.session_id,
                        received = evicted.state.total_received,
                        age_secs = evicted.age_secs,
                        "evicting stuck buffer"
                    ),
                    EvictReason::Unclaimed => tracing::warn!(
                        message_id = %evicted.message_id,
                        session_id = %evicted.session_id,
                        age_secs = evicted.age_secs,
                        "evicting complete buffer that was never finalized"
                    ),
                }
            }
        }

        tracing::debug!("buffer sweeper shutting down");
    });
}

#[cfg(test)]
#[path = "sweeper_tests.rs"]
mod tests;
