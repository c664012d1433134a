// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::reorder::{FinalizeError, IngestOutcome, IngestReject, ReorderManager};
use crate::testutil::{chunk, final_chunk, test_config};

fn manager() -> ReorderManager {
    ReorderManager::new(&test_config())
}

#[tokio::test]
async fn ingest_creates_buffer_lazily() -> anyhow::Result<()> {
    let manager = manager();
    assert_eq!(manager.buffer_count().await, 0);

    let outcome = manager.ingest(chunk("s1", "m1", 0, "a")).await;
    assert_eq!(outcome, Ok(IngestOutcome::Stored));
    assert_eq!(manager.buffer_count().await, 1);

    // A second message gets its own buffer.
    let _ = manager.ingest(chunk("s1", "m2", 0, "x")).await;
    assert_eq!(manager.buffer_count().await, 2);
    Ok(())
}

#[tokio::test]
async fn capacity_rejects_new_messages_but_not_existing() -> anyhow::Result<()> {
    let mut config = test_config();
    config.max_buffers = 2;
    let manager = ReorderManager::new(&config);

    let _ = manager.ingest(chunk("s1", "m1", 0, "a")).await;
    let _ = manager.ingest(chunk("s1", "m2", 0, "b")).await;

    assert_eq!(
        manager.ingest(chunk("s1", "m3", 0, "c")).await,
        Err(IngestReject::CapacityExhausted)
    );
    // Fragments for already-admitted messages still land.
    assert_eq!(manager.ingest(chunk("s1", "m1", 1, "a2")).await, Ok(IngestOutcome::Stored));
    assert_eq!(manager.buffer_count().await, 2);
    Ok(())
}

#[tokio::test]
async fn finalize_removes_buffer_and_assembles() -> anyhow::Result<()> {
    let manager = manager();
    let _ = manager.ingest(chunk("s1", "m1", 0, "ab")).await;
    let _ = manager.ingest(final_chunk("s1", "m1", 1, "cd", 9)).await;

    let (emitted, complete) = manager.drain("m1").await;
    assert_eq!(emitted.len(), 2);
    assert!(complete);

    let message = manager.finalize("m1").await.map_err(|e| anyhow::anyhow!("{e}"))?;
    assert_eq!(message.content, "abcd");
    assert_eq!(message.token_count, 9);
    assert_eq!(message.session_id, "s1");
    assert_eq!(manager.buffer_count().await, 0);

    assert_eq!(manager.finalize("m1").await.err(), Some(FinalizeError::NotFound));
    Ok(())
}

#[tokio::test]
async fn finalize_incomplete_discards_buffer() -> anyhow::Result<()> {
    let manager = manager();
    let _ = manager.ingest(chunk("s1", "m1", 0, "a")).await;
    let _ = manager.ingest(final_chunk("s1", "m1", 2, "c", 0)).await;
    let _ = manager.drain("m1").await;

    assert_eq!(
        manager.finalize("m1").await.err(),
        Some(FinalizeError::Incomplete { missing: vec![1] })
    );
    // The buffer is discarded, not restored.
    assert_eq!(manager.buffer_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn drain_unknown_message_is_empty() {
    let manager = manager();
    let (emitted, complete) = manager.drain("missing").await;
    assert!(emitted.is_empty());
    assert!(!complete);
}

#[tokio::test]
async fn state_tracks_buffer_counters() -> anyhow::Result<()> {
    let manager = manager();
    assert!(manager.state("m1").await.is_none());

    let _ = manager.ingest(chunk("s1", "m1", 0, "a")).await;
    let _ = manager.ingest(chunk("s1", "m1", 2, "c")).await;
    let _ = manager.drain("m1").await;

    let state = manager.state("m1").await.ok_or_else(|| anyhow::anyhow!("state missing"))?;
    assert_eq!(state.total_received, 2);
    assert_eq!(state.total_sent, 1);
    assert_eq!(state.missing_seqs, vec![1]);
    assert_eq!(state.total_expected, None);
    Ok(())
}
