// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for unit tests: config, state with in-memory
//! collaborators, and fragment builders.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::EdgeConfig;
use crate::directory::memory::MemoryDirectory;
use crate::events::{ChunkEnvelope, ChunkType, WorkflowRequest};
use crate::persist::MessageSink;
use crate::reorder::Message;
use crate::state::EdgeState;
use crate::transport::nats::Bus;

pub fn test_config() -> EdgeConfig {
    EdgeConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        read_timeout_secs: 5,
        write_timeout_secs: 5,
        pod_id: Some("pod-test".to_owned()),
        redis_host: "127.0.0.1".to_owned(),
        redis_port: 6379,
        redis_password: None,
        redis_db: 0,
        nats_url: "nats://127.0.0.1:4222".to_owned(),
        nats_max_reconnects: -1,
        nats_reconnect_wait_secs: 2,
        max_buffers: 8,
        max_chunks_per_buffer: 64,
        max_buffer_age_secs: 300,
        cleanup_interval_secs: 30,
        missing_chunk_timeout_secs: 30,
        stream_heartbeat_secs: 1,
        ping_interval_secs: 30,
    }
}

/// Bus fake that records published workflow requests.
pub struct RecordingBus {
    pub published: Mutex<Vec<WorkflowRequest>>,
    pub connected: AtomicBool,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self { published: Mutex::new(Vec::new()), connected: AtomicBool::new(true) }
    }
}

#[async_trait]
impl Bus for RecordingBus {
    async fn publish_workflow(&self, request: &WorkflowRequest) -> anyhow::Result<()> {
        self.published.lock().await.push(request.clone());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn flush(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Sink fake that records finalized messages.
#[derive(Default)]
pub struct RecordingSink {
    pub stored: Mutex<Vec<Message>>,
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn store(&self, message: &Message) -> anyhow::Result<()> {
        self.stored.lock().await.push(message.clone());
        Ok(())
    }
}

/// Edge state wired to in-memory collaborators, with handles kept for
/// assertions.
pub struct TestHarness {
    pub state: Arc<EdgeState>,
    pub bus: Arc<RecordingBus>,
    pub sink: Arc<RecordingSink>,
    pub directory: Arc<MemoryDirectory>,
}

pub fn harness() -> TestHarness {
    harness_with(test_config())
}

pub fn harness_with(config: EdgeConfig) -> TestHarness {
    let bus = Arc::new(RecordingBus::new());
    let sink = Arc::new(RecordingSink::default());
    let directory = Arc::new(MemoryDirectory::new());
    let state = Arc::new(EdgeState::new(
        config,
        "pod-test".to_owned(),
        Arc::clone(&directory) as Arc<dyn crate::directory::Directory>,
        Arc::clone(&bus) as Arc<dyn Bus>,
        Arc::clone(&sink) as Arc<dyn MessageSink>,
        CancellationToken::new(),
    ));
    TestHarness { state, bus, sink, directory }
}

/// A content fragment.
pub fn chunk(session_id: &str, message_id: &str, seq: u64, text: &str) -> ChunkEnvelope {
    ChunkEnvelope {
        session_id: session_id.to_owned(),
        message_id: message_id.to_owned(),
        chunk_id: seq,
        chunk: text.to_owned(),
        chunk_type: ChunkType::Content,
        is_final: false,
        metadata: None,
        error: None,
        timestamp: String::new(),
        correlation_id: "corr-test".to_owned(),
    }
}

/// A final content fragment carrying a `tokens_used` metadata field.
pub fn final_chunk(
    session_id: &str,
    message_id: &str,
    seq: u64,
    text: &str,
    tokens: u64,
) -> ChunkEnvelope {
    let mut envelope = chunk(session_id, message_id, seq, text);
    envelope.is_final = true;
    let mut metadata = serde_json::Map::new();
    metadata.insert("tokens_used".to_owned(), serde_json::json!(tokens));
    envelope.metadata = Some(metadata);
    envelope
}
