// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reorder buffer manager: one buffer per in-flight message.
//!
//! Locking: an outer `RwLock` guards the `message_id → buffer` map, each
//! buffer carries its own `Mutex`.  Always outer before inner.  Single-buffer
//! operations take the outer lock only long enough to clone the `Arc`, then
//! release it before locking the buffer so a busy message cannot stall the
//! map.

pub mod buffer;
pub mod sweeper;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};

use crate::config::EdgeConfig;
use crate::events::ChunkEnvelope;
use crate::reorder::buffer::ReorderBuffer;

// -- Results -------------------------------------------------------------------

/// Outcome of admitting one fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored,
    /// Same sequence and payload seen before; absorbed silently.
    Duplicate,
    /// Same sequence, different payload; the first fragment wins.
    PayloadMismatch,
}

/// Fragment rejected at admission; the ingest loop logs and drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestReject {
    /// The manager is at `max_buffers` and no buffer exists for the message.
    CapacityExhausted,
    /// The buffer holds `max_chunks_per_buffer` resident fragments.
    ChunkCapacity,
}

impl IngestReject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CapacityExhausted => "capacity_exhausted",
            Self::ChunkCapacity => "chunk_capacity",
        }
    }
}

impl fmt::Display for IngestReject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure to finalize a buffer into a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeError {
    NotFound,
    NoFinal,
    Incomplete { missing: Vec<u64> },
}

impl fmt::Display for FinalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("buffer not found"),
            Self::NoFinal => f.write_str("final fragment not seen"),
            Self::Incomplete { missing } => write!(f, "incomplete, missing {missing:?}"),
        }
    }
}

// -- Domain types --------------------------------------------------------------

/// A fully assembled reply, ready for the persistence hand-off.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub correlation_id: String,
    pub role: String,
    pub content: String,
    pub token_count: u64,
    pub finalized_at: String,
    pub metadata: Map<String, Value>,
}

/// Observability snapshot of one buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BufferState {
    /// Known only once the final fragment has been seen.
    pub total_expected: Option<u64>,
    pub total_received: u64,
    pub total_sent: u64,
    pub missing_seqs: Vec<u64>,
    pub is_complete: bool,
}

/// Why the sweeper evicted a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
    /// No final fragment and idle past `max_buffer_age`.
    Stuck,
    /// Final fragment seen but gaps remain past `missing_chunk_timeout`.
    Lossy,
    /// Drained to completion but never finalized out; idle past `max_buffer_age`.
    Unclaimed,
}

impl EvictReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stuck => "stuck",
            Self::Lossy => "lossy",
            Self::Unclaimed => "unclaimed",
        }
    }
}

/// One buffer evicted by a sweep.
#[derive(Debug, Clone)]
pub struct Evicted {
    pub message_id: String,
    pub session_id: String,
    pub reason: EvictReason,
    pub age_secs: u64,
    pub state: BufferState,
}

// -- Manager -------------------------------------------------------------------

/// Timeouts and caps for the buffer pool, copied from [`EdgeConfig`].
#[derive(Debug, Clone, Copy)]
struct BufferLimits {
    max_buffers: usize,
    max_chunks_per_buffer: usize,
    max_buffer_age: std::time::Duration,
    missing_chunk_timeout: std::time::Duration,
}

/// Holds every in-flight reorder buffer for this instance.
pub struct ReorderManager {
    buffers: RwLock<HashMap<String, Arc<Mutex<ReorderBuffer>>>>,
    limits: BufferLimits,
}

impl ReorderManager {
    pub fn new(config: &EdgeConfig) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            limits: BufferLimits {
                max_buffers: config.max_buffers,
                max_chunks_per_buffer: config.max_chunks_per_buffer,
                max_buffer_age: config.max_buffer_age(),
                missing_chunk_timeout: config.missing_chunk_timeout(),
            },
        }
    }

    /// Admit one fragment, creating the buffer on first sight.
    pub async fn ingest(&self, chunk: ChunkEnvelope) -> Result<IngestOutcome, IngestReject> {
        let entry = self.get_or_create(&chunk).await?;
        let mut buffer = entry.lock().await;
        buffer.ingest(chunk, self.limits.max_chunks_per_buffer)
    }

    async fn get_or_create(
        &self,
        chunk: &ChunkEnvelope,
    ) -> Result<Arc<Mutex<ReorderBuffer>>, IngestReject> {
        {
            let buffers = self.buffers.read().await;
            if let Some(entry) = buffers.get(&chunk.message_id) {
                return Ok(Arc::clone(entry));
            }
        }

        let mut buffers = self.buffers.write().await;
        // Double-check after acquiring the write lock.
        if let Some(entry) = buffers.get(&chunk.message_id) {
            return Ok(Arc::clone(entry));
        }
        if buffers.len() >= self.limits.max_buffers {
            return Err(IngestReject::CapacityExhausted);
        }
        let entry = Arc::new(Mutex::new(ReorderBuffer::new(
            &chunk.session_id,
            &chunk.message_id,
            Instant::now(),
        )));
        buffers.insert(chunk.message_id.clone(), Arc::clone(&entry));
        Ok(entry)
    }

    /// Drain the contiguous prefix of one message.
    pub async fn drain(&self, message_id: &str) -> (Vec<ChunkEnvelope>, bool) {
        let entry = {
            let buffers = self.buffers.read().await;
            buffers.get(message_id).map(Arc::clone)
        };
        match entry {
            Some(entry) => entry.lock().await.drain(),
            None => (Vec::new(), false),
        }
    }

    /// Remove the buffer and assemble the finalized message.
    ///
    /// The buffer is gone afterwards either way: an incomplete buffer is
    /// discarded, not restored.
    pub async fn finalize(&self, message_id: &str) -> Result<Message, FinalizeError> {
        let entry = {
            let mut buffers = self.buffers.write().await;
            buffers.remove(message_id)
        };
        let Some(entry) = entry else {
            return Err(FinalizeError::NotFound);
        };
        let mut buffer = entry.lock().await;
        buffer.assemble()
    }

    /// Observability snapshot for one message.
    pub async fn state(&self, message_id: &str) -> Option<BufferState> {
        let entry = {
            let buffers = self.buffers.read().await;
            buffers.get(message_id).map(Arc::clone)
        };
        match entry {
            Some(entry) => Some(entry.lock().await.state()),
            None => None,
        }
    }

    /// Number of distinct in-flight messages.
    pub async fn buffer_count(&self) -> usize {
        self.buffers.read().await.len()
    }

    /// Evict expired buffers relative to `now` and return what was removed.
    pub async fn sweep(&self, now: Instant) -> Vec<Evicted> {
        let snapshot: Vec<(String, Arc<Mutex<ReorderBuffer>>)> = {
            let buffers = self.buffers.read().await;
            buffers.iter().map(|(id, entry)| (id.clone(), Arc::clone(entry))).collect()
        };

        let mut candidates = Vec::new();
        for (id, entry) in snapshot {
            let buffer = entry.lock().await;
            if self.classify(&buffer, now).is_some() {
                candidates.push(id);
            }
        }
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut evicted = Vec::new();
        let mut buffers = self.buffers.write().await;
        for id in candidates {
            let Some(entry) = buffers.get(&id).map(Arc::clone) else { continue };
            let buffer = entry.lock().await;
            // Re-check under the write lock: a missing fragment may have
            // landed between the scan and now.
            let Some(reason) = self.classify(&buffer, now) else { continue };
            evicted.push(Evicted {
                message_id: id.clone(),
                session_id: buffer.session_id().to_owned(),
                reason,
                age_secs: now.saturating_duration_since(buffer.created_at()).as_secs(),
                state: buffer.state(),
            });
            drop(buffer);
            buffers.remove(&id);
        }
        evicted
    }

    fn classify(&self, buffer: &ReorderBuffer, now: Instant) -> Option<EvictReason> {
        let idle = now.saturating_duration_since(buffer.updated_at());
        if buffer.is_complete() {
            return (idle > self.limits.max_buffer_age).then_some(EvictReason::Unclaimed);
        }
        if buffer.final_seen() && idle > self.limits.missing_chunk_timeout {
            return Some(EvictReason::Lossy);
        }
        (idle > self.limits.max_buffer_age).then_some(EvictReason::Stuck)
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
