// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-message reorder buffer.
//!
//! Collects unordered fragments of a single message, tracks the largest
//! contiguous prefix, and assembles the final message text once dense
//! coverage `[0, final_seq]` has been drained.  All methods are synchronous;
//! the manager wraps each buffer in its own lock.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::{Map, Value};

use crate::events::{ChunkEnvelope, ChunkError, ChunkType};
use crate::reorder::{BufferState, FinalizeError, IngestOutcome, IngestReject, Message};

/// Reorder/assembly state for one in-flight message.
pub struct ReorderBuffer {
    session_id: String,
    message_id: String,
    /// Sparse sequence → fragment map. Entries below `next_to_emit` are
    /// removed on drain; the text they carried lives on in `assembled`.
    chunks: HashMap<u64, ChunkEnvelope>,
    /// First never-emitted sequence.
    next_to_emit: u64,
    /// Largest sequence observed, `None` until the first fragment lands.
    max_seen: Option<u64>,
    final_seen: bool,
    final_seq: u64,
    /// Content payloads drained so far, in sequence order.
    assembled: String,
    /// Metadata bag carried by the final fragment.
    final_meta: Option<Map<String, Value>>,
    /// Error records attached to drained fragments.
    errors: Vec<ChunkError>,
    correlation_id: String,
    emitted: u64,
    received: u64,
    created_at: Instant,
    updated_at: Instant,
}

impl ReorderBuffer {
    pub fn new(session_id: &str, message_id: &str, now: Instant) -> Self {
        Self {
            session_id: session_id.to_owned(),
            message_id: message_id.to_owned(),
            chunks: HashMap::new(),
            next_to_emit: 0,
            max_seen: None,
            final_seen: false,
            final_seq: 0,
            assembled: String::new(),
            final_meta: None,
            errors: Vec::new(),
            correlation_id: String::new(),
            emitted: 0,
            received: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn updated_at(&self) -> Instant {
        self.updated_at
    }

    pub fn final_seen(&self) -> bool {
        self.final_seen
    }

    /// Whether every sequence up to and including the final one has been drained.
    pub fn is_complete(&self) -> bool {
        self.final_seen && self.next_to_emit > self.final_seq
    }

    /// Store one fragment.
    ///
    /// Duplicates with equal payload are absorbed silently; a payload
    /// mismatch keeps the first fragment and reports the anomaly to the
    /// caller for logging.
    pub fn ingest(
        &mut self,
        chunk: ChunkEnvelope,
        max_chunks: usize,
    ) -> Result<IngestOutcome, IngestReject> {
        let seq = chunk.chunk_id;

        // A sequence below the emit counter was already drained and released.
        if seq < self.next_to_emit {
            return Ok(IngestOutcome::Duplicate);
        }

        if let Some(existing) = self.chunks.get(&seq) {
            if existing.chunk == chunk.chunk {
                return Ok(IngestOutcome::Duplicate);
            }
            // First wins; the caller logs the anomaly.
            return Ok(IngestOutcome::PayloadMismatch);
        }

        if self.chunks.len() >= max_chunks {
            return Err(IngestReject::ChunkCapacity);
        }

        if self.correlation_id.is_empty() && !chunk.correlation_id.is_empty() {
            self.correlation_id = chunk.correlation_id.clone();
        }
        if chunk.is_final && !self.final_seen {
            self.final_seen = true;
            self.final_seq = seq;
            self.final_meta = chunk.metadata.clone();
            if !chunk.correlation_id.is_empty() {
                self.correlation_id = chunk.correlation_id.clone();
            }
        }

        self.max_seen = Some(self.max_seen.map_or(seq, |m| m.max(seq)));
        self.chunks.insert(seq, chunk);
        self.received += 1;
        self.updated_at = Instant::now();
        Ok(IngestOutcome::Stored)
    }

    /// Remove and return the contiguous run starting at `next_to_emit`,
    /// stopping at the first gap or after the final fragment.
    pub fn drain(&mut self) -> (Vec<ChunkEnvelope>, bool) {
        let mut emitted = Vec::new();
        while let Some(chunk) = self.chunks.remove(&self.next_to_emit) {
            let stop = chunk.is_final;
            if chunk.chunk_type == ChunkType::Content {
                self.assembled.push_str(&chunk.chunk);
            }
            if let Some(ref err) = chunk.error {
                self.errors.push(err.clone());
            }
            self.next_to_emit += 1;
            self.emitted += 1;
            emitted.push(chunk);
            if stop {
                break;
            }
        }
        (emitted, self.is_complete())
    }

    /// Assemble the finalized message, requiring the final fragment and dense
    /// coverage `[0, final_seq]`.  Consumes the accumulated text.
    pub fn assemble(&mut self) -> Result<Message, FinalizeError> {
        if !self.final_seen {
            return Err(FinalizeError::NoFinal);
        }
        // Pick up any contiguous tail the caller never drained.
        let _ = self.drain();
        if !self.is_complete() {
            return Err(FinalizeError::Incomplete { missing: self.missing_seqs() });
        }

        let mut metadata = self.final_meta.take().unwrap_or_default();
        let token_count = metadata.get("tokens_used").and_then(Value::as_u64).unwrap_or(0);
        if !self.errors.is_empty() {
            let errors = std::mem::take(&mut self.errors);
            metadata
                .insert("errors".to_owned(), serde_json::to_value(errors).unwrap_or_default());
        }

        Ok(Message {
            id: self.message_id.clone(),
            session_id: self.session_id.clone(),
            correlation_id: std::mem::take(&mut self.correlation_id),
            role: "assistant".to_owned(),
            content: std::mem::take(&mut self.assembled),
            token_count,
            finalized_at: crate::events::iso8601_now(),
            metadata,
        })
    }

    /// Sequences in the expected range that have not arrived.
    pub fn missing_seqs(&self) -> Vec<u64> {
        let upper = if self.final_seen {
            self.final_seq
        } else {
            match self.max_seen {
                Some(m) => m,
                None => return Vec::new(),
            }
        };
        (self.next_to_emit..=upper).filter(|seq| !self.chunks.contains_key(seq)).collect()
    }

    /// Observability snapshot.
    pub fn state(&self) -> BufferState {
        BufferState {
            total_expected: self.final_seen.then_some(self.final_seq + 1),
            total_received: self.received,
            total_sent: self.emitted,
            missing_seqs: self.missing_seqs(),
            is_complete: self.is_complete(),
        }
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
