// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-format types shared by the bus, SSE, and HTTP surfaces.
//!
//! This module is the canonical source for the fragment envelope carried on
//! the broker, the workflow request published on submit, and the named SSE
//! events pushed to subscriber streams.  All payloads are JSON; producers in
//! other tiers agree on these shapes, so field names here are load-bearing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// -- Bus subjects --------------------------------------------------------------

/// Subject the workflow tier consumes submissions from.
pub fn workflow_subject(session_id: &str) -> String {
    format!("chat.workflow.execute.{session_id}")
}

/// Instance-scoped subject this pod receives reply fragments on.
pub fn pod_subject(pod_id: &str) -> String {
    format!("chat.pod.{pod_id}.response")
}

/// Wildcard subject for fragments whose owning pod could not be resolved.
pub const BROADCAST_SUBJECT: &str = "chat.session.*.broadcast";

// -- Fragment envelope ---------------------------------------------------------

/// Discriminator for fragment payloads.  Only `content` fragments contribute
/// to the assembled message text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    #[default]
    Content,
    Metadata,
    Error,
    System,
}

/// Structured error attached to a fragment by the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

/// One reply fragment as carried on the bus.
///
/// `chunk_id` is the per-message sequence; exactly one fragment per message
/// has `is_final` set and it carries the largest sequence produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkEnvelope {
    pub session_id: String,
    pub message_id: String,
    pub chunk_id: u64,
    #[serde(default)]
    pub chunk: String,
    #[serde(default)]
    pub chunk_type: ChunkType,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ChunkError>,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub correlation_id: String,
}

// -- Workflow request ----------------------------------------------------------

/// Request envelope published to `chat.workflow.execute.<session_id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub message_id: String,
    pub session_id: String,
    pub user_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    pub timestamp: String,
    pub correlation_id: String,
}

// -- SSE events ----------------------------------------------------------------

/// A named SSE event queued to a subscriber stream.
///
/// Framed on the wire as `event: <name>\ndata: <json>\n\n`.
#[derive(Debug, Clone)]
pub struct OutboundEvent {
    pub name: &'static str,
    pub data: Value,
}

impl OutboundEvent {
    /// Handshake event emitted once per subscriber stream.
    pub fn connected(connection_id: &str, session_id: &str) -> Self {
        Self {
            name: "connected",
            data: serde_json::json!({
                "connection_id": connection_id,
                "session_id": session_id,
            }),
        }
    }

    /// One reply fragment, forwarded as received.
    pub fn chunk(envelope: &ChunkEnvelope) -> Self {
        Self {
            name: "chunk",
            data: serde_json::to_value(envelope).unwrap_or_default(),
        }
    }

    /// Terminal event for a fully assembled message.
    pub fn message_complete(message_id: &str, token_count: u64) -> Self {
        Self {
            name: "message_complete",
            data: serde_json::json!({
                "message_id": message_id,
                "token_count": token_count,
            }),
        }
    }

    /// Keep-alive emitted to every registered stream.
    pub fn ping() -> Self {
        Self { name: "ping", data: serde_json::json!({ "timestamp": iso8601_now() }) }
    }

    /// Render to an axum SSE frame.
    pub fn to_sse(&self) -> axum::response::sse::Event {
        axum::response::sse::Event::default().event(self.name).data(self.data.to_string())
    }
}

// -- Time ----------------------------------------------------------------------

/// Return the current UTC time as an ISO 8601 string (e.g. "2026-02-14T01:23:45Z").
pub fn iso8601_now() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let dur = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = dur.as_secs();
    let time_secs = secs % 86400;
    let hours = time_secs / 3600;
    let minutes = (time_secs % 3600) / 60;
    let seconds = time_secs % 60;
    // Civil calendar from days since epoch (Howard Hinnant's algorithm).
    let days = secs / 86400;
    let z = days as i64 + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    format!("{y:04}-{m:02}-{d:02}T{hours:02}:{minutes:02}:{seconds:02}Z")
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
