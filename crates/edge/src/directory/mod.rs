// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster-wide session directory.
//!
//! Maps each session to the `<instance_id>:<stream_id>` pairs currently
//! streaming it, so the workflow tier can route fragments to the owning
//! instance.  All values are plain ASCII strings; producers in other tiers
//! read these keys directly.  Every entry carries a TTL so a crashed
//! instance's markers age out without cleanup.

pub mod memory;
pub mod redis;

use std::collections::HashMap;

use async_trait::async_trait;

/// TTL for session membership sets and per-instance reverse maps.
pub const CONNECTION_TTL_SECS: u64 = 300;
/// TTL for per-stream liveness keys; refreshed every heartbeat tick.
pub const HEARTBEAT_TTL_SECS: u64 = 30;
/// TTL for cached per-session metadata.
pub const SESSION_META_TTL_SECS: u64 = 3600;

// -- Key shapes ----------------------------------------------------------------

pub fn session_connections_key(session_id: &str) -> String {
    format!("session:connections:{session_id}")
}

pub fn pod_connections_key(pod_id: &str) -> String {
    format!("pod:connections:{pod_id}")
}

pub fn heartbeat_key(pod_id: &str, stream_id: &str) -> String {
    format!("heartbeat:{pod_id}:{stream_id}")
}

pub fn session_meta_key(session_id: &str) -> String {
    format!("session:meta:{session_id}")
}

/// Membership marker stored in the session set.
pub fn member(pod_id: &str, stream_id: &str) -> String {
    format!("{pod_id}:{stream_id}")
}

/// Split a membership marker into `(instance_id, stream_id)`.
///
/// Splits on the last `:` — stream ids are opaque and instance ids may
/// themselves contain separators, so fixed-width parsing is not an option.
pub fn parse_member(member: &str) -> Option<(&str, &str)> {
    member.rsplit_once(':')
}

// -- Client seam ---------------------------------------------------------------

/// Session directory operations.
///
/// None of these run on the fragment hot path; callers log transport errors
/// and continue, relying on TTL expiry as the safety net.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Write all markers for a newly opened stream.
    async fn register(&self, session_id: &str, pod_id: &str, stream_id: &str)
        -> anyhow::Result<()>;

    /// Remove all markers for a closed stream.
    async fn deregister(
        &self,
        session_id: &str,
        pod_id: &str,
        stream_id: &str,
    ) -> anyhow::Result<()>;

    /// Refresh the liveness key and renew the TTLs of the marker entries.
    async fn heartbeat(&self, pod_id: &str, stream_id: &str) -> anyhow::Result<()>;

    /// Instance ids currently streaming a session, deduplicated.
    async fn active_instances(&self, session_id: &str) -> anyhow::Result<Vec<String>>;

    /// The `stream_id → session_id` map owned by one instance.
    async fn streams_of(&self, pod_id: &str) -> anyhow::Result<HashMap<String, String>>;

    /// Cache per-session metadata.
    async fn set_session_meta(
        &self,
        session_id: &str,
        meta: &serde_json::Value,
    ) -> anyhow::Result<()>;

    /// Read cached per-session metadata, if any.
    async fn session_meta(&self, session_id: &str) -> anyhow::Result<Option<serde_json::Value>>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
