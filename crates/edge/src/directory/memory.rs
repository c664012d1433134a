// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory session directory for tests and single-instance runs.
//!
//! Holds the same key shapes as the Redis backend but in process memory; TTLs
//! are recorded as last-touch timestamps rather than enforced by expiry, so
//! assertions can inspect them.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::directory::{member, parse_member, Directory};

#[derive(Default)]
struct Tables {
    /// session id → membership markers.
    sessions: HashMap<String, HashSet<String>>,
    /// pod id → (stream id → session id).
    pods: HashMap<String, HashMap<String, String>>,
    /// `<pod>:<stream>` → last heartbeat.
    heartbeats: HashMap<String, Instant>,
    meta: HashMap<String, serde_json::Value>,
}

/// Process-local [`Directory`] implementation.
#[derive(Default)]
pub struct MemoryDirectory {
    tables: RwLock<Tables>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last heartbeat instant for a stream, if any.
    pub async fn last_heartbeat(&self, pod_id: &str, stream_id: &str) -> Option<Instant> {
        let tables = self.tables.read().await;
        tables.heartbeats.get(&member(pod_id, stream_id)).copied()
    }

    /// Whether a membership marker exists for the stream.
    pub async fn has_member(&self, session_id: &str, pod_id: &str, stream_id: &str) -> bool {
        let tables = self.tables.read().await;
        tables
            .sessions
            .get(session_id)
            .is_some_and(|members| members.contains(&member(pod_id, stream_id)))
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn register(
        &self,
        session_id: &str,
        pod_id: &str,
        stream_id: &str,
    ) -> anyhow::Result<()> {
        let mut tables = self.tables.write().await;
        let marker = member(pod_id, stream_id);
        tables.sessions.entry(session_id.to_owned()).or_default().insert(marker.clone());
        tables
            .pods
            .entry(pod_id.to_owned())
            .or_default()
            .insert(stream_id.to_owned(), session_id.to_owned());
        tables.heartbeats.insert(marker, Instant::now());
        Ok(())
    }

    async fn deregister(
        &self,
        session_id: &str,
        pod_id: &str,
        stream_id: &str,
    ) -> anyhow::Result<()> {
        let mut tables = self.tables.write().await;
        let marker = member(pod_id, stream_id);
        if let Some(members) = tables.sessions.get_mut(session_id) {
            members.remove(&marker);
            if members.is_empty() {
                tables.sessions.remove(session_id);
            }
        }
        if let Some(streams) = tables.pods.get_mut(pod_id) {
            streams.remove(stream_id);
            if streams.is_empty() {
                tables.pods.remove(pod_id);
            }
        }
        tables.heartbeats.remove(&marker);
        Ok(())
    }

    async fn heartbeat(&self, pod_id: &str, stream_id: &str) -> anyhow::Result<()> {
        let mut tables = self.tables.write().await;
        tables.heartbeats.insert(member(pod_id, stream_id), Instant::now());
        Ok(())
    }

    async fn active_instances(&self, session_id: &str) -> anyhow::Result<Vec<String>> {
        let tables = self.tables.read().await;
        let mut instances: Vec<String> = tables
            .sessions
            .get(session_id)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|m| parse_member(m).map(|(pod, _)| pod.to_owned()))
                    .collect()
            })
            .unwrap_or_default();
        instances.sort();
        instances.dedup();
        Ok(instances)
    }

    async fn streams_of(&self, pod_id: &str) -> anyhow::Result<HashMap<String, String>> {
        let tables = self.tables.read().await;
        Ok(tables.pods.get(pod_id).cloned().unwrap_or_default())
    }

    async fn set_session_meta(
        &self,
        session_id: &str,
        meta: &serde_json::Value,
    ) -> anyhow::Result<()> {
        let mut tables = self.tables.write().await;
        tables.meta.insert(session_id.to_owned(), meta.clone());
        Ok(())
    }

    async fn session_meta(&self, session_id: &str) -> anyhow::Result<Option<serde_json::Value>> {
        let tables = self.tables.read().await;
        Ok(tables.meta.get(session_id).cloned())
    }
}
