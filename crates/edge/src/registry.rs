// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory registry of live subscriber streams.
//!
//! Two indices under one lock: stream id → record, and session id → stream
//! ids.  Fan-out snapshots the target records under the read lock, releases
//! it, then queues events on each stream's bounded channel so a slow client
//! can never stall ingest or its siblings.  A full or closed channel counts
//! as a write failure and schedules the stream for teardown.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::events::OutboundEvent;
use crate::state::{epoch_ms, EdgeState};

/// Events queued per stream before a subscriber counts as failed.
const STREAM_CHANNEL_CAPACITY: usize = 256;

/// One live subscriber stream.
pub struct StreamRecord {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub connected_at: Instant,
    /// Client address as reported by the load balancer, if any.
    pub client_addr: Option<String>,
    /// Cancelled on removal; tears down the keeper task and response body.
    pub cancel: CancellationToken,
    tx: mpsc::Sender<OutboundEvent>,
    last_sent_ms: AtomicU64,
}

impl StreamRecord {
    /// Queue one event for the subscriber.  Fails if the client is gone or
    /// cannot keep up.
    pub fn push(&self, event: OutboundEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.last_sent_ms.store(epoch_ms(), Ordering::Relaxed);
                true
            }
            Err(_) => false,
        }
    }

    /// Epoch millis of the last successful write, 0 if none yet.
    pub fn last_sent_ms(&self) -> u64 {
        self.last_sent_ms.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
struct Indexes {
    by_id: HashMap<String, Arc<StreamRecord>>,
    by_session: HashMap<String, HashSet<String>>,
}

/// Registry of every subscriber stream held by this instance.
#[derive(Default)]
pub struct StreamRegistry {
    inner: RwLock<Indexes>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new stream and return its record plus the event receiver
    /// backing the SSE response body.
    pub async fn add(
        &self,
        session_id: &str,
        user_id: &str,
        client_addr: Option<String>,
    ) -> (Arc<StreamRecord>, mpsc::Receiver<OutboundEvent>) {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let record = Arc::new(StreamRecord {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_owned(),
            user_id: user_id.to_owned(),
            connected_at: Instant::now(),
            client_addr,
            cancel: CancellationToken::new(),
            tx,
            last_sent_ms: AtomicU64::new(0),
        });

        let mut inner = self.inner.write().await;
        inner.by_id.insert(record.id.clone(), Arc::clone(&record));
        inner.by_session.entry(session_id.to_owned()).or_default().insert(record.id.clone());
        (record, rx)
    }

    /// Remove a stream from both indices and cancel it.
    pub async fn remove(&self, stream_id: &str) -> Option<Arc<StreamRecord>> {
        let mut inner = self.inner.write().await;
        let record = inner.by_id.remove(stream_id)?;
        if let Some(ids) = inner.by_session.get_mut(&record.session_id) {
            ids.remove(stream_id);
            if ids.is_empty() {
                inner.by_session.remove(&record.session_id);
            }
        }
        drop(inner);
        record.cancel.cancel();
        Some(record)
    }

    /// Best-effort fan-out to every stream of a session.  Returns how many
    /// streams accepted the event; failed streams are torn down.
    pub async fn send_to_session(&self, session_id: &str, event: OutboundEvent) -> usize {
        let targets = self.session_snapshot(session_id).await;
        let mut delivered = 0;
        let mut failed = Vec::new();
        for record in &targets {
            if record.push(event.clone()) {
                delivered += 1;
            } else {
                failed.push(record.id.clone());
            }
        }
        for stream_id in failed {
            tracing::warn!(stream_id = %stream_id, session_id = %session_id,
                "stream write failed; removing subscriber");
            self.remove(&stream_id).await;
        }
        delivered
    }

    /// Queue an event on a single stream; tears it down on failure.
    pub async fn send_to_stream(&self, stream_id: &str, event: OutboundEvent) -> bool {
        let record = {
            let inner = self.inner.read().await;
            inner.by_id.get(stream_id).map(Arc::clone)
        };
        match record {
            Some(record) if record.push(event) => true,
            Some(record) => {
                tracing::warn!(stream_id = %record.id, "stream write failed; removing subscriber");
                self.remove(stream_id).await;
                false
            }
            None => false,
        }
    }

    /// Whether any live stream is subscribed to the session.
    pub async fn has_streams(&self, session_id: &str) -> bool {
        let inner = self.inner.read().await;
        inner.by_session.get(session_id).is_some_and(|ids| !ids.is_empty())
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.read().await.by_session.len()
    }

    /// Consistent snapshot of the streams of one session.
    async fn session_snapshot(&self, session_id: &str) -> Vec<Arc<StreamRecord>> {
        let inner = self.inner.read().await;
        match inner.by_session.get(session_id) {
            Some(ids) => {
                ids.iter().filter_map(|id| inner.by_id.get(id).map(Arc::clone)).collect()
            }
            None => Vec::new(),
        }
    }

    /// Snapshot of every registered stream.
    pub async fn all_streams(&self) -> Vec<Arc<StreamRecord>> {
        let inner = self.inner.read().await;
        inner.by_id.values().map(Arc::clone).collect()
    }

    /// Cancel and drop every stream; used on drain.
    pub async fn close_all(&self) {
        let mut inner = self.inner.write().await;
        for record in inner.by_id.values() {
            record.cancel.cancel();
        }
        inner.by_id.clear();
        inner.by_session.clear();
    }
}

/// Spawn the instance-wide keep-alive ticker: a `ping` event to every
/// registered stream; failures tear the stream down.
pub fn spawn_ping_task(state: Arc<EdgeState>) {
    let interval = state.config.ping_interval();
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            let streams = state.registry.all_streams().await;
            for record in streams {
                if !record.push(OutboundEvent::ping()) {
                    tracing::warn!(stream_id = %record.id, session_id = %record.session_id,
                        "ping write failed; removing subscriber");
                    state.registry.remove(&record.id).await;
                }
            }
        }

        tracing::debug!("ping ticker shutting down");
    });
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
