// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::EdgeConfig;
use crate::directory::Directory;
use crate::persist::MessageSink;
use crate::registry::StreamRegistry;
use crate::reorder::ReorderManager;
use crate::transport::nats::Bus;

/// Shared edge-instance state.
///
/// Constructed once in `run()` and passed as `Arc<EdgeState>` to every
/// handler and background task; never recreated.
pub struct EdgeState {
    pub config: EdgeConfig,
    /// Resolved process-unique instance id.
    pub pod_id: String,
    pub registry: StreamRegistry,
    pub reorder: ReorderManager,
    pub directory: Arc<dyn Directory>,
    pub bus: Arc<dyn Bus>,
    pub sink: Arc<dyn MessageSink>,
    pub shutdown: CancellationToken,
}

impl EdgeState {
    pub fn new(
        config: EdgeConfig,
        pod_id: String,
        directory: Arc<dyn Directory>,
        bus: Arc<dyn Bus>,
        sink: Arc<dyn MessageSink>,
        shutdown: CancellationToken,
    ) -> Self {
        let reorder = ReorderManager::new(&config);
        Self {
            config,
            pod_id,
            registry: StreamRegistry::new(),
            reorder,
            directory,
            bus,
            sink,
            shutdown,
        }
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
