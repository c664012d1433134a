// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for one edge instance.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "chat-edge", about = "Streaming chat edge instance", version)]
pub struct EdgeConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "SERVER_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080, env = "SERVER_PORT")]
    pub port: u16,

    /// Request timeout for non-streaming endpoints, seconds.
    #[arg(long, default_value_t = 15, env = "SERVER_READ_TIMEOUT")]
    pub read_timeout_secs: u64,

    /// Response write timeout for non-streaming endpoints, seconds.
    #[arg(long, default_value_t = 15, env = "SERVER_WRITE_TIMEOUT")]
    pub write_timeout_secs: u64,

    /// Stable instance id. Defaults to the container hostname.
    #[arg(long, env = "POD_ID")]
    pub pod_id: Option<String>,

    /// Redis host for the session directory.
    #[arg(long, default_value = "127.0.0.1", env = "REDIS_HOST")]
    pub redis_host: String,

    /// Redis port.
    #[arg(long, default_value_t = 6379, env = "REDIS_PORT")]
    pub redis_port: u16,

    /// Redis password. If unset, no auth is sent.
    #[arg(long, env = "REDIS_PASSWORD")]
    pub redis_password: Option<String>,

    /// Redis logical database.
    #[arg(long, default_value_t = 0, env = "REDIS_DB")]
    pub redis_db: u32,

    /// NATS server URL.
    #[arg(long, default_value = "nats://127.0.0.1:4222", env = "NATS_URL")]
    pub nats_url: String,

    /// Max reconnect attempts after an established connection drops; -1 retries forever.
    #[arg(long, default_value_t = -1, env = "NATS_MAX_RECONNECTS")]
    pub nats_max_reconnects: i64,

    /// Delay between reconnect attempts, seconds.
    #[arg(long, default_value_t = 2, env = "NATS_RECONNECT_WAIT")]
    pub nats_reconnect_wait_secs: u64,

    /// Max reorder buffers held at once; further messages are rejected at ingest.
    #[arg(long, default_value_t = 1000, env = "BUFFER_MAX_BUFFERS")]
    pub max_buffers: usize,

    /// Max fragments one buffer may hold.
    #[arg(long, default_value_t = 2048, env = "BUFFER_MAX_CHUNKS")]
    pub max_chunks_per_buffer: usize,

    /// Max idle age of an incomplete buffer before eviction, seconds.
    #[arg(long, default_value_t = 300, env = "BUFFER_MAX_AGE")]
    pub max_buffer_age_secs: u64,

    /// Sweeper tick interval, seconds.
    #[arg(long, default_value_t = 30, env = "BUFFER_CLEANUP_INTERVAL")]
    pub cleanup_interval_secs: u64,

    /// Grace for buffers that saw the final fragment but still have gaps, seconds.
    #[arg(long, default_value_t = 30, env = "BUFFER_MISSING_CHUNK_TIMEOUT")]
    pub missing_chunk_timeout_secs: u64,

    /// Interval between per-stream directory liveness refreshes, seconds.
    #[arg(long, default_value_t = 10, env = "STREAM_HEARTBEAT_INTERVAL")]
    pub stream_heartbeat_secs: u64,

    /// Interval between SSE ping events, seconds.
    #[arg(long, default_value_t = 30, env = "SSE_PING_INTERVAL")]
    pub ping_interval_secs: u64,
}

impl EdgeConfig {
    /// Resolve the instance id: explicit `POD_ID`, else the container
    /// hostname, else a generated fallback.
    pub fn resolve_pod_id(&self) -> String {
        if let Some(ref id) = self.pod_id {
            if !id.is_empty() {
                return id.clone();
            }
        }
        if let Ok(hostname) = std::env::var("HOSTNAME") {
            if !hostname.is_empty() {
                return hostname;
            }
        }
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("edge-{}", &suffix[..8])
    }

    /// Connection URL for the directory store.
    pub fn redis_url(&self) -> String {
        match self.redis_password {
            Some(ref password) if !password.is_empty() => format!(
                "redis://:{password}@{}:{}/{}",
                self.redis_host, self.redis_port, self.redis_db
            ),
            _ => format!("redis://{}:{}/{}", self.redis_host, self.redis_port, self.redis_db),
        }
    }

    pub fn read_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.read_timeout_secs)
    }

    pub fn nats_reconnect_wait(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.nats_reconnect_wait_secs)
    }

    pub fn max_buffer_age(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.max_buffer_age_secs)
    }

    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn missing_chunk_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.missing_chunk_timeout_secs)
    }

    pub fn stream_heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.stream_heartbeat_secs)
    }

    pub fn ping_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ping_interval_secs)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
