// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis-backed session directory using a deadpool connection pool.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Config, Pool, Runtime};

use crate::config::EdgeConfig;
use crate::directory::{
    heartbeat_key, member, parse_member, pod_connections_key, session_connections_key,
    session_meta_key, Directory, CONNECTION_TTL_SECS, HEARTBEAT_TTL_SECS, SESSION_META_TTL_SECS,
};
use crate::events::iso8601_now;

/// Session directory over a Redis-compatible store.
pub struct RedisDirectory {
    pool: Pool,
}

impl RedisDirectory {
    /// Create the pool and validate connectivity with a `PING`.
    ///
    /// Startup fails if the directory is unreachable; a stateless edge
    /// instance without routing state is not useful.
    pub async fn connect(config: &EdgeConfig) -> anyhow::Result<Self> {
        let url = config.redis_url();
        let mut pool_config = Config::from_url(&url);
        pool_config.pool = Some(deadpool_redis::PoolConfig {
            max_size: 16,
            timeouts: deadpool_redis::Timeouts {
                wait: Some(Duration::from_secs(5)),
                create: Some(Duration::from_secs(5)),
                recycle: Some(Duration::from_secs(5)),
            },
            ..Default::default()
        });
        let pool = pool_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| anyhow::anyhow!("failed to create redis pool: {e}"))?;

        let mut conn = pool.get().await?;
        deadpool_redis::redis::cmd("PING").query_async::<String>(&mut conn).await?;
        tracing::info!(host = %config.redis_host, port = config.redis_port, "session directory connected");

        Ok(Self { pool })
    }
}

#[async_trait]
impl Directory for RedisDirectory {
    async fn register(
        &self,
        session_id: &str,
        pod_id: &str,
        stream_id: &str,
    ) -> anyhow::Result<()> {
        let mut conn = self.pool.get().await?;
        let session_key = session_connections_key(session_id);
        let pod_key = pod_connections_key(pod_id);

        let _: () = conn.sadd(&session_key, member(pod_id, stream_id)).await?;
        let _: () = conn.expire(&session_key, CONNECTION_TTL_SECS as i64).await?;
        let _: () = conn.hset(&pod_key, stream_id, session_id).await?;
        let _: () = conn.expire(&pod_key, CONNECTION_TTL_SECS as i64).await?;
        let _: () =
            conn.set_ex(heartbeat_key(pod_id, stream_id), iso8601_now(), HEARTBEAT_TTL_SECS).await?;
        Ok(())
    }

    async fn deregister(
        &self,
        session_id: &str,
        pod_id: &str,
        stream_id: &str,
    ) -> anyhow::Result<()> {
        let mut conn = self.pool.get().await?;
        let _: () =
            conn.srem(session_connections_key(session_id), member(pod_id, stream_id)).await?;
        let _: () = conn.hdel(pod_connections_key(pod_id), stream_id).await?;
        let _: () = conn.del(heartbeat_key(pod_id, stream_id)).await?;
        Ok(())
    }

    async fn heartbeat(&self, pod_id: &str, stream_id: &str) -> anyhow::Result<()> {
        let mut conn = self.pool.get().await?;
        let pod_key = pod_connections_key(pod_id);
        let _: () =
            conn.set_ex(heartbeat_key(pod_id, stream_id), iso8601_now(), HEARTBEAT_TTL_SECS).await?;

        // Renew the marker TTLs; the session is looked up from the reverse map.
        let session_id: Option<String> = conn.hget(&pod_key, stream_id).await?;
        let _: () = conn.expire(&pod_key, CONNECTION_TTL_SECS as i64).await?;
        if let Some(session_id) = session_id {
            let _: () =
                conn.expire(session_connections_key(&session_id), CONNECTION_TTL_SECS as i64).await?;
        }
        Ok(())
    }

    async fn active_instances(&self, session_id: &str) -> anyhow::Result<Vec<String>> {
        let mut conn = self.pool.get().await?;
        let members: Vec<String> = conn.smembers(session_connections_key(session_id)).await?;
        let mut instances: Vec<String> = members
            .iter()
            .filter_map(|m| parse_member(m).map(|(pod, _)| pod.to_owned()))
            .collect();
        instances.sort();
        instances.dedup();
        Ok(instances)
    }

    async fn streams_of(&self, pod_id: &str) -> anyhow::Result<HashMap<String, String>> {
        let mut conn = self.pool.get().await?;
        let map: HashMap<String, String> = conn.hgetall(pod_connections_key(pod_id)).await?;
        Ok(map)
    }

    async fn set_session_meta(
        &self,
        session_id: &str,
        meta: &serde_json::Value,
    ) -> anyhow::Result<()> {
        let mut conn = self.pool.get().await?;
        let _: () = conn
            .set_ex(session_meta_key(session_id), serde_json::to_string(meta)?, SESSION_META_TTL_SECS)
            .await?;
        Ok(())
    }

    async fn session_meta(&self, session_id: &str) -> anyhow::Result<Option<serde_json::Value>> {
        let mut conn = self.pool.get().await?;
        let raw: Option<String> = conn.get(session_meta_key(session_id)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}
