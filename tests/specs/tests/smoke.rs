// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `chat-edge` binary against
//! live NATS and Redis, with a NATS client standing in for the workflow
//! tier.
//!
//! Gated behind `EDGE_SMOKE=1`.  Endpoints come from `NATS_URL` (default
//! `nats://127.0.0.1:4222`) and `REDIS_HOST`/`REDIS_PORT` (default
//! `127.0.0.1:6379`).  Build the binary first: `cargo build -p chat-edge`.

use std::time::Duration;

use futures_util::StreamExt;

use edge_specs::{http_post_json, EdgeProcess, SseReader};

const TIMEOUT: Duration = Duration::from_secs(10);

/// Skip the test if `EDGE_SMOKE` is not set.
macro_rules! skip_unless_smoke {
    () => {
        if std::env::var("EDGE_SMOKE").is_err() {
            eprintln!("skipping smoke test (set EDGE_SMOKE=1 to enable)");
            return Ok(());
        }
    };
}

fn nats_url() -> String {
    std::env::var("NATS_URL").unwrap_or_else(|_| "nats://127.0.0.1:4222".to_owned())
}

fn redis_endpoint() -> (String, u16) {
    let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
    let port = std::env::var("REDIS_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(6379);
    (host, port)
}

#[tokio::test]
async fn health_reports_connected_collaborators() -> anyhow::Result<()> {
    skip_unless_smoke!();
    let (redis_host, redis_port) = redis_endpoint();
    let edge = EdgeProcess::start(&nats_url(), &redis_host, redis_port)?;

    let health = edge.wait_healthy(TIMEOUT).await?;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["pod_id"], edge.pod_id.as_str());
    assert_eq!(health["nats_connected"], true);
    Ok(())
}

#[tokio::test]
async fn submit_reaches_workflow_subject_and_reply_streams_back() -> anyhow::Result<()> {
    skip_unless_smoke!();
    let (redis_host, redis_port) = redis_endpoint();
    let edge = EdgeProcess::start(&nats_url(), &redis_host, redis_port)?;
    edge.wait_healthy(TIMEOUT).await?;

    // Stand in for the workflow tier.
    let nats = async_nats::connect(nats_url()).await?;
    let mut workflow_sub = nats.subscribe("chat.workflow.execute.smoke-s1".to_owned()).await?;

    // Open the subscriber stream first.
    let mut sse = SseReader::connect(&edge.base_addr(), "smoke-s1", "u1").await?;
    let (event, connected) = sse.next_event(TIMEOUT).await?;
    assert_eq!(event, "connected");
    assert_eq!(connected["session_id"], "smoke-s1");

    // Submit and capture the workflow request.
    let (status, accepted) = http_post_json(
        &edge.base_addr(),
        "/api/chat",
        &serde_json::json!({"session_id": "smoke-s1", "user_id": "u1", "message": "hi"}),
    )
    .await?;
    assert_eq!(status, 202);
    assert_eq!(accepted["status"], "accepted");
    let message_id = accepted["message_id"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("missing message_id"))?
        .to_owned();

    let request = tokio::time::timeout(TIMEOUT, workflow_sub.next())
        .await
        .map_err(|_| anyhow::anyhow!("no workflow request"))?
        .ok_or_else(|| anyhow::anyhow!("workflow subscription closed"))?;
    let envelope: serde_json::Value = serde_json::from_slice(&request.payload)?;
    assert_eq!(envelope["message_id"], message_id.as_str());
    assert_eq!(envelope["user_id"], "u1");

    // Play the generator: fragments out of order on the pod subject.
    let subject = format!("chat.pod.{}.response", edge.pod_id);
    for (seq, text, is_final) in [(2u64, "c", true), (0, "a", false), (1, "b", false)] {
        let mut fragment = serde_json::json!({
            "session_id": "smoke-s1",
            "message_id": message_id.as_str(),
            "chunk_id": seq,
            "chunk": text,
            "chunk_type": "content",
            "is_final": is_final,
            "correlation_id": envelope["correlation_id"],
        });
        if is_final {
            fragment["metadata"] = serde_json::json!({"tokens_used": 3});
        }
        nats.publish(subject.clone(), serde_json::to_vec(&fragment)?.into()).await?;
    }
    nats.flush().await?;

    // The subscriber observes chunks in sequence order, then completion.
    for expected_seq in 0u64..=2 {
        let (event, data) = sse.next_event(TIMEOUT).await?;
        assert_eq!(event, "chunk");
        assert_eq!(data["chunk_id"], expected_seq);
    }
    let (event, complete) = sse.next_event(TIMEOUT).await?;
    assert_eq!(event, "message_complete");
    assert_eq!(complete["message_id"], message_id.as_str());
    assert_eq!(complete["token_count"], 3);
    Ok(())
}
