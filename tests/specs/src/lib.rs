// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `chat-edge` binary as a subprocess and exercises it over
//! plain HTTP/1.1 sockets, with a NATS client standing in for the workflow
//! tier.  Requires live NATS and Redis; see `tests/smoke.rs` for gating.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Resolve the path to the compiled `chat-edge` binary.
pub fn edge_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("chat-edge")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `chat-edge` subprocess, killed on drop.
pub struct EdgeProcess {
    child: Child,
    pub port: u16,
    pub pod_id: String,
}

impl EdgeProcess {
    /// Spawn the binary against the given NATS/Redis endpoints.
    pub fn start(nats_url: &str, redis_host: &str, redis_port: u16) -> anyhow::Result<Self> {
        let port = free_port()?;
        let pod_id = format!("smoke-{port}");
        let child = Command::new(edge_binary())
            .env("SERVER_HOST", "127.0.0.1")
            .env("SERVER_PORT", port.to_string())
            .env("POD_ID", &pod_id)
            .env("NATS_URL", nats_url)
            .env("REDIS_HOST", redis_host)
            .env("REDIS_PORT", redis_port.to_string())
            .env("RUST_LOG", "info")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()?;
        Ok(Self { child, port, pod_id })
    }

    pub fn base_addr(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// Poll `/health` until it answers or the timeout elapses.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<serde_json::Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match http_get_json(&self.base_addr(), "/health").await {
                Ok(body) => return Ok(body),
                Err(_) if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Drop for EdgeProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Raw HTTP/1.1 GET returning the parsed JSON body.
pub async fn http_get_json(addr: &str, path: &str) -> anyhow::Result<serde_json::Value> {
    let mut stream = TcpStream::connect(addr).await?;
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8(buf)?;
    let body = response.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or("");
    Ok(serde_json::from_str(body.trim())?)
}

/// Raw HTTP/1.1 POST with a JSON body; returns `(status, parsed body)`.
pub async fn http_post_json(
    addr: &str,
    path: &str,
    body: &serde_json::Value,
) -> anyhow::Result<(u16, serde_json::Value)> {
    let payload = serde_json::to_string(body)?;
    let mut stream = TcpStream::connect(addr).await?;
    let request = format!(
        "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len()
    );
    stream.write_all(request.as_bytes()).await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8(buf)?;
    let status: u16 = response
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| anyhow::anyhow!("malformed status line"))?;
    let body = response.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or("");
    // Responses may be chunked; take the first JSON-looking line.
    let json_line = body
        .lines()
        .find(|line| line.trim_start().starts_with('{'))
        .unwrap_or("null");
    Ok((status, serde_json::from_str(json_line.trim())?))
}

/// An open SSE connection delivering parsed `(event, data)` pairs.
pub struct SseReader {
    lines: tokio::io::Lines<BufReader<TcpStream>>,
}

impl SseReader {
    /// Open `GET /api/sse` for the given session/user and consume the
    /// response headers.
    pub async fn connect(addr: &str, session_id: &str, user_id: &str) -> anyhow::Result<Self> {
        let mut stream = TcpStream::connect(addr).await?;
        let request = format!(
            "GET /api/sse?session_id={session_id}&user_id={user_id} HTTP/1.1\r\n\
             Host: localhost\r\nAccept: text/event-stream\r\n\r\n"
        );
        stream.write_all(request.as_bytes()).await?;

        let mut lines = BufReader::new(stream).lines();
        // Skip status line and headers.
        while let Some(line) = lines.next_line().await? {
            if line.is_empty() {
                break;
            }
        }
        Ok(Self { lines })
    }

    /// Read the next `(event, data)` pair, skipping transfer-chunking noise.
    pub async fn next_event(
        &mut self,
        timeout: Duration,
    ) -> anyhow::Result<(String, serde_json::Value)> {
        let read = async {
            let mut event_name = String::new();
            loop {
                let Some(line) = self.lines.next_line().await? else {
                    anyhow::bail!("sse stream closed");
                };
                if let Some(name) = line.strip_prefix("event: ") {
                    event_name = name.to_owned();
                } else if let Some(data) = line.strip_prefix("data: ") {
                    return Ok((event_name, serde_json::from_str(data)?));
                }
            }
        };
        tokio::time::timeout(timeout, read)
            .await
            .map_err(|_| anyhow::anyhow!("timed out waiting for sse event"))?
    }
}
