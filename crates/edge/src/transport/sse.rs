// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscriber stream handler (`GET /api/sse`).
//!
//! One long-lived `text/event-stream` response per subscriber.  The response
//! body is fed from the stream's registry channel; a per-stream keeper task
//! owns the directory markers and removes everything when the body is
//! dropped (client disconnect, write error, or drain).

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header::{HeaderName, HeaderValue, CACHE_CONTROL, CONNECTION};
use axum::http::HeaderMap;
use axum::response::sse::Sse;
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::EdgeError;
use crate::events::OutboundEvent;
use crate::registry::StreamRecord;
use crate::state::EdgeState;

/// Query parameters for the subscribe endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeQuery {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// `GET /api/sse?session_id=…&user_id=…`
pub async fn subscribe(
    State(s): State<Arc<EdgeState>>,
    headers: HeaderMap,
    Query(query): Query<SubscribeQuery>,
) -> Response {
    let Some(session_id) = query.session_id.filter(|v| !v.is_empty()) else {
        return EdgeError::BadRequest
            .to_http_response("missing required query parameter: session_id")
            .into_response();
    };
    let Some(user_id) = query.user_id.filter(|v| !v.is_empty()) else {
        return EdgeError::BadRequest
            .to_http_response("missing required query parameter: user_id")
            .into_response();
    };

    let client_addr = forwarded_client_addr(&headers);
    let (record, rx) = s.registry.add(&session_id, &user_id, client_addr).await;

    // Handshake event goes first on the channel, ahead of any fan-out.
    record.push(OutboundEvent::connected(&record.id, &session_id));

    tracing::info!(
        stream_id = %record.id,
        session_id = %session_id,
        user_id = %user_id,
        addr = ?record.client_addr,
        "subscriber stream opened"
    );

    spawn_stream_keeper(Arc::clone(&s), Arc::clone(&record));

    // Dropping the response body cancels the stream token, which unwinds the
    // keeper and releases the registry entry and directory markers.
    let guard = record.cancel.clone().drop_guard();
    let stream = ReceiverStream::new(rx).map(move |event| {
        let _ = &guard;
        Ok::<_, Infallible>(event.to_sse())
    });

    let mut response = Sse::new(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers
        .insert(HeaderName::from_static("x-accel-buffering"), HeaderValue::from_static("no"));
    response
}

/// Client address as reported by the load balancer.
fn forwarded_client_addr(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers.get("x-forwarded-for")?.to_str().ok()?;
    let first = forwarded.split(',').next()?.trim();
    (!first.is_empty()).then(|| first.to_owned())
}

/// Per-stream janitor: registers the stream in the directory, refreshes its
/// liveness on a ticker, and removes all markers once the stream ends.
fn spawn_stream_keeper(state: Arc<EdgeState>, record: Arc<StreamRecord>) {
    tokio::spawn(async move {
        let mut registered = false;
        let mut timer = tokio::time::interval(state.config.stream_heartbeat_interval());
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = record.cancel.cancelled() => break,
                _ = timer.tick() => {}
            }

            let result = if registered {
                state.directory.heartbeat(&state.pod_id, &record.id).await
            } else {
                state.directory.register(&record.session_id, &state.pod_id, &record.id).await
            };
            match result {
                Ok(()) => registered = true,
                Err(e) => {
                    // TTL expiry covers a directory that stays unreachable.
                    tracing::warn!(stream_id = %record.id, err = %e, "directory refresh failed");
                }
            }
        }

        state.registry.remove(&record.id).await;
        if let Err(e) =
            state.directory.deregister(&record.session_id, &state.pod_id, &record.id).await
        {
            tracing::warn!(stream_id = %record.id, err = %e, "directory deregister failed");
        }
        tracing::info!(
            stream_id = %record.id,
            session_id = %record.session_id,
            "subscriber stream closed"
        );
    });
}

#[cfg(test)]
#[path = "sse_tests.rs"]
mod tests;
