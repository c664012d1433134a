// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for submission and health.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EdgeError;
use crate::events::{iso8601_now, WorkflowRequest};
use crate::state::EdgeState;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub ai_provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub context: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub message_id: String,
    pub session_id: String,
    pub status: String,
    pub timestamp: String,
    pub correlation_id: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub pod_id: String,
    pub timestamp: String,
    pub active_connections: usize,
    pub active_sessions: usize,
    pub active_buffers: usize,
    pub nats_connected: bool,
}

// -- Handlers -----------------------------------------------------------------

/// `POST /api/chat` — accept a submission and hand it to the workflow tier.
///
/// No database write happens here; the reply comes back as fragments on the
/// instance-scoped response subject.
pub async fn submit(
    State(s): State<Arc<EdgeState>>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            return EdgeError::BadRequest
                .to_http_response(format!("invalid request body: {rejection}"))
                .into_response()
        }
    };

    for (field, value) in
        [("session_id", &req.session_id), ("user_id", &req.user_id), ("message", &req.message)]
    {
        if value.is_empty() {
            return EdgeError::BadRequest
                .to_http_response(format!("missing required field: {field}"))
                .into_response();
        }
    }

    if !s.bus.is_connected() {
        return EdgeError::BusUnavailable
            .to_http_response("message bus disconnected")
            .into_response();
    }

    let message_id = uuid::Uuid::new_v4().to_string();
    let correlation_id = uuid::Uuid::new_v4().to_string();
    let timestamp = iso8601_now();

    let request = WorkflowRequest {
        message_id: message_id.clone(),
        session_id: req.session_id,
        user_id: req.user_id,
        message: req.message,
        context: merge_context(req.context, req.ai_provider, req.model),
        timestamp: timestamp.clone(),
        correlation_id: correlation_id.clone(),
    };

    if let Err(e) = s.bus.publish_workflow(&request).await {
        tracing::warn!(session_id = %request.session_id, err = %e, "workflow publish failed");
        return EdgeError::BusUnavailable
            .to_http_response(format!("publish failed: {e}"))
            .into_response();
    }

    tracing::info!(
        message_id = %message_id,
        session_id = %request.session_id,
        correlation_id = %correlation_id,
        "submission accepted"
    );

    (
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            message_id,
            session_id: request.session_id,
            status: "accepted".to_owned(),
            timestamp,
            correlation_id,
        }),
    )
        .into_response()
}

/// Fold the optional provider/model selections into the workflow context.
fn merge_context(
    context: Option<Value>,
    ai_provider: Option<String>,
    model: Option<String>,
) -> Option<Value> {
    if ai_provider.is_none() && model.is_none() {
        return context;
    }
    let mut map = match context {
        Some(Value::Object(map)) => map,
        Some(other) => {
            let mut map = Map::new();
            map.insert("context".to_owned(), other);
            map
        }
        None => Map::new(),
    };
    if let Some(provider) = ai_provider {
        map.insert("ai_provider".to_owned(), Value::String(provider));
    }
    if let Some(model) = model {
        map.insert("model".to_owned(), Value::String(model));
    }
    Some(Value::Object(map))
}

/// `GET /health`
pub async fn health(State(s): State<Arc<EdgeState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_owned(),
        pod_id: s.pod_id.clone(),
        timestamp: iso8601_now(),
        active_connections: s.registry.connection_count().await,
        active_sessions: s.registry.session_count().await,
        active_buffers: s.reorder.buffer_count().await,
        nats_connected: s.bus.is_connected(),
    })
}

/// JSON 404 for unknown paths.
pub async fn fallback() -> impl IntoResponse {
    EdgeError::NotFound.to_http_response("unknown path")
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
