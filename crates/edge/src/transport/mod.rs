// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + SSE transport for the edge instance.

pub mod http;
pub mod nats;
pub mod sse;

use std::sync::Arc;

use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::EdgeState;

/// Build the axum `Router` with all edge routes.
pub fn build_router(state: Arc<EdgeState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    // Bounded request time for the non-streaming endpoints only; an SSE
    // response stays open for the life of the subscriber.
    let timeout = TimeoutLayer::new(state.config.read_timeout());

    Router::new()
        .route("/api/chat", post(http::submit).layer(timeout.clone()))
        .route("/health", get(http::health).layer(timeout))
        .route("/api/sse", get(sse::subscribe))
        .fallback(http::fallback)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
