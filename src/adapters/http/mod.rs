//! HTTP adapters - REST API implementations.

pub mod webhook;

use std::time::Duration;

use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use webhook::{webhook_router, WebhookAppState};

/// Full application router with request tracing and a per-request timeout.
pub fn app_router(state: WebhookAppState, request_timeout: Duration) -> Router {
    webhook_router()
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}
