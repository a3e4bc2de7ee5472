//! HTTP adapter for the gateway webhook.
//!
//! - `POST /webhook` - Verify, dedup and enqueue a gateway event
//! - `GET /health` - Liveness probe

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::{ErrorResponse, HealthResponse, WebhookResponse};
pub use handlers::{WebhookApiError, WebhookAppState};
pub use routes::webhook_router;
