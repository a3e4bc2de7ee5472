//! Webhook handlers.
//!
//! - [`WebhookIngress`] runs on the HTTP path: verify, dedup, enqueue
//! - [`EventDispatcher`] runs in the workers: decode, route, record

mod dispatch_event;
mod ingest_webhook;

pub use dispatch_event::{DispatchError, DispatchOutcome, EventDispatcher};
pub use ingest_webhook::{IngressOutcome, WebhookIngress};
