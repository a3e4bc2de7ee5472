//! Payment gateway vocabulary: webhook envelope, typed payloads, signature
//! verification.

mod event;
pub mod payloads;
mod webhook_errors;
mod webhook_verifier;

pub use event::{EventData, EventEnvelope, EventHeader, GatewayEvent, GatewayEventType};
pub use payloads::{CheckoutSession, Dispute, GatewaySubscription, Invoice, Metadata, PaymentIntent};
pub use webhook_errors::WebhookError;
pub use webhook_verifier::{
    sign_payload, GatewayWebhookVerifier, SignatureHeader, MAX_CLOCK_SKEW_SECS, MAX_EVENT_AGE_SECS,
};
