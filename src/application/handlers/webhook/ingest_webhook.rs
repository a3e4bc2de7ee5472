//! WebhookIngress - verifies a gateway webhook and hands it to the queue.
//!
//! Ingress never interprets the event beyond its id and type. The raw body
//! is forwarded verbatim; the worker decodes it.

use std::sync::Arc;

use crate::domain::foundation::DomainError;
use crate::domain::gateway::{GatewayWebhookVerifier, WebhookError};
use crate::ports::{EventQueue, EventStore};

/// What ingress did with a webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressOutcome {
    /// Signature valid, event unseen, payload enqueued.
    Accepted { event_id: String, message_id: String },
    /// Event id already recorded; nothing enqueued.
    Duplicate { event_id: String },
    /// Signature or envelope failed. No side effects.
    Rejected(WebhookError),
}

pub struct WebhookIngress {
    verifier: GatewayWebhookVerifier,
    store: Arc<dyn EventStore>,
    queue: Arc<dyn EventQueue>,
}

impl WebhookIngress {
    pub fn new(
        verifier: GatewayWebhookVerifier,
        store: Arc<dyn EventStore>,
        queue: Arc<dyn EventQueue>,
    ) -> Self {
        Self {
            verifier,
            store,
            queue,
        }
    }

    /// Handles one webhook delivery.
    ///
    /// # Errors
    ///
    /// Store or queue failures. The caller answers 5xx so the gateway
    /// redelivers.
    pub async fn handle(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<IngressOutcome, DomainError> {
        // 1. Verify signature and decode the header
        let Some(signature) = signature else {
            tracing::warn!("Webhook without signature header");
            return Ok(IngressOutcome::Rejected(WebhookError::MissingSignature));
        };
        let header = match self.verifier.verify(payload, signature) {
            Ok(header) => header,
            Err(e) => {
                tracing::warn!(error = %e, "Webhook rejected");
                return Ok(IngressOutcome::Rejected(e));
            }
        };
        let raw = match std::str::from_utf8(payload) {
            Ok(raw) => raw,
            Err(e) => return Ok(IngressOutcome::Rejected(WebhookError::ParseError(e.to_string()))),
        };

        // 2. Fast-path dedup. The worker's record() is the real guard.
        if self.store.exists(&header.id).await? {
            tracing::info!(
                event_id = %header.id,
                event_type = %header.event_type,
                "Webhook already processed"
            );
            return Ok(IngressOutcome::Duplicate { event_id: header.id });
        }

        // 3. Hand off
        let message_id = self.queue.enqueue(raw).await?;
        tracing::info!(
            event_id = %header.id,
            event_type = %header.event_type,
            message_id = %message_id,
            "Webhook enqueued"
        );

        Ok(IngressOutcome::Accepted {
            event_id: header.id,
            message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryEventQueue, InMemoryEventStore};
    use crate::domain::foundation::ErrorCode;
    use crate::domain::gateway::sign_payload;
    use secrecy::SecretString;

    const SECRET: &str = "whsec_ingress_test";
    const PAYLOAD: &str =
        r#"{"id":"evt_in_1","type":"invoice.payment_succeeded","data":{"object":{"id":"in_1"}}}"#;

    struct Fixture {
        store: Arc<InMemoryEventStore>,
        queue: Arc<InMemoryEventQueue>,
        ingress: WebhookIngress,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryEventStore::new());
        let queue = Arc::new(InMemoryEventQueue::new());
        let verifier = GatewayWebhookVerifier::new(SecretString::new(SECRET.to_string()));
        let ingress = WebhookIngress::new(verifier, store.clone(), queue.clone());
        Fixture { store, queue, ingress }
    }

    fn sign(payload: &str) -> String {
        sign_payload(SECRET, chrono::Utc::now().timestamp(), payload.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn valid_webhook_is_enqueued_verbatim() {
        let fx = fixture();
        let outcome = fx.ingress.handle(PAYLOAD.as_bytes(), Some(&sign(PAYLOAD))).await.unwrap();

        assert!(matches!(outcome, IngressOutcome::Accepted { ref event_id, .. } if event_id == "evt_in_1"));
        let delivery = fx.queue.receive("test").await.unwrap().unwrap();
        assert_eq!(delivery.payload, PAYLOAD);
    }

    #[tokio::test]
    async fn recorded_event_is_not_enqueued_again() {
        let fx = fixture();
        fx.store.record("evt_in_1", "invoice.payment_succeeded").await.unwrap();

        let outcome = fx.ingress.handle(PAYLOAD.as_bytes(), Some(&sign(PAYLOAD))).await.unwrap();

        assert_eq!(outcome, IngressOutcome::Duplicate { event_id: "evt_in_1".to_string() });
        assert_eq!(fx.queue.ready_len().await, 0);
    }

    #[tokio::test]
    async fn missing_signature_is_rejected() {
        let fx = fixture();
        let outcome = fx.ingress.handle(PAYLOAD.as_bytes(), None).await.unwrap();
        assert_eq!(outcome, IngressOutcome::Rejected(WebhookError::MissingSignature));
        assert_eq!(fx.queue.ready_len().await, 0);
    }

    #[tokio::test]
    async fn bad_signature_has_no_side_effects() {
        let fx = fixture();
        let forged = sign_payload("whsec_other", chrono::Utc::now().timestamp(), PAYLOAD.as_bytes()).unwrap();

        let outcome = fx.ingress.handle(PAYLOAD.as_bytes(), Some(&forged)).await.unwrap();

        assert_eq!(outcome, IngressOutcome::Rejected(WebhookError::InvalidSignature));
        assert_eq!(fx.queue.ready_len().await, 0);
        assert!(fx.store.is_empty().await);
    }

    #[tokio::test]
    async fn signed_payload_without_header_fields_is_rejected() {
        let fx = fixture();
        let body = r#"{"object":"event"}"#;
        let outcome = fx.ingress.handle(body.as_bytes(), Some(&sign(body))).await.unwrap();
        assert!(matches!(outcome, IngressOutcome::Rejected(WebhookError::ParseError(_))));
    }

    #[tokio::test]
    async fn queue_failure_is_an_error() {
        let fx = fixture();
        fx.queue.set_unavailable(true);

        let err = fx.ingress.handle(PAYLOAD.as_bytes(), Some(&sign(PAYLOAD))).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::QueueError);
    }
}
