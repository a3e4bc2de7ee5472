//! EventDispatcher - applies one queued gateway event.
//!
//! Flow per delivery:
//!
//! 1. Parse the envelope; unknown types are ignored (acked, never recorded)
//! 2. Skip events the store already has
//! 3. Decode the object for its type and route it; a failed or cancelled
//!    upgrade payment also reopens the subscription's upgrade gate
//! 4. Record the event id; only then may the worker ack
//!
//! Every routed operation is idempotent, so a crash between 3 and 4 only
//! costs a harmless replay.

use std::sync::Arc;
use thiserror::Error;

use crate::application::handlers::payment::PaymentReconciler;
use crate::application::handlers::subscription::SubscriptionLifecycle;
use crate::domain::foundation::{Actor, DomainError, ErrorCode};
use crate::domain::gateway::{EventEnvelope, GatewayEvent, Invoice};
use crate::domain::payment::{InvoiceOutcome, PaymentStatus};
use crate::ports::{EventStore, RecordError};

/// Result of dispatching one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handled and recorded.
    Processed { event_id: String },
    /// Already recorded, by an earlier delivery or a concurrent worker.
    AlreadyProcessed { event_id: String },
    /// Type we do not act on.
    Ignored { event_type: String },
    /// Lost an optimistic-lock race or the referenced entity is not there yet.
    /// Leave unacknowledged and let redelivery try again.
    Retry { event_id: String, reason: String },
}

impl DispatchOutcome {
    /// True for outcomes the worker acknowledges.
    pub fn should_ack(&self) -> bool {
        !matches!(self, DispatchOutcome::Retry { .. })
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The message is not a gateway envelope at all.
    #[error("Malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    /// Recognized type whose object does not match its schema.
    #[error("Malformed {event_type} payload for {event_id}: {source}")]
    Decode {
        event_id: String,
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage failure: {0}")]
    Storage(#[from] DomainError),
}

impl DispatchError {
    /// Malformed messages will never succeed; storage may recover.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, DispatchError::Storage(_))
    }
}

pub struct EventDispatcher {
    store: Arc<dyn EventStore>,
    lifecycle: Arc<SubscriptionLifecycle>,
    reconciler: Arc<PaymentReconciler>,
}

impl EventDispatcher {
    pub fn new(
        store: Arc<dyn EventStore>,
        lifecycle: Arc<SubscriptionLifecycle>,
        reconciler: Arc<PaymentReconciler>,
    ) -> Self {
        Self {
            store,
            lifecycle,
            reconciler,
        }
    }

    pub async fn dispatch(&self, payload: &str) -> Result<DispatchOutcome, DispatchError> {
        let envelope = EventEnvelope::parse(payload).map_err(DispatchError::Envelope)?;
        let event_id = envelope.id.clone();

        if !envelope.parsed_type().is_known() {
            tracing::debug!(event_id = %event_id, event_type = %envelope.event_type, "Ignoring event type");
            return Ok(DispatchOutcome::Ignored {
                event_type: envelope.event_type,
            });
        }

        if self.store.exists(&event_id).await? {
            tracing::debug!(event_id = %event_id, "Event already processed");
            return Ok(DispatchOutcome::AlreadyProcessed { event_id });
        }

        let event = match GatewayEvent::decode(&envelope) {
            Ok(Some(event)) => event,
            Ok(None) => {
                return Ok(DispatchOutcome::Ignored {
                    event_type: envelope.event_type,
                })
            }
            Err(source) => {
                return Err(DispatchError::Decode {
                    event_id,
                    event_type: envelope.event_type,
                    source,
                })
            }
        };

        let actor = Actor::gateway_event(&event_id);
        if let Err(e) = self.route(&event, &actor).await {
            if e.is_conflict() || e.is_not_found() {
                tracing::warn!(
                    event_id = %event_id,
                    event_type = %envelope.event_type,
                    error = %e,
                    "Event deferred for redelivery"
                );
                return Ok(DispatchOutcome::Retry {
                    event_id,
                    reason: e.to_string(),
                });
            }
            return Err(e.into());
        }

        match self.store.record(&event_id, &envelope.event_type).await {
            Ok(()) => {
                tracing::info!(event_id = %event_id, event_type = %envelope.event_type, "Event processed");
                Ok(DispatchOutcome::Processed { event_id })
            }
            Err(RecordError::Duplicate { .. }) => {
                tracing::info!(event_id = %event_id, "Event recorded concurrently");
                Ok(DispatchOutcome::AlreadyProcessed { event_id })
            }
            Err(RecordError::Storage(e)) => Err(e.into()),
        }
    }

    async fn route(&self, event: &GatewayEvent, actor: &Actor) -> Result<(), DomainError> {
        match event {
            GatewayEvent::CheckoutSessionExpired(session) => {
                let id = session.subscription_id().ok_or_else(|| {
                    DomainError::new(
                        ErrorCode::SubscriptionNotFound,
                        format!("Checkout session {} names no subscription", session.id),
                    )
                })?;
                self.lifecycle.abandon_checkout(&id, actor).await?;
            }
            GatewayEvent::CustomerSubscriptionDeleted(subscription) => {
                self.lifecycle.cancel_by_gateway_id(&subscription.id, actor).await?;
            }
            GatewayEvent::InvoicePaymentSucceeded(invoice) => {
                self.invoice_succeeded(invoice, actor).await?;
            }
            GatewayEvent::InvoicePaymentFailed(invoice) => {
                let reconciled = self
                    .reconciler
                    .reconcile_invoice(invoice, InvoiceOutcome::PaymentFailed, actor)
                    .await?;
                self.lifecycle
                    .apply_payment_failure(&reconciled.payment, actor)
                    .await?;
            }
            GatewayEvent::PaymentIntentSucceeded(intent)
            | GatewayEvent::PaymentIntentCanceled(intent)
            | GatewayEvent::PaymentIntentPaymentFailed(intent) => {
                let reconciled = self.reconciler.reconcile_payment_intent(intent, actor).await?;
                self.lifecycle
                    .apply_payment_failure(&reconciled.payment, actor)
                    .await?;
            }
            GatewayEvent::ChargeDisputeFundsWithdrawn(dispute) => {
                self.reconciler.reconcile_dispute(dispute, actor).await?;
            }
        }
        Ok(())
    }

    /// Reconciles the payment, then applies what it buys.
    ///
    /// The subscription step runs on every delivery, not only when the
    /// payment changed: if an earlier attempt settled the payment and then
    /// lost a race on the subscription, this is where it catches up.
    async fn invoice_succeeded(&self, invoice: &Invoice, actor: &Actor) -> Result<(), DomainError> {
        let reconciled = self
            .reconciler
            .reconcile_invoice(invoice, InvoiceOutcome::Paid, actor)
            .await?;
        if reconciled.payment.status == PaymentStatus::Completed {
            self.lifecycle
                .apply_payment_success(&reconciled.payment, invoice.subscription.as_deref(), actor)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryEventStore, InMemoryMonitorRepository, InMemoryPaymentRepository,
        InMemorySubscriptionRepository,
    };
    use crate::application::handlers::monitor::AllocationRefresher;
    use crate::config::AllocationConfig;
    use crate::domain::foundation::{AuditEntry, ClientId, MonitorId, SubscriptionId, Timestamp};
    use crate::domain::payment::{Payment, PaymentPurpose};
    use crate::domain::subscription::{
        Cart, CartItem, CartMonitor, Client, ClientRole, Recurrence, Subscription, SubscriptionStatus,
    };
    use crate::ports::{PaymentRepository, SubscriptionRepository};
    use serde_json::json;

    struct Fixture {
        store: Arc<InMemoryEventStore>,
        subscriptions: Arc<InMemorySubscriptionRepository>,
        payments: Arc<InMemoryPaymentRepository>,
        dispatcher: EventDispatcher,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryEventStore::new());
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let payments = Arc::new(InMemoryPaymentRepository::new());
        let monitors = Arc::new(InMemoryMonitorRepository::new(subscriptions.clone()));
        let refresher = Arc::new(AllocationRefresher::new(monitors, AllocationConfig::default()));
        let lifecycle = Arc::new(SubscriptionLifecycle::new(subscriptions.clone(), refresher));
        let reconciler = Arc::new(PaymentReconciler::new(
            payments.clone(),
            subscriptions.clone(),
            lifecycle.clone(),
        ));
        let dispatcher = EventDispatcher::new(store.clone(), lifecycle, reconciler);
        Fixture { store, subscriptions, payments, dispatcher }
    }

    async fn pending_with_payment(fx: &Fixture, reference: &str) -> (Subscription, Payment) {
        let cart = Cart {
            client: Client { id: ClientId::new(), role: ClientRole::Client },
            recurrence: Recurrence::SixtyDays,
            items: vec![CartItem {
                monitor: CartMonitor { monitor_id: MonitorId::new(), address_owner: None, box_active: true },
                slots_quantity: Some(3),
            }],
            amount_cents: 18_000,
            currency: "brl".to_string(),
        };
        let now = Timestamp::now();
        let sub = Subscription::create_from_cart(SubscriptionId::new(), &cart, now);
        let actor = Actor::system("test");
        fx.subscriptions
            .create(&sub, &AuditEntry::new("subscription", *sub.id.as_uuid(), "created", &actor))
            .await
            .unwrap();
        let payment = Payment::new_pending(sub.id, 18_000, "brl", PaymentPurpose::Initial, now)
            .with_gateway_reference(reference);
        fx.payments
            .create(&payment, &AuditEntry::new("payment", *payment.id.as_uuid(), "created", &actor))
            .await
            .unwrap();
        (sub, payment)
    }

    fn event(id: &str, event_type: &str, object: serde_json::Value) -> String {
        json!({ "id": id, "type": event_type, "data": { "object": object } }).to_string()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Routing
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn invoice_success_activates_subscription_and_records_event() {
        let fx = fixture();
        let (sub, _) = pending_with_payment(&fx, "in_1").await;
        let payload = event(
            "evt_1",
            "invoice.payment_succeeded",
            json!({ "id": "in_1", "subscription": "sub_gw_1", "amount_paid": 18000 }),
        );

        let outcome = fx.dispatcher.dispatch(&payload).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Processed { event_id: "evt_1".to_string() });
        let stored = fx.subscriptions.find_by_id(&sub.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Active);
        assert_eq!(stored.gateway_subscription_id.as_deref(), Some("sub_gw_1"));
        assert_eq!(stored.paid_amount_cents, 18_000);
        assert_eq!(fx.store.len().await, 1);
    }

    #[tokio::test]
    async fn invoice_failure_fails_payment_but_leaves_subscription_pending() {
        let fx = fixture();
        let (sub, payment) = pending_with_payment(&fx, "in_2").await;
        let payload = event("evt_2", "invoice.payment_failed", json!({ "id": "in_2" }));

        fx.dispatcher.dispatch(&payload).await.unwrap();

        let stored = fx.payments.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Failed);
        let stored_sub = fx.subscriptions.find_by_id(&sub.id).await.unwrap().unwrap();
        assert_eq!(stored_sub.status, SubscriptionStatus::Pending);
    }

    #[tokio::test]
    async fn invoice_failure_with_open_invoice_fails_payment() {
        let fx = fixture();
        let (_, payment) = pending_with_payment(&fx, "in_open").await;
        let payload = event(
            "evt_open",
            "invoice.payment_failed",
            json!({ "id": "in_open", "status": "open", "amount_due": 18000, "amount_paid": 0 }),
        );

        fx.dispatcher.dispatch(&payload).await.unwrap();

        let stored = fx.payments.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn cancelled_upgrade_intent_reopens_upgrade_gate() {
        let fx = fixture();
        let (sub, _) = pending_with_payment(&fx, "in_up").await;
        fx.dispatcher
            .dispatch(&event("evt_up_1", "invoice.payment_succeeded", json!({ "id": "in_up" })))
            .await
            .unwrap();

        let mut active = fx.subscriptions.find_by_id(&sub.id).await.unwrap().unwrap();
        active.begin_upgrade(Recurrence::NinetyDays, Timestamp::now()).unwrap();
        let audit = AuditEntry::new("subscription", *sub.id.as_uuid(), "upgrade_requested", &Actor::system("test"));
        fx.subscriptions.update(&active, &audit).await.unwrap();
        let upgrade = Payment::new_pending(
            sub.id,
            30_000,
            "brl",
            PaymentPurpose::Upgrade { target: Recurrence::NinetyDays },
            Timestamp::now(),
        )
        .with_gateway_reference("pi_up");
        fx.payments
            .create(&upgrade, &AuditEntry::new("payment", *upgrade.id.as_uuid(), "created", &Actor::system("test")))
            .await
            .unwrap();

        fx.dispatcher
            .dispatch(&event(
                "evt_up_2",
                "payment_intent.canceled",
                json!({ "id": "pi_up", "status": "canceled" }),
            ))
            .await
            .unwrap();

        let stored = fx.subscriptions.find_by_id(&sub.id).await.unwrap().unwrap();
        assert!(!stored.upgrade);
        assert!(stored.able_to_upgrade());
        assert_eq!(stored.recurrence, Recurrence::SixtyDays);
        let stored_payment = fx.payments.find_by_id(&upgrade.id).await.unwrap().unwrap();
        assert_eq!(stored_payment.status, PaymentStatus::Cancelled);
    }

    #[tokio::test]
    async fn checkout_expiry_cancels_pending_subscription() {
        let fx = fixture();
        let (sub, _) = pending_with_payment(&fx, "cs_1").await;
        let payload = event(
            "evt_3",
            "checkout.session.expired",
            json!({ "id": "cs_1", "metadata": { "subscription_id": sub.id.to_string() } }),
        );

        fx.dispatcher.dispatch(&payload).await.unwrap();

        let stored = fx.subscriptions.find_by_id(&sub.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Cancelled);
    }

    #[tokio::test]
    async fn gateway_deletion_cancels_active_subscription() {
        let fx = fixture();
        let (sub, _) = pending_with_payment(&fx, "in_4").await;
        fx.dispatcher
            .dispatch(&event(
                "evt_4a",
                "invoice.payment_succeeded",
                json!({ "id": "in_4", "subscription": "sub_gw_4" }),
            ))
            .await
            .unwrap();

        fx.dispatcher
            .dispatch(&event("evt_4b", "customer.subscription.deleted", json!({ "id": "sub_gw_4" })))
            .await
            .unwrap();

        let stored = fx.subscriptions.find_by_id(&sub.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Cancelled);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Outcomes
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn replayed_event_is_already_processed() {
        let fx = fixture();
        pending_with_payment(&fx, "in_5").await;
        let payload = event("evt_5", "invoice.payment_succeeded", json!({ "id": "in_5" }));

        fx.dispatcher.dispatch(&payload).await.unwrap();
        let second = fx.dispatcher.dispatch(&payload).await.unwrap();

        assert_eq!(second, DispatchOutcome::AlreadyProcessed { event_id: "evt_5".to_string() });
        assert_eq!(fx.store.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_type_is_ignored_and_not_recorded() {
        let fx = fixture();
        let outcome = fx
            .dispatcher
            .dispatch(&event("evt_6", "customer.created", json!({ "id": "cus_1" })))
            .await
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::Ignored { .. }));
        assert!(outcome.should_ack());
        assert!(fx.store.is_empty().await);
    }

    #[tokio::test]
    async fn missing_payment_is_retried() {
        let fx = fixture();
        let outcome = fx
            .dispatcher
            .dispatch(&event(
                "evt_7",
                "payment_intent.succeeded",
                json!({ "id": "pi_unknown", "status": "succeeded" }),
            ))
            .await
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::Retry { .. }));
        assert!(!outcome.should_ack());
        assert!(fx.store.is_empty().await);
    }

    #[tokio::test]
    async fn conflict_is_retried_then_succeeds() {
        let fx = fixture();
        let (sub, _) = pending_with_payment(&fx, "in_8").await;
        let payload = event("evt_8", "invoice.payment_succeeded", json!({ "id": "in_8" }));

        fx.subscriptions.force_conflicts(1);
        let first = fx.dispatcher.dispatch(&payload).await.unwrap();
        assert!(matches!(first, DispatchOutcome::Retry { .. }));
        assert!(fx.store.is_empty().await);

        let second = fx.dispatcher.dispatch(&payload).await.unwrap();
        assert_eq!(second, DispatchOutcome::Processed { event_id: "evt_8".to_string() });
        let stored = fx.subscriptions.find_by_id(&sub.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn malformed_known_payload_is_permanent_error() {
        let fx = fixture();
        let err = fx
            .dispatcher
            .dispatch(&event("evt_9", "payment_intent.succeeded", json!({ "id": "pi_1" })))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Decode { .. }));
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn non_envelope_is_permanent_error() {
        let fx = fixture();
        let err = fx.dispatcher.dispatch("not json").await.unwrap_err();
        assert!(matches!(err, DispatchError::Envelope(_)));
    }

    #[tokio::test]
    async fn store_outage_is_transient_error() {
        let fx = fixture();
        fx.store.set_unavailable(true);
        let err = fx
            .dispatcher
            .dispatch(&event("evt_10", "invoice.payment_failed", json!({ "id": "in_x" })))
            .await
            .unwrap_err();
        assert!(!err.is_permanent());
    }
}
