//! CreateSubscriptionHandler - Command handler for turning a cart into a subscription.

use serde_json::json;
use std::sync::Arc;

use crate::application::handlers::monitor::AllocationRefresher;
use crate::domain::foundation::{Actor, AuditEntry, DomainError, SubscriptionId, Timestamp};
use crate::domain::payment::{Payment, PaymentPurpose};
use crate::domain::subscription::{Cart, Subscription, SubscriptionError};
use crate::ports::{PaymentRepository, SubscriptionRepository};

/// Command to create a subscription from a checkout cart.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionCommand {
    pub cart: Cart,
    pub actor: Actor,
}

/// Result of subscription creation.
///
/// `payment` is the INITIAL payment to hand to checkout; bonus subscriptions
/// have none.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionResult {
    pub subscription: Subscription,
    pub payment: Option<Payment>,
}

pub struct CreateSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    payments: Arc<dyn PaymentRepository>,
    refresher: Arc<AllocationRefresher>,
}

impl CreateSubscriptionHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        payments: Arc<dyn PaymentRepository>,
        refresher: Arc<AllocationRefresher>,
    ) -> Self {
        Self {
            subscriptions,
            payments,
            refresher,
        }
    }

    pub async fn handle(
        &self,
        cmd: CreateSubscriptionCommand,
    ) -> Result<CreateSubscriptionResult, SubscriptionError> {
        // 1. Validate cart
        if cmd.cart.items.is_empty() {
            return Err(DomainError::validation("items", "Cart has no monitors").into());
        }
        if cmd.cart.amount_cents < 0 {
            return Err(DomainError::validation("amount_cents", "Cart amount cannot be negative").into());
        }

        // 2. Build and persist the subscription
        let now = Timestamp::now();
        let mut subscription = Subscription::create_from_cart(SubscriptionId::new(), &cmd.cart, now);
        let audit = AuditEntry::new("subscription", *subscription.id.as_uuid(), "created", &cmd.actor)
            .with_detail(json!({
                "recurrence": subscription.recurrence.as_str(),
                "bonus": subscription.bonus,
                "monitors": subscription.monitors.len(),
            }));
        self.subscriptions.create(&subscription, &audit).await?;

        // 3. Bonus subscriptions are live immediately and never pay
        if subscription.bonus {
            tracing::info!(
                subscription_id = %subscription.id,
                client_id = %subscription.client_id,
                "Bonus subscription created"
            );
            self.refresher.refresh_all(&subscription.monitor_ids()).await;
            return Ok(CreateSubscriptionResult {
                subscription,
                payment: None,
            });
        }

        // 4. Open the initial payment
        let payment = Payment::new_pending(
            subscription.id,
            cmd.cart.amount_cents,
            cmd.cart.currency.clone(),
            PaymentPurpose::Initial,
            now,
        );
        let audit = AuditEntry::new("payment", *payment.id.as_uuid(), "created", &cmd.actor)
            .with_detail(json!({ "purpose": payment.purpose.kind(), "amount_cents": payment.amount_cents }));
        if let Err(e) = self.payments.create(&payment, &audit).await {
            // A PENDING subscription without a payment can never settle
            self.abandon(&mut subscription, &cmd.actor).await;
            return Err(e.into());
        }

        tracing::info!(
            subscription_id = %subscription.id,
            payment_id = %payment.id,
            recurrence = %subscription.recurrence.as_str(),
            "Subscription created, awaiting payment"
        );

        Ok(CreateSubscriptionResult {
            subscription,
            payment: Some(payment),
        })
    }

    async fn abandon(&self, subscription: &mut Subscription, actor: &Actor) {
        subscription.abandon_checkout(Timestamp::now());
        let audit = AuditEntry::new("subscription", *subscription.id.as_uuid(), "creation_rolled_back", actor)
            .with_detail(json!({ "reason": "payment_not_created" }));
        if let Err(e) = self.subscriptions.update(subscription, &audit).await {
            tracing::error!(
                subscription_id = %subscription.id,
                error = %e,
                "Failed to cancel subscription after payment creation failed"
            );
        }
    }
}
