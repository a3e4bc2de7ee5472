//! RenewSubscriptionHandler - Command handler for buying one more period.

use serde_json::json;
use std::sync::Arc;

use crate::domain::foundation::{Actor, AuditEntry, SubscriptionId, Timestamp};
use crate::domain::payment::{Payment, PaymentPurpose};
use crate::domain::subscription::{Subscription, SubscriptionError};
use crate::ports::{PaymentRepository, SubscriptionRepository};

#[derive(Debug, Clone)]
pub struct RenewSubscriptionCommand {
    pub subscription_id: SubscriptionId,
    pub amount_cents: i64,
    pub currency: String,
    pub actor: Actor,
}

#[derive(Debug, Clone)]
pub struct RenewSubscriptionResult {
    pub subscription: Subscription,
    pub payment: Payment,
    /// Where `ends_at` moves once the payment settles.
    pub extends_to: Timestamp,
}

/// Opens a RENEWAL payment. The subscription itself is untouched until the
/// payment succeeds.
pub struct RenewSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    payments: Arc<dyn PaymentRepository>,
}

impl RenewSubscriptionHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        payments: Arc<dyn PaymentRepository>,
    ) -> Self {
        Self {
            subscriptions,
            payments,
        }
    }

    pub async fn handle(
        &self,
        cmd: RenewSubscriptionCommand,
    ) -> Result<RenewSubscriptionResult, SubscriptionError> {
        let subscription = self
            .subscriptions
            .find_by_id(&cmd.subscription_id)
            .await?
            .ok_or(SubscriptionError::NotFound(cmd.subscription_id))?;

        let now = Timestamp::now();
        let extends_to = subscription
            .renewal_extends_to(now)
            .ok_or(SubscriptionError::RenewalNotAllowed(subscription.id))?;

        let payment = Payment::new_pending(
            subscription.id,
            cmd.amount_cents,
            cmd.currency,
            PaymentPurpose::Renewal { extends_to },
            now,
        );
        let audit = AuditEntry::new("payment", *payment.id.as_uuid(), "created", &cmd.actor)
            .with_detail(json!({
                "purpose": payment.purpose.kind(),
                "amount_cents": payment.amount_cents,
                "extends_to": extends_to.as_unix_secs(),
            }));
        self.payments.create(&payment, &audit).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            payment_id = %payment.id,
            extends_to = extends_to.as_unix_secs(),
            "Renewal opened"
        );

        Ok(RenewSubscriptionResult {
            subscription,
            payment,
            extends_to,
        })
    }
}
