//! UpgradeSubscriptionHandler - Command handler for opening a recurrence upgrade.
//!
//! The subscription is flagged as mid-upgrade and an UPGRADE payment is
//! opened. Nothing else changes until that payment settles; the dispatcher
//! then completes the upgrade through [`super::SubscriptionLifecycle`], or
//! aborts it if the payment is cancelled or fails. If the payment cannot be
//! written at all the flag is cleared again here.

use serde_json::json;
use std::sync::Arc;

use crate::domain::foundation::{Actor, AuditEntry, SubscriptionId, Timestamp};
use crate::domain::payment::{Payment, PaymentPurpose};
use crate::domain::subscription::{Recurrence, Subscription, SubscriptionError};
use crate::ports::{PaymentRepository, SubscriptionRepository};

#[derive(Debug, Clone)]
pub struct UpgradeSubscriptionCommand {
    pub subscription_id: SubscriptionId,
    pub target: Recurrence,
    /// Quoted price of the target plan, in cents.
    pub amount_cents: i64,
    pub currency: String,
    pub actor: Actor,
}

#[derive(Debug, Clone)]
pub struct UpgradeSubscriptionResult {
    pub subscription: Subscription,
    pub payment: Payment,
}

pub struct UpgradeSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    payments: Arc<dyn PaymentRepository>,
}

impl UpgradeSubscriptionHandler {
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
        cmd: UpgradeSubscriptionCommand,
    ) -> Result<UpgradeSubscriptionResult, SubscriptionError> {
        let mut subscription = self
            .subscriptions
            .find_by_id(&cmd.subscription_id)
            .await?
            .ok_or(SubscriptionError::NotFound(cmd.subscription_id))?;

        let now = Timestamp::now();
        let from = subscription.recurrence;
        subscription.begin_upgrade(cmd.target, now)?;

        let audit = AuditEntry::new("subscription", *subscription.id.as_uuid(), "upgrade_requested", &cmd.actor)
            .with_detail(json!({ "from": from.as_str(), "to": cmd.target.as_str() }));
        subscription.version = self.subscriptions.update(&subscription, &audit).await?;

        let payment = Payment::new_pending(
            subscription.id,
            cmd.amount_cents,
            cmd.currency,
            PaymentPurpose::Upgrade { target: cmd.target },
            now,
        );
        let audit = AuditEntry::new("payment", *payment.id.as_uuid(), "created", &cmd.actor)
            .with_detail(json!({ "purpose": payment.purpose.kind(), "amount_cents": payment.amount_cents }));
        if let Err(e) = self.payments.create(&payment, &audit).await {
            self.release_upgrade(subscription, cmd.target, &cmd.actor).await;
            return Err(e.into());
        }

        tracing::info!(
            subscription_id = %subscription.id,
            payment_id = %payment.id,
            from = %from.as_str(),
            to = %cmd.target.as_str(),
            "Upgrade opened"
        );

        Ok(UpgradeSubscriptionResult {
            subscription,
            payment,
        })
    }

    /// No payment was opened: take the subscription back out of mid-upgrade.
    async fn release_upgrade(&self, mut subscription: Subscription, target: Recurrence, actor: &Actor) {
        subscription.abort_upgrade(Timestamp::now());
        let audit = AuditEntry::new("subscription", *subscription.id.as_uuid(), "upgrade_aborted", actor)
            .with_detail(json!({ "target": target.as_str(), "reason": "payment_not_created" }));
        if let Err(e) = self.subscriptions.update(&subscription, &audit).await {
            tracing::error!(
                subscription_id = %subscription.id,
                error = %e,
                "Failed to release upgrade after payment creation failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryPaymentRepository, InMemorySubscriptionRepository};
    use crate::domain::foundation::{ClientId, MonitorId};
    use crate::domain::subscription::{Cart, CartItem, CartMonitor, Client, ClientRole, UpgradeRejection};

    struct Fixture {
        subscriptions: Arc<InMemorySubscriptionRepository>,
        payments: Arc<InMemoryPaymentRepository>,
        handler: UpgradeSubscriptionHandler,
    }

    fn fixture() -> Fixture {
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let payments = Arc::new(InMemoryPaymentRepository::new());
        let handler = UpgradeSubscriptionHandler::new(subscriptions.clone(), payments.clone());
        Fixture { subscriptions, payments, handler }
    }

    async fn active(fx: &Fixture, recurrence: Recurrence) -> Subscription {
        let cart = Cart {
            client: Client { id: ClientId::new(), role: ClientRole::Client },
            recurrence,
            items: vec![CartItem {
                monitor: CartMonitor { monitor_id: MonitorId::new(), address_owner: None, box_active: true },
                slots_quantity: Some(1),
            }],
            amount_cents: 9_000,
            currency: "brl".to_string(),
        };
        let mut sub = Subscription::create_from_cart(SubscriptionId::new(), &cart, Timestamp::now());
        sub.activate(Timestamp::now(), None).unwrap();
        let audit = AuditEntry::new("subscription", *sub.id.as_uuid(), "created", &Actor::system("test"));
        fx.subscriptions.create(&sub, &audit).await.unwrap();
        sub
    }

    fn cmd(id: SubscriptionId, target: Recurrence) -> UpgradeSubscriptionCommand {
        UpgradeSubscriptionCommand {
            subscription_id: id,
            target,
            amount_cents: 30_000,
            currency: "brl".to_string(),
            actor: Actor::user("client-1"),
        }
    }

    #[tokio::test]
    async fn opens_upgrade_and_payment() {
        let fx = fixture();
        let sub = active(&fx, Recurrence::ThirtyDays).await;

        let result = fx.handler.handle(cmd(sub.id, Recurrence::NinetyDays)).await.unwrap();

        assert!(result.subscription.upgrade);
        assert_eq!(result.subscription.recurrence, Recurrence::ThirtyDays);
        assert_eq!(result.subscription.version, 2);
        assert_eq!(
            result.payment.purpose,
            PaymentPurpose::Upgrade { target: Recurrence::NinetyDays }
        );
        assert_eq!(fx.payments.all().await.len(), 1);
    }

    #[tokio::test]
    async fn disallowed_target_is_rejected_without_side_effects() {
        let fx = fixture();
        let sub = active(&fx, Recurrence::SixtyDays).await;

        let err = fx.handler.handle(cmd(sub.id, Recurrence::ThirtyDays)).await.unwrap_err();
        assert!(matches!(
            err,
            SubscriptionError::UpgradeRejected(UpgradeRejection::NotAllowed { .. })
        ));

        let stored = fx.subscriptions.find_by_id(&sub.id).await.unwrap().unwrap();
        assert!(!stored.upgrade);
        assert!(fx.payments.all().await.is_empty());
    }

    #[tokio::test]
    async fn second_upgrade_while_pending_is_rejected() {
        let fx = fixture();
        let sub = active(&fx, Recurrence::ThirtyDays).await;
        fx.handler.handle(cmd(sub.id, Recurrence::SixtyDays)).await.unwrap();

        let err = fx.handler.handle(cmd(sub.id, Recurrence::Monthly)).await.unwrap_err();
        assert!(matches!(
            err,
            SubscriptionError::UpgradeRejected(UpgradeRejection::AlreadyUpgrading)
        ));
    }

    #[tokio::test]
    async fn payment_failure_releases_upgrade() {
        let fx = fixture();
        let sub = active(&fx, Recurrence::ThirtyDays).await;
        fx.payments.set_reject_creates(true);

        assert!(fx.handler.handle(cmd(sub.id, Recurrence::NinetyDays)).await.is_err());

        let stored = fx.subscriptions.find_by_id(&sub.id).await.unwrap().unwrap();
        assert!(!stored.upgrade);
        assert!(stored.able_to_upgrade());
        assert!(fx.payments.all().await.is_empty());

        fx.payments.set_reject_creates(false);
        let retry = fx.handler.handle(cmd(sub.id, Recurrence::NinetyDays)).await.unwrap();
        assert!(retry.subscription.upgrade);
    }

    #[tokio::test]
    async fn unknown_subscription_is_not_found() {
        let fx = fixture();
        let err = fx
            .handler
            .handle(cmd(SubscriptionId::new(), Recurrence::Monthly))
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::NotFound(_)));
    }
}
