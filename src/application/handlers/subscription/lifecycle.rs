//! SubscriptionLifecycle - gateway-driven subscription transitions.
//!
//! Each operation loads the aggregate, applies one domain transition and, if
//! anything changed, writes it back with a version check and an audit row.
//! Replays come back as [`Transition::Unchanged`] without touching storage.
//!
//! A stale version surfaces as `ConcurrencyConflict` and a missing row as
//! `SubscriptionNotFound`; the dispatcher retries both through redelivery.

use serde_json::json;
use std::sync::Arc;

use crate::application::handlers::monitor::AllocationRefresher;
use crate::domain::foundation::{
    Actor, AuditEntry, DomainError, ErrorCode, StateMachine, SubscriptionId, Timestamp, Transition,
};
use crate::domain::payment::{Payment, PaymentPurpose, PaymentStatus};
use crate::domain::subscription::{Recurrence, Subscription, SubscriptionStatus};
use crate::ports::SubscriptionRepository;

pub struct SubscriptionLifecycle {
    subscriptions: Arc<dyn SubscriptionRepository>,
    refresher: Arc<AllocationRefresher>,
}

impl SubscriptionLifecycle {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        refresher: Arc<AllocationRefresher>,
    ) -> Self {
        Self {
            subscriptions,
            refresher,
        }
    }

    async fn load(&self, id: &SubscriptionId) -> Result<Subscription, DomainError> {
        self.subscriptions.find_by_id(id).await?.ok_or_else(|| {
            DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("Subscription not found: {}", id),
            )
        })
    }

    /// Persists `subscription` if `transition` applied, then refreshes the
    /// monitors when the ACTIVE set changed.
    async fn commit(
        &self,
        subscription: &Subscription,
        previous_status: SubscriptionStatus,
        transition: Transition,
        audit: AuditEntry,
    ) -> Result<Transition, DomainError> {
        if !transition.is_applied() {
            return Ok(Transition::Unchanged);
        }
        self.subscriptions.update(subscription, &audit).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            action = %audit.action,
            from = %previous_status,
            to = %subscription.status,
            "Subscription updated"
        );

        let was_active = previous_status == SubscriptionStatus::Active;
        let is_active = subscription.status == SubscriptionStatus::Active;
        if was_active != is_active {
            self.refresher.refresh_all(&subscription.monitor_ids()).await;
        }
        Ok(Transition::Applied)
    }

    /// `checkout.session.expired`: a PENDING subscription is abandoned.
    pub async fn abandon_checkout(
        &self,
        id: &SubscriptionId,
        actor: &Actor,
    ) -> Result<Transition, DomainError> {
        let mut subscription = self.load(id).await?;
        let previous = subscription.status;
        let transition = subscription.abandon_checkout(Timestamp::now());
        let audit = AuditEntry::new("subscription", *id.as_uuid(), "checkout_expired", actor);
        self.commit(&subscription, previous, transition, audit).await
    }

    /// `customer.subscription.deleted`: cancels whatever is not terminal yet.
    pub async fn cancel_by_gateway_id(
        &self,
        gateway_subscription_id: &str,
        actor: &Actor,
    ) -> Result<Transition, DomainError> {
        let mut subscription = self
            .subscriptions
            .find_by_gateway_subscription_id(gateway_subscription_id)
            .await?
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::SubscriptionNotFound,
                    format!("No subscription for gateway id {}", gateway_subscription_id),
                )
            })?;

        let previous = subscription.status;
        let transition = subscription.cancel(Timestamp::now());
        let audit = AuditEntry::new("subscription", *subscription.id.as_uuid(), "cancelled", actor)
            .with_detail(json!({ "gateway_subscription_id": gateway_subscription_id }));
        self.commit(&subscription, previous, transition, audit).await
    }

    /// Applies what a settled payment buys.
    ///
    /// - INITIAL / RECURRING: activates a PENDING subscription
    /// - UPGRADE: switches to the target recurrence
    /// - RENEWAL: extends the period
    ///
    /// A terminal subscription is left alone.
    pub async fn apply_payment_success(
        &self,
        payment: &Payment,
        gateway_subscription_id: Option<&str>,
        actor: &Actor,
    ) -> Result<Transition, DomainError> {
        let mut subscription = self.load(&payment.subscription_id).await?;
        if subscription.status.is_terminal() {
            tracing::warn!(
                subscription_id = %subscription.id,
                payment_id = %payment.id,
                status = %subscription.status,
                "Payment settled for a terminal subscription, ignoring"
            );
            return Ok(Transition::Unchanged);
        }

        let now = Timestamp::now();
        let previous = subscription.status;
        let (transition, action) = match payment.purpose {
            PaymentPurpose::Initial | PaymentPurpose::Recurring => (
                subscription.activate(now, gateway_subscription_id.map(str::to_string))?,
                "activated",
            ),
            PaymentPurpose::Upgrade { target } => {
                (subscription.complete_upgrade(target, now), "upgraded")
            }
            PaymentPurpose::Renewal { extends_to } => {
                (subscription.extend_to(extends_to, now), "renewed")
            }
        };

        let audit = AuditEntry::new("subscription", *subscription.id.as_uuid(), action, actor)
            .with_detail(json!({
                "payment_id": payment.id.to_string(),
                "purpose": payment.purpose.kind(),
                "ends_at": subscription.ends_at.map(|t| t.as_unix_secs()),
            }));
        self.commit(&subscription, previous, transition, audit).await
    }

    /// Releases what an unsettled payment was holding open.
    ///
    /// Only an UPGRADE payment that ended CANCELLED or FAILED does anything:
    /// the subscription leaves mid-upgrade so the gate reopens.
    pub async fn apply_payment_failure(
        &self,
        payment: &Payment,
        actor: &Actor,
    ) -> Result<Transition, DomainError> {
        let PaymentPurpose::Upgrade { target } = payment.purpose else {
            return Ok(Transition::Unchanged);
        };
        if !matches!(payment.status, PaymentStatus::Cancelled | PaymentStatus::Failed) {
            return Ok(Transition::Unchanged);
        }
        self.abort_upgrade(&payment.subscription_id, target, payment.status.as_str(), actor)
            .await
    }

    /// Clears the mid-upgrade flag; recurrence and period stay as they were.
    pub async fn abort_upgrade(
        &self,
        id: &SubscriptionId,
        target: Recurrence,
        reason: &str,
        actor: &Actor,
    ) -> Result<Transition, DomainError> {
        let mut subscription = self.load(id).await?;
        let previous = subscription.status;
        let transition = subscription.abort_upgrade(Timestamp::now());
        let audit = AuditEntry::new("subscription", *id.as_uuid(), "upgrade_aborted", actor)
            .with_detail(json!({ "target": target.as_str(), "reason": reason }));
        self.commit(&subscription, previous, transition, audit).await
    }

    /// Stores a recomputed paid total. Status is never touched here.
    pub async fn record_paid_amount(
        &self,
        id: &SubscriptionId,
        paid_amount_cents: i64,
        actor: &Actor,
    ) -> Result<Transition, DomainError> {
        let mut subscription = self.load(id).await?;
        let previous = subscription.status;
        let transition = subscription.set_paid_amount(paid_amount_cents, Timestamp::now());
        let audit = AuditEntry::new("subscription", *id.as_uuid(), "paid_amount_recomputed", actor)
            .with_detail(json!({ "paid_amount_cents": paid_amount_cents }));
        self.commit(&subscription, previous, transition, audit).await
    }

    /// Expires one subscription if its period is over.
    pub async fn expire(
        &self,
        subscription: Subscription,
        now: Timestamp,
        actor: &Actor,
    ) -> Result<Transition, DomainError> {
        let mut subscription = subscription;
        let previous = subscription.status;
        let transition = subscription.expire_if_due(now);
        let audit = AuditEntry::new("subscription", *subscription.id.as_uuid(), "expired", actor)
            .with_detail(json!({ "ends_at": subscription.ends_at.map(|t| t.as_unix_secs()) }));
        self.commit(&subscription, previous, transition, audit).await
    }

    /// Expires every subscription due at `now`, up to `limit`.
    ///
    /// Conflicts are skipped; the next sweep picks the row up again.
    pub async fn expire_due(&self, now: Timestamp, limit: u32) -> Result<usize, DomainError> {
        let actor = Actor::system("expiry-sweeper");
        let due = self.subscriptions.find_due_for_expiry(now, limit).await?;
        let mut expired = 0;
        for subscription in due {
            let id = subscription.id;
            match self.expire(subscription, now, &actor).await {
                Ok(Transition::Applied) => expired += 1,
                Ok(Transition::Unchanged) => {}
                Err(e) if e.is_conflict() => {
                    tracing::debug!(subscription_id = %id, "Expiry conflicted, retrying next sweep");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(expired)
    }
}
