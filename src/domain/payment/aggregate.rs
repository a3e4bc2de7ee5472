//! Payment entity.
//!
//! Payments are created when a checkout, upgrade or renewal starts, and are
//! mutated afterwards only by reconciliation against the gateway.
//! Money is stored as i64 cents.

use crate::domain::foundation::{
    DomainError, ErrorCode, PaymentId, StateMachine, SubscriptionId, Timestamp, Transition,
};
use crate::domain::subscription::Recurrence;
use serde::{Deserialize, Serialize};

use super::PaymentStatus;

/// What settling this payment buys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentPurpose {
    /// First period of a new subscription.
    Initial,
    /// Gateway-initiated charge for an ongoing subscription.
    Recurring,
    Upgrade { target: Recurrence },
    Renewal { extends_to: Timestamp },
}

impl PaymentPurpose {
    pub fn kind(&self) -> &'static str {
        match self {
            PaymentPurpose::Initial => "initial",
            PaymentPurpose::Recurring => "recurring",
            PaymentPurpose::Upgrade { .. } => "upgrade",
            PaymentPurpose::Renewal { .. } => "renewal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub subscription_id: SubscriptionId,
    pub amount_cents: i64,
    pub currency: String,
    pub payment_method: Option<String>,
    pub status: PaymentStatus,
    /// Checkout session, invoice or payment-intent id at the gateway.
    pub gateway_reference: Option<String>,
    pub purpose: PaymentPurpose,
    /// Funds were withdrawn by a dispute; no later gateway status applies.
    #[serde(default)]
    pub disputed: bool,
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Payment {
    pub fn new_pending(
        subscription_id: SubscriptionId,
        amount_cents: i64,
        currency: impl Into<String>,
        purpose: PaymentPurpose,
        now: Timestamp,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            subscription_id,
            amount_cents,
            currency: currency.into(),
            payment_method: None,
            status: PaymentStatus::Pending,
            gateway_reference: None,
            purpose,
            disputed: false,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_gateway_reference(mut self, reference: impl Into<String>) -> Self {
        self.gateway_reference = Some(reference.into());
        self
    }

    /// Applies a reconciled status.
    ///
    /// Same status is `Unchanged`. A move the state machine forbids (for
    /// example a late `processing` after `succeeded`) is also `Unchanged`:
    /// the gateway already told us something newer. A disputed payment
    /// ignores every later status.
    pub fn apply_status(&mut self, target: PaymentStatus, now: Timestamp) -> Transition {
        if self.disputed || self.status == target || !self.status.can_transition_to(&target) {
            return Transition::Unchanged;
        }
        self.status = target;
        self.updated_at = now;
        Transition::Applied
    }

    /// Funds were withdrawn by a dispute. Overrides COMPLETED and pins the
    /// payment at FAILED.
    pub fn mark_disputed(&mut self, now: Timestamp) -> Result<Transition, DomainError> {
        if self.disputed {
            return Ok(Transition::Unchanged);
        }
        match self.status {
            PaymentStatus::Completed | PaymentStatus::Pending | PaymentStatus::Failed => {
                self.status = PaymentStatus::Failed;
                self.disputed = true;
                self.updated_at = now;
                Ok(Transition::Applied)
            }
            PaymentStatus::Cancelled => Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!("Cannot dispute cancelled payment {}", self.id),
            )),
        }
    }

    /// Fills reference, method and amount the gateway reported, if missing or different.
    pub fn absorb_gateway_details(
        &mut self,
        reference: Option<&str>,
        payment_method: Option<&str>,
        amount_cents: Option<i64>,
        now: Timestamp,
    ) -> Transition {
        let mut changed = false;
        if let Some(reference) = reference {
            if self.gateway_reference.is_none() {
                self.gateway_reference = Some(reference.to_string());
                changed = true;
            }
        }
        if let Some(method) = payment_method {
            if self.payment_method.as_deref() != Some(method) {
                self.payment_method = Some(method.to_string());
                changed = true;
            }
        }
        if let Some(amount) = amount_cents {
            if amount > 0 && self.amount_cents != amount {
                self.amount_cents = amount;
                changed = true;
            }
        }
        if changed {
            self.updated_at = now;
            Transition::Applied
        } else {
            Transition::Unchanged
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == PaymentStatus::Completed
    }
}

/// Sum of completed payment amounts.
pub fn paid_total(payments: &[Payment]) -> i64 {
    payments
        .iter()
        .filter(|p| p.is_completed())
        .map(|p| p.amount_cents)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000).unwrap()
    }

    fn pending() -> Payment {
        Payment::new_pending(SubscriptionId::new(), 10_000, "brl", PaymentPurpose::Initial, now())
    }

    #[test]
    fn apply_status_moves_pending_to_completed_once() {
        let mut payment = pending();
        assert_eq!(payment.apply_status(PaymentStatus::Completed, now()), Transition::Applied);
        assert_eq!(payment.apply_status(PaymentStatus::Completed, now()), Transition::Unchanged);
        assert!(payment.is_completed());
    }

    #[test]
    fn stale_status_after_completion_is_ignored() {
        let mut payment = pending();
        payment.apply_status(PaymentStatus::Completed, now());

        assert_eq!(payment.apply_status(PaymentStatus::Pending, now()), Transition::Unchanged);
        assert_eq!(payment.apply_status(PaymentStatus::Failed, now()), Transition::Unchanged);
        assert_eq!(payment.status, PaymentStatus::Completed);
    }

    #[test]
    fn dispute_overrides_completion() {
        let mut payment = pending();
        payment.apply_status(PaymentStatus::Completed, now());

        assert_eq!(payment.mark_disputed(now()).unwrap(), Transition::Applied);
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert!(payment.disputed);
        assert_eq!(payment.mark_disputed(now()).unwrap(), Transition::Unchanged);
    }

    #[test]
    fn disputed_payment_ignores_late_success() {
        let mut payment = pending();
        payment.apply_status(PaymentStatus::Completed, now());
        payment.mark_disputed(now()).unwrap();

        assert_eq!(payment.apply_status(PaymentStatus::Completed, now()), Transition::Unchanged);
        assert_eq!(payment.apply_status(PaymentStatus::Pending, now()), Transition::Unchanged);
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(paid_total(&[payment]), 0);
    }

    #[test]
    fn dispute_on_failed_payment_still_pins_it() {
        let mut payment = pending();
        payment.apply_status(PaymentStatus::Failed, now());

        assert_eq!(payment.mark_disputed(now()).unwrap(), Transition::Applied);
        assert_eq!(payment.apply_status(PaymentStatus::Completed, now()), Transition::Unchanged);
        assert_eq!(payment.status, PaymentStatus::Failed);
    }

    #[test]
    fn dispute_on_cancelled_payment_is_an_error() {
        let mut payment = pending();
        payment.apply_status(PaymentStatus::Cancelled, now());
        assert!(payment.mark_disputed(now()).is_err());
    }

    #[test]
    fn absorb_gateway_details_is_idempotent() {
        let mut payment = pending();
        let first = payment.absorb_gateway_details(Some("in_1"), Some("card"), Some(12_000), now());
        let second = payment.absorb_gateway_details(Some("in_1"), Some("card"), Some(12_000), now());

        assert_eq!(first, Transition::Applied);
        assert_eq!(second, Transition::Unchanged);
        assert_eq!(payment.gateway_reference.as_deref(), Some("in_1"));
        assert_eq!(payment.amount_cents, 12_000);
    }

    #[test]
    fn paid_total_counts_completed_only() {
        let mut a = pending();
        a.apply_status(PaymentStatus::Completed, now());
        let b = pending();
        let mut c = pending();
        c.amount_cents = 5_000;
        c.apply_status(PaymentStatus::Completed, now());

        assert_eq!(paid_total(&[a, b, c]), 15_000);
    }

    #[test]
    fn purpose_serializes_with_kind_tag() {
        let json = serde_json::to_value(PaymentPurpose::Upgrade {
            target: Recurrence::Monthly,
        })
        .unwrap();
        assert_eq!(json["kind"], "upgrade");
        assert_eq!(json["target"], "MONTHLY");
    }
}
