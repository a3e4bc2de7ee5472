//! Subscription aggregate entity.
//!
//! A Subscription rents ad slots on one or more monitors for a recurrence
//! period. It owns its payments (cascade) and references monitors.
//!
//! # Invariants
//!
//! - `bonus` implies `recurrence == Monthly` and `ends_at == None`
//! - `ends_at == started_at + recurrence.days` for fixed-term tiers, else `None`
//! - status changes follow [`SubscriptionStatus`] transition rules
//! - every persisted write bumps `version` (optimistic lock)
//!
//! Operations driven by gateway events are idempotent: replaying one on an
//! entity that already reflects it returns [`Transition::Unchanged`].

use crate::domain::foundation::{
    ClientId, DomainError, ErrorCode, MonitorId, StateMachine, SubscriptionId, Timestamp,
    Transition,
};
use serde::{Deserialize, Serialize};

use super::upgrade_rules::{check_upgrade, UpgradeRejection};
use super::{Cart, Recurrence, SubscriptionStatus};

/// A monitor attached to a subscription, with the slots bought on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribedMonitor {
    pub monitor_id: MonitorId,
    pub slots_quantity: Option<u32>,
    /// Whether the monitor's player box is online and serving.
    pub box_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub client_id: ClientId,
    pub recurrence: Recurrence,
    /// Gateway-side subscription id, known once the first invoice is paid.
    pub gateway_subscription_id: Option<String>,
    pub bonus: bool,
    pub status: SubscriptionStatus,
    /// An upgrade payment has been opened and not yet settled.
    pub upgrade: bool,
    pub version: i32,
    pub started_at: Option<Timestamp>,
    pub ends_at: Option<Timestamp>,
    /// Sum of COMPLETED payment amounts, in cents.
    pub paid_amount_cents: i64,
    pub monitors: Vec<SubscribedMonitor>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Builds a subscription from a checkout cart.
    ///
    /// Partners whose own addresses host every monitor get a bonus
    /// subscription: active immediately, monthly, and open-ended. Everyone
    /// else starts pending until the first payment succeeds.
    pub fn create_from_cart(id: SubscriptionId, cart: &Cart, now: Timestamp) -> Self {
        let bonus = cart.qualifies_for_bonus();
        let monitors = cart
            .items
            .iter()
            .map(|item| SubscribedMonitor {
                monitor_id: item.monitor.monitor_id,
                slots_quantity: item.slots_quantity,
                box_active: item.monitor.box_active,
            })
            .collect();

        let (status, recurrence, started_at) = if bonus {
            (SubscriptionStatus::Active, Recurrence::Monthly, Some(now))
        } else {
            (SubscriptionStatus::Pending, cart.recurrence, None)
        };

        Self {
            id,
            client_id: cart.client.id,
            recurrence,
            gateway_subscription_id: None,
            bonus,
            status,
            upgrade: false,
            version: 1,
            started_at,
            ends_at: None,
            paid_amount_cents: 0,
            monitors,
            created_at: now,
            updated_at: now,
        }
    }

    /// End of the paid period implied by `started_at` and `recurrence`.
    pub fn compute_ends_at(&self) -> Option<Timestamp> {
        if self.bonus || !self.recurrence.is_fixed_term() {
            return None;
        }
        self.started_at
            .map(|start| start.add_secs(self.recurrence.period_secs()))
    }

    /// Sets `started_at` if unset and recomputes `ends_at`.
    pub fn initialize(&mut self, now: Timestamp) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.ends_at = self.compute_ends_at();
    }

    /// First successful payment: PENDING -> ACTIVE.
    ///
    /// Replaying on an ACTIVE subscription only attaches a missing gateway
    /// subscription id. Terminal subscriptions cannot be activated.
    pub fn activate(
        &mut self,
        now: Timestamp,
        gateway_subscription_id: Option<String>,
    ) -> Result<Transition, DomainError> {
        match self.status {
            SubscriptionStatus::Active => Ok(self.attach_gateway_subscription(gateway_subscription_id, now)),
            SubscriptionStatus::Pending => {
                self.transition_to(SubscriptionStatus::Active)?;
                self.initialize(now);
                self.attach_gateway_subscription(gateway_subscription_id, now);
                self.updated_at = now;
                Ok(Transition::Applied)
            }
            SubscriptionStatus::Expired | SubscriptionStatus::Cancelled => Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!("Cannot activate subscription {} in {} state", self.id, self.status),
            )),
        }
    }

    fn attach_gateway_subscription(&mut self, id: Option<String>, now: Timestamp) -> Transition {
        match id {
            Some(id) if self.gateway_subscription_id.is_none() => {
                self.gateway_subscription_id = Some(id);
                self.updated_at = now;
                Transition::Applied
            }
            _ => Transition::Unchanged,
        }
    }

    /// Checkout session expired before payment: PENDING -> CANCELLED.
    ///
    /// Any other status is left alone.
    pub fn abandon_checkout(&mut self, now: Timestamp) -> Transition {
        if self.status != SubscriptionStatus::Pending {
            return Transition::Unchanged;
        }
        self.status = SubscriptionStatus::Cancelled;
        self.updated_at = now;
        Transition::Applied
    }

    /// Gateway deleted the subscription: any non-terminal status -> CANCELLED.
    pub fn cancel(&mut self, now: Timestamp) -> Transition {
        if self.status.is_terminal() {
            return Transition::Unchanged;
        }
        self.status = SubscriptionStatus::Cancelled;
        self.upgrade = false;
        self.updated_at = now;
        Transition::Applied
    }

    /// ACTIVE fixed-term subscription past its end date -> EXPIRED.
    pub fn expire_if_due(&mut self, now: Timestamp) -> Transition {
        let due = matches!(self.ends_at, Some(end) if !end.is_after(&now));
        if self.status != SubscriptionStatus::Active || self.bonus || !due {
            return Transition::Unchanged;
        }
        self.status = SubscriptionStatus::Expired;
        self.updated_at = now;
        Transition::Applied
    }

    fn passes_common_gate(&self, now: Timestamp) -> bool {
        !self.bonus
            && self.status == SubscriptionStatus::Active
            && matches!(self.ends_at, Some(end) if end.is_after(&now))
            && self.monitors.iter().all(|m| m.box_active)
    }

    pub fn able_to_upgrade_at(&self, now: Timestamp) -> bool {
        self.passes_common_gate(now) && !self.upgrade && self.recurrence != Recurrence::Monthly
    }

    pub fn able_to_upgrade(&self) -> bool {
        self.able_to_upgrade_at(Timestamp::now())
    }

    pub fn able_to_renew_at(&self, now: Timestamp) -> bool {
        self.passes_common_gate(now) && self.recurrence.is_fixed_term()
    }

    pub fn able_to_renew(&self) -> bool {
        self.able_to_renew_at(Timestamp::now())
    }

    /// Opens an upgrade to `target`; settled later by [`Self::complete_upgrade`].
    pub fn begin_upgrade(&mut self, target: Recurrence, now: Timestamp) -> Result<(), UpgradeRejection> {
        if self.upgrade {
            return Err(UpgradeRejection::AlreadyUpgrading);
        }
        if !self.able_to_upgrade_at(now) {
            return Err(UpgradeRejection::NotEligible);
        }
        check_upgrade(self.recurrence, target)?;
        self.upgrade = true;
        self.updated_at = now;
        Ok(())
    }

    /// Upgrade payment settled: switch recurrence and restart the period.
    ///
    /// Keyed on the rule table rather than the `upgrade` flag, so an upgrade
    /// payment that failed (aborting the upgrade) and was later paid still
    /// lands. A replay finds the target already in place and is `Unchanged`.
    pub fn complete_upgrade(&mut self, target: Recurrence, now: Timestamp) -> Transition {
        if self.status != SubscriptionStatus::Active || check_upgrade(self.recurrence, target).is_err() {
            return Transition::Unchanged;
        }
        self.recurrence = target;
        self.started_at = Some(now);
        self.ends_at = self.compute_ends_at();
        self.upgrade = false;
        self.updated_at = now;
        Transition::Applied
    }

    /// Upgrade payment was cancelled or failed: reopen the upgrade gate.
    pub fn abort_upgrade(&mut self, now: Timestamp) -> Transition {
        if !self.upgrade {
            return Transition::Unchanged;
        }
        self.upgrade = false;
        self.updated_at = now;
        Transition::Applied
    }

    /// End date a renewal bought now would extend to, if renewal is allowed.
    pub fn renewal_extends_to(&self, now: Timestamp) -> Option<Timestamp> {
        if !self.able_to_renew_at(now) {
            return None;
        }
        self.ends_at
            .map(|end| end.add_secs(self.recurrence.period_secs()))
    }

    /// Renewal payment settled: push `ends_at` out to `until`.
    ///
    /// Never shortens the period, so a replay is a no-op.
    pub fn extend_to(&mut self, until: Timestamp, now: Timestamp) -> Transition {
        if self.status != SubscriptionStatus::Active || self.bonus {
            return Transition::Unchanged;
        }
        match self.ends_at {
            Some(end) if end.is_before(&until) => {
                self.ends_at = Some(until);
                self.updated_at = now;
                Transition::Applied
            }
            _ => Transition::Unchanged,
        }
    }

    /// Stores the recomputed paid total.
    pub fn set_paid_amount(&mut self, cents: i64, now: Timestamp) -> Transition {
        if self.paid_amount_cents == cents {
            return Transition::Unchanged;
        }
        self.paid_amount_cents = cents;
        self.updated_at = now;
        Transition::Applied
    }

    pub fn monitor_ids(&self) -> Vec<MonitorId> {
        self.monitors.iter().map(|m| m.monitor_id).collect()
    }

    fn transition_to(&mut self, target: SubscriptionStatus) -> Result<(), DomainError> {
        self.status = self.status.transition_to(target).map_err(|_| {
            DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!(
                    "Cannot transition subscription from {:?} to {:?}",
                    self.status, target
                ),
            )
        })?;
        Ok(())
    }
}
