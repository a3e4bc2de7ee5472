//! PaymentReconciler - mirrors gateway payment state onto local payments.
//!
//! The gateway is authoritative. Payment intents map to a local status
//! through the status table; invoice events take their outcome from the
//! event type. The payment is moved there if its state machine allows it,
//! and the owning subscription's paid total is recomputed. Subscription
//! status is never changed from here.

use serde_json::json;
use std::sync::Arc;

use crate::application::handlers::subscription::SubscriptionLifecycle;
use crate::domain::foundation::{
    Actor, AuditEntry, DomainError, ErrorCode, SubscriptionId, Timestamp, Transition,
};
use crate::domain::gateway::{Dispute, Invoice, Metadata, PaymentIntent};
use crate::domain::payment::{paid_total, InvoiceOutcome, Payment, PaymentPurpose, PaymentStatus};
use crate::ports::{PaymentRepository, SubscriptionRepository};

/// Result of reconciling one gateway object.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub payment: Payment,
    pub transition: Transition,
}

pub struct PaymentReconciler {
    payments: Arc<dyn PaymentRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    lifecycle: Arc<SubscriptionLifecycle>,
}

fn payment_not_found(what: &str, reference: &str) -> DomainError {
    DomainError::new(
        ErrorCode::PaymentNotFound,
        format!("No payment for {} {}", what, reference),
    )
}

impl PaymentReconciler {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        lifecycle: Arc<SubscriptionLifecycle>,
    ) -> Self {
        Self {
            payments,
            subscriptions,
            lifecycle,
        }
    }

    /// Metadata `payment_id` first, then each gateway reference in order.
    async fn locate(
        &self,
        metadata: &Metadata,
        references: &[Option<&str>],
    ) -> Result<Option<Payment>, DomainError> {
        if let Some(id) = metadata.payment_id() {
            if let Some(payment) = self.payments.find_by_id(&id).await? {
                return Ok(Some(payment));
            }
        }
        for reference in references.iter().flatten() {
            if let Some(payment) = self.payments.find_by_gateway_reference(reference).await? {
                return Ok(Some(payment));
            }
        }
        Ok(None)
    }

    /// Writes the payment if anything changed and recomputes the paid total.
    ///
    /// The paid total is recomputed even when the payment was unchanged so a
    /// redelivery after a conflict still converges.
    async fn settle(
        &self,
        payment: Payment,
        transition: Transition,
        action: &str,
        actor: &Actor,
    ) -> Result<Reconciliation, DomainError> {
        let mut payment = payment;
        if transition.is_applied() {
            let audit = AuditEntry::new("payment", *payment.id.as_uuid(), action, actor)
                .with_detail(json!({
                    "status": payment.status.as_str(),
                    "gateway_reference": payment.gateway_reference,
                }));
            payment.version = self.payments.update(&payment, &audit).await?;
            tracing::info!(
                payment_id = %payment.id,
                subscription_id = %payment.subscription_id,
                status = %payment.status,
                action,
                "Payment reconciled"
            );
        }
        self.recompute_paid_amount(&payment.subscription_id, actor).await?;
        Ok(Reconciliation {
            payment,
            transition,
        })
    }

    pub async fn recompute_paid_amount(
        &self,
        subscription_id: &SubscriptionId,
        actor: &Actor,
    ) -> Result<i64, DomainError> {
        let payments = self.payments.list_by_subscription(subscription_id).await?;
        let total = paid_total(&payments);
        self.lifecycle
            .record_paid_amount(subscription_id, total, actor)
            .await?;
        Ok(total)
    }

    /// `invoice.payment_succeeded` / `invoice.payment_failed`.
    ///
    /// An invoice we have no payment for (a gateway-initiated recurring
    /// charge) creates a RECURRING payment on the subscription it bills.
    pub async fn reconcile_invoice(
        &self,
        invoice: &Invoice,
        outcome: InvoiceOutcome,
        actor: &Actor,
    ) -> Result<Reconciliation, DomainError> {
        let target = outcome.resolve(invoice.status.as_deref());
        let reference = invoice.payment_intent.as_deref().unwrap_or(&invoice.id);
        let amount = invoice.amount_paid.filter(|a| *a > 0).or(invoice.amount_due);
        let now = Timestamp::now();

        let existing = self
            .locate(
                &invoice.metadata,
                &[invoice.payment_intent.as_deref(), Some(invoice.id.as_str())],
            )
            .await?;

        let Some(mut payment) = existing else {
            return self.create_recurring(invoice, target, reference, amount, actor).await;
        };

        let details = payment.absorb_gateway_details(Some(reference), None, amount, now);
        let status = payment.apply_status(target, now);
        let transition = if details.is_applied() || status.is_applied() {
            Transition::Applied
        } else {
            Transition::Unchanged
        };
        self.settle(payment, transition, "invoice_reconciled", actor).await
    }

    async fn create_recurring(
        &self,
        invoice: &Invoice,
        target: PaymentStatus,
        reference: &str,
        amount: Option<i64>,
        actor: &Actor,
    ) -> Result<Reconciliation, DomainError> {
        let subscription_id = self.resolve_invoice_subscription(invoice).await?;
        let now = Timestamp::now();
        let currency = invoice.currency.clone().unwrap_or_else(|| "usd".to_string());

        let mut payment = Payment::new_pending(
            subscription_id,
            amount.unwrap_or(0),
            currency,
            PaymentPurpose::Recurring,
            now,
        )
        .with_gateway_reference(reference);
        payment.apply_status(target, now);

        let audit = AuditEntry::new("payment", *payment.id.as_uuid(), "recurring_created", actor)
            .with_detail(json!({
                "invoice": invoice.id,
                "status": payment.status.as_str(),
            }));
        self.payments.create(&payment, &audit).await?;
        tracing::info!(
            payment_id = %payment.id,
            subscription_id = %subscription_id,
            status = %payment.status,
            "Recurring payment created from invoice"
        );

        self.recompute_paid_amount(&subscription_id, actor).await?;
        Ok(Reconciliation {
            payment,
            transition: Transition::Applied,
        })
    }

    async fn resolve_invoice_subscription(&self, invoice: &Invoice) -> Result<SubscriptionId, DomainError> {
        if let Some(id) = invoice.metadata.subscription_id() {
            return Ok(id);
        }
        let Some(gateway_id) = invoice.subscription.as_deref() else {
            return Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("Invoice {} names no subscription", invoice.id),
            ));
        };
        self.subscriptions
            .find_by_gateway_subscription_id(gateway_id)
            .await?
            .map(|s| s.id)
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::SubscriptionNotFound,
                    format!("No subscription for gateway id {}", gateway_id),
                )
            })
    }

    /// `payment_intent.succeeded` / `canceled` / `payment_failed`.
    pub async fn reconcile_payment_intent(
        &self,
        intent: &PaymentIntent,
        actor: &Actor,
    ) -> Result<Reconciliation, DomainError> {
        let mut payment = self
            .locate(&intent.metadata, &[Some(intent.id.as_str())])
            .await?
            .ok_or_else(|| payment_not_found("payment intent", &intent.id))?;

        let now = Timestamp::now();
        let target = PaymentStatus::from_gateway(&intent.status);
        let details =
            payment.absorb_gateway_details(Some(&intent.id), intent.payment_method(), intent.amount, now);
        let status = payment.apply_status(target, now);
        let transition = if details.is_applied() || status.is_applied() {
            Transition::Applied
        } else {
            Transition::Unchanged
        };
        self.settle(payment, transition, "payment_intent_reconciled", actor).await
    }

    /// `charge.dispute.funds_withdrawn`: the payment no longer counts as paid.
    pub async fn reconcile_dispute(
        &self,
        dispute: &Dispute,
        actor: &Actor,
    ) -> Result<Reconciliation, DomainError> {
        let mut payment = self
            .locate(
                &dispute.metadata,
                &[dispute.payment_intent.as_deref(), dispute.charge.as_deref()],
            )
            .await?
            .ok_or_else(|| payment_not_found("dispute", &dispute.id))?;

        let transition = match payment.mark_disputed(Timestamp::now()) {
            Ok(t) => t,
            Err(e) if e.code == ErrorCode::InvalidStateTransition => {
                tracing::warn!(payment_id = %payment.id, dispute = %dispute.id, "Dispute on cancelled payment ignored");
                Transition::Unchanged
            }
            Err(e) => return Err(e),
        };
        self.settle(payment, transition, "disputed", actor).await
    }
}
