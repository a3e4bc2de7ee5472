//! In-memory payment repository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::domain::foundation::{AuditEntry, DomainError, ErrorCode, PaymentId, SubscriptionId};
use crate::domain::payment::Payment;
use crate::ports::PaymentRepository;

#[derive(Default)]
pub struct InMemoryPaymentRepository {
    rows: RwLock<HashMap<PaymentId, Payment>>,
    audit: RwLock<Vec<AuditEntry>>,
    reject_creates: AtomicBool,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `create` fail with a database error until reset.
    pub fn set_reject_creates(&self, reject: bool) {
        self.reject_creates.store(reject, Ordering::SeqCst);
    }

    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.read().await.clone()
    }

    pub async fn all(&self) -> Vec<Payment> {
        self.rows.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn create(&self, payment: &Payment, audit: &AuditEntry) -> Result<(), DomainError> {
        if self.reject_creates.load(Ordering::SeqCst) {
            return Err(DomainError::new(ErrorCode::DatabaseError, "payment store unavailable"));
        }
        let mut rows = self.rows.write().await;
        if let Some(reference) = payment.gateway_reference.as_deref() {
            if rows.values().any(|p| p.gateway_reference.as_deref() == Some(reference)) {
                return Err(DomainError::new(
                    ErrorCode::ConcurrencyConflict,
                    format!("Payment for gateway reference {} created concurrently", reference),
                )
                .with_detail("entity", "payment"));
            }
        }
        rows.insert(payment.id, payment.clone());
        self.audit.write().await.push(audit.clone());
        Ok(())
    }

    async fn update(&self, payment: &Payment, audit: &AuditEntry) -> Result<i32, DomainError> {
        let mut rows = self.rows.write().await;
        let stored = rows.get_mut(&payment.id).ok_or_else(|| {
            DomainError::new(ErrorCode::PaymentNotFound, format!("Payment not found: {}", payment.id))
        })?;
        if stored.version != payment.version {
            return Err(DomainError::concurrency_conflict("payment", payment.id, payment.version));
        }

        let mut next = payment.clone();
        next.version = payment.version + 1;
        *stored = next;
        self.audit.write().await.push(audit.clone());
        Ok(payment.version + 1)
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn find_by_gateway_reference(&self, reference: &str) -> Result<Option<Payment>, DomainError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|p| p.gateway_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn list_by_subscription(&self, subscription_id: &SubscriptionId) -> Result<Vec<Payment>, DomainError> {
        let mut payments: Vec<Payment> = self
            .rows
            .read()
            .await
            .values()
            .filter(|p| p.subscription_id == *subscription_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }
}
