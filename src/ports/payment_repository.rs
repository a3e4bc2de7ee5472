//! PaymentRepository port.

use async_trait::async_trait;

use crate::domain::foundation::{AuditEntry, DomainError, PaymentId, SubscriptionId};
use crate::domain::payment::Payment;

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create(&self, payment: &Payment, audit: &AuditEntry) -> Result<(), DomainError>;

    /// Version-checked update, same contract as subscriptions.
    async fn update(&self, payment: &Payment, audit: &AuditEntry) -> Result<i32, DomainError>;

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError>;

    async fn find_by_gateway_reference(&self, reference: &str) -> Result<Option<Payment>, DomainError>;

    async fn list_by_subscription(&self, subscription_id: &SubscriptionId) -> Result<Vec<Payment>, DomainError>;
}
