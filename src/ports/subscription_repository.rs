//! SubscriptionRepository port.
//!
//! Writes are optimistic: `update` succeeds only when the stored version
//! still equals `subscription.version`, and bumps it. The audit entry is
//! persisted in the same transaction as the write.

use async_trait::async_trait;

use crate::domain::foundation::{AuditEntry, DomainError, SubscriptionId, Timestamp};
use crate::domain::subscription::Subscription;

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Inserts a new subscription with its monitor rows.
    async fn create(&self, subscription: &Subscription, audit: &AuditEntry) -> Result<(), DomainError>;

    /// Version-checked update. Returns the new version.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict` if the stored version moved on
    /// - `SubscriptionNotFound` if the row is gone
    async fn update(&self, subscription: &Subscription, audit: &AuditEntry) -> Result<i32, DomainError>;

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError>;

    async fn find_by_gateway_subscription_id(
        &self,
        gateway_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError>;

    /// ACTIVE non-bonus subscriptions whose `ends_at <= now`, oldest first.
    async fn find_due_for_expiry(&self, now: Timestamp, limit: u32) -> Result<Vec<Subscription>, DomainError>;
}
