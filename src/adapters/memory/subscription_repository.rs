//! In-memory subscription repository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;

use crate::domain::foundation::{AuditEntry, DomainError, ErrorCode, SubscriptionId, Timestamp};
use crate::domain::subscription::{Subscription, SubscriptionStatus};
use crate::ports::SubscriptionRepository;

/// Map-backed [`SubscriptionRepository`] enforcing the version check.
#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    rows: RwLock<HashMap<SubscriptionId, Subscription>>,
    audit: RwLock<Vec<AuditEntry>>,
    forced_conflicts: AtomicU32,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` updates fail as if another writer won the race.
    pub fn force_conflicts(&self, n: u32) {
        self.forced_conflicts.store(n, Ordering::SeqCst);
    }

    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.read().await.clone()
    }

    pub async fn all(&self) -> Vec<Subscription> {
        self.rows.read().await.values().cloned().collect()
    }

    fn take_forced_conflict(&self) -> bool {
        self.forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn create(&self, subscription: &Subscription, audit: &AuditEntry) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&subscription.id) {
            return Err(DomainError::new(
                ErrorCode::DatabaseError,
                format!("Subscription {} already exists", subscription.id),
            ));
        }
        rows.insert(subscription.id, subscription.clone());
        self.audit.write().await.push(audit.clone());
        Ok(())
    }

    async fn update(&self, subscription: &Subscription, audit: &AuditEntry) -> Result<i32, DomainError> {
        let mut rows = self.rows.write().await;
        let stored = rows.get_mut(&subscription.id).ok_or_else(|| {
            DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("Subscription not found: {}", subscription.id),
            )
        })?;

        if stored.version != subscription.version || self.take_forced_conflict() {
            return Err(DomainError::concurrency_conflict(
                "subscription",
                subscription.id,
                subscription.version,
            ));
        }

        let mut next = subscription.clone();
        next.version = subscription.version + 1;
        *stored = next;
        self.audit.write().await.push(audit.clone());
        Ok(subscription.version + 1)
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn find_by_gateway_subscription_id(
        &self,
        gateway_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|s| s.gateway_subscription_id.as_deref() == Some(gateway_subscription_id))
            .cloned())
    }

    async fn find_due_for_expiry(&self, now: Timestamp, limit: u32) -> Result<Vec<Subscription>, DomainError> {
        let mut due: Vec<Subscription> = self
            .rows
            .read()
            .await
            .values()
            .filter(|s| {
                s.status == SubscriptionStatus::Active
                    && !s.bonus
                    && matches!(s.ends_at, Some(end) if !end.is_after(&now))
            })
            .cloned()
            .collect();
        due.sort_by_key(|s| s.ends_at);
        due.truncate(limit as usize);
        Ok(due)
    }
}
