//! PostgreSQL implementation of SubscriptionRepository.
//!
//! A subscription is stored as one `subscriptions` row plus one
//! `subscription_monitors` row per monitor. `box_active` is read from the
//! `monitors` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::foundation::{
    AuditEntry, ClientId, DomainError, ErrorCode, MonitorId, SubscriptionId, Timestamp,
};
use crate::domain::subscription::{SubscribedMonitor, Subscription};
use crate::ports::SubscriptionRepository;

use super::audit::insert_audit;
use super::db_error;

#[derive(Clone)]
pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_monitors(
        &self,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<SubscribedMonitor>>, DomainError> {
        let rows: Vec<SubscribedMonitorRow> = sqlx::query_as(
            r#"
            SELECT sm.subscription_id, sm.monitor_id, sm.slots_quantity, m.box_active
            FROM subscription_monitors sm
            JOIN monitors m ON m.id = sm.monitor_id
            WHERE sm.subscription_id = ANY($1)
            ORDER BY sm.monitor_id
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to fetch subscription monitors", e))?;

        let mut by_subscription: HashMap<Uuid, Vec<SubscribedMonitor>> = HashMap::new();
        for row in rows {
            by_subscription
                .entry(row.subscription_id)
                .or_default()
                .push(SubscribedMonitor {
                    monitor_id: MonitorId::from_uuid(row.monitor_id),
                    slots_quantity: row.slots_quantity.map(|q| q.max(0) as u32),
                    box_active: row.box_active,
                });
        }
        Ok(by_subscription)
    }

    async fn hydrate(&self, rows: Vec<SubscriptionRow>) -> Result<Vec<Subscription>, DomainError> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut monitors = self.load_monitors(&ids).await?;
        rows.into_iter()
            .map(|row| {
                let subscription_monitors = monitors.remove(&row.id).unwrap_or_default();
                row.into_subscription(subscription_monitors)
            })
            .collect()
    }

    async fn hydrate_one(&self, row: Option<SubscriptionRow>) -> Result<Option<Subscription>, DomainError> {
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

const SELECT_SUBSCRIPTION: &str = r#"
    SELECT id, client_id, recurrence, gateway_subscription_id, bonus, status, upgrade,
           version, started_at, ends_at, paid_amount_cents, created_at, updated_at
    FROM subscriptions
"#;

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    client_id: Uuid,
    recurrence: String,
    gateway_subscription_id: Option<String>,
    bonus: bool,
    status: String,
    upgrade: bool,
    version: i32,
    started_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    paid_amount_cents: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct SubscribedMonitorRow {
    subscription_id: Uuid,
    monitor_id: Uuid,
    slots_quantity: Option<i32>,
    box_active: bool,
}

impl SubscriptionRow {
    fn into_subscription(self, monitors: Vec<SubscribedMonitor>) -> Result<Subscription, DomainError> {
        let corrupt = |field: &str, e: String| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid {} for subscription {}: {}", field, self.id, e),
            )
        };
        let recurrence = self.recurrence.parse().map_err(|e| corrupt("recurrence", e))?;
        let status = self.status.parse().map_err(|e| corrupt("status", e))?;

        Ok(Subscription {
            id: SubscriptionId::from_uuid(self.id),
            client_id: ClientId::from_uuid(self.client_id),
            recurrence,
            gateway_subscription_id: self.gateway_subscription_id,
            bonus: self.bonus,
            status,
            upgrade: self.upgrade,
            version: self.version,
            started_at: self.started_at.map(Timestamp::from_datetime),
            ends_at: self.ends_at.map(Timestamp::from_datetime),
            paid_amount_cents: self.paid_amount_cents,
            monitors,
            created_at: Timestamp::from_datetime(self.created_at),
            updated_at: Timestamp::from_datetime(self.updated_at),
        })
    }
}

async fn insert_monitors(
    tx: &mut Transaction<'_, Postgres>,
    subscription: &Subscription,
) -> Result<(), DomainError> {
    for monitor in &subscription.monitors {
        sqlx::query(
            r#"
            INSERT INTO subscription_monitors (subscription_id, monitor_id, slots_quantity)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(monitor.monitor_id.as_uuid())
        .bind(monitor.slots_quantity.map(|q| q as i32))
        .execute(&mut **tx)
        .await
        .map_err(|e| db_error("Failed to insert subscription monitor", e))?;
    }
    Ok(())
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn create(&self, subscription: &Subscription, audit: &AuditEntry) -> Result<(), DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, client_id, recurrence, gateway_subscription_id, bonus, status, upgrade,
                version, started_at, ends_at, paid_amount_cents, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.client_id.as_uuid())
        .bind(subscription.recurrence.as_str())
        .bind(&subscription.gateway_subscription_id)
        .bind(subscription.bonus)
        .bind(subscription.status.as_str())
        .bind(subscription.upgrade)
        .bind(subscription.version)
        .bind(subscription.started_at.as_ref().map(|t| *t.as_datetime()))
        .bind(subscription.ends_at.as_ref().map(|t| *t.as_datetime()))
        .bind(subscription.paid_amount_cents)
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to insert subscription", e))?;

        insert_monitors(&mut tx, subscription).await?;
        insert_audit(&mut tx, audit).await?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit subscription", e))?;
        Ok(())
    }

    async fn update(&self, subscription: &Subscription, audit: &AuditEntry) -> Result<i32, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let new_version: Option<(i32,)> = sqlx::query_as(
            r#"
            UPDATE subscriptions SET
                recurrence = $3,
                gateway_subscription_id = $4,
                status = $5,
                upgrade = $6,
                started_at = $7,
                ends_at = $8,
                paid_amount_cents = $9,
                updated_at = $10,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING version
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.version)
        .bind(subscription.recurrence.as_str())
        .bind(&subscription.gateway_subscription_id)
        .bind(subscription.status.as_str())
        .bind(subscription.upgrade)
        .bind(subscription.started_at.as_ref().map(|t| *t.as_datetime()))
        .bind(subscription.ends_at.as_ref().map(|t| *t.as_datetime()))
        .bind(subscription.paid_amount_cents)
        .bind(subscription.updated_at.as_datetime())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to update subscription", e))?;

        let Some((new_version,)) = new_version else {
            let (exists,): (bool,) =
                sqlx::query_as("SELECT EXISTS(SELECT 1 FROM subscriptions WHERE id = $1)")
                    .bind(subscription.id.as_uuid())
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| db_error("Failed to check subscription", e))?;
            return Err(if exists {
                DomainError::concurrency_conflict("subscription", subscription.id, subscription.version)
            } else {
                DomainError::new(
                    ErrorCode::SubscriptionNotFound,
                    format!("Subscription not found: {}", subscription.id),
                )
            });
        };

        insert_audit(&mut tx, audit).await?;
        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit subscription", e))?;
        Ok(new_version)
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        let sql = format!("{} WHERE id = $1", SELECT_SUBSCRIPTION);
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to fetch subscription", e))?;

        self.hydrate_one(row).await
    }

    async fn find_by_gateway_subscription_id(
        &self,
        gateway_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let sql = format!("{} WHERE gateway_subscription_id = $1", SELECT_SUBSCRIPTION);
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(gateway_subscription_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to fetch subscription by gateway id", e))?;

        self.hydrate_one(row).await
    }

    async fn find_due_for_expiry(&self, now: Timestamp, limit: u32) -> Result<Vec<Subscription>, DomainError> {
        let sql = format!(
            "{} WHERE status = 'active' AND bonus = FALSE AND ends_at <= $1 ORDER BY ends_at LIMIT $2",
            SELECT_SUBSCRIPTION
        );
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(now.as_datetime())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to fetch subscriptions due for expiry", e))?;

        self.hydrate(rows).await
    }
}
