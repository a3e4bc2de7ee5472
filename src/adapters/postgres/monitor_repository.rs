//! PostgreSQL implementation of MonitorRepository.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{AdId, DomainError, MonitorId, SubscriptionId, Timestamp};
use crate::domain::monitor::{
    AdminAllocation, MonitorAd, MonitorAllocationInputs, SubscriptionMonitor,
};
use crate::ports::MonitorRepository;

use super::db_error;

#[derive(Clone)]
pub struct PostgresMonitorRepository {
    pool: PgPool,
}

impl PostgresMonitorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SlotRow {
    subscription_id: Uuid,
    slots_quantity: Option<i32>,
}

#[derive(Debug, sqlx::FromRow)]
struct AdRow {
    ad_id: Uuid,
    order_index: i32,
    subscription_id: Option<Uuid>,
}

fn non_negative(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

#[async_trait]
impl MonitorRepository for PostgresMonitorRepository {
    async fn load_allocation_inputs(
        &self,
        monitor_id: &MonitorId,
    ) -> Result<Option<MonitorAllocationInputs>, DomainError> {
        let monitor: Option<(Option<i32>,)> =
            sqlx::query_as("SELECT max_blocks FROM monitors WHERE id = $1")
                .bind(monitor_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("Failed to fetch monitor", e))?;

        let Some((max_blocks,)) = monitor else {
            return Ok(None);
        };

        let slots: Vec<SlotRow> = sqlx::query_as(
            r#"
            SELECT sm.subscription_id, sm.slots_quantity
            FROM subscription_monitors sm
            JOIN subscriptions s ON s.id = sm.subscription_id
            WHERE sm.monitor_id = $1 AND s.status = 'active'
            ORDER BY sm.subscription_id
            "#,
        )
        .bind(monitor_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to fetch monitor slots", e))?;

        let ads: Vec<AdRow> = sqlx::query_as(
            r#"
            SELECT ad_id, order_index, subscription_id
            FROM monitor_ads
            WHERE monitor_id = $1
            ORDER BY order_index
            "#,
        )
        .bind(monitor_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to fetch monitor ads", e))?;

        Ok(Some(MonitorAllocationInputs {
            monitor_id: *monitor_id,
            max_blocks: max_blocks.map(non_negative),
            subscription_monitors: slots
                .into_iter()
                .map(|row| SubscriptionMonitor {
                    subscription_id: SubscriptionId::from_uuid(row.subscription_id),
                    monitor_id: *monitor_id,
                    slots_quantity: row.slots_quantity.map(non_negative),
                })
                .collect(),
            ads: ads
                .into_iter()
                .map(|row| MonitorAd {
                    ad_id: AdId::from_uuid(row.ad_id),
                    order_index: row.order_index,
                    subscription_id: row.subscription_id.map(SubscriptionId::from_uuid),
                })
                .collect(),
        }))
    }

    async fn save_admin_allocation(
        &self,
        monitor_id: &MonitorId,
        allocation: &AdminAllocation,
    ) -> Result<(), DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        sqlx::query(
            r#"
            UPDATE monitors SET
                total_subscription_blocks = $2,
                remaining_blocks = $3,
                allocated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(monitor_id.as_uuid())
        .bind(allocation.total_subscription_blocks as i32)
        .bind(allocation.remaining_blocks as i32)
        .bind(Timestamp::now().as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to store monitor allocation", e))?;

        sqlx::query(
            r#"
            UPDATE monitor_ads SET
                block_quantity = $2,
                minutes_per_day = $3
            WHERE monitor_id = $1 AND subscription_id IS NULL
            "#,
        )
        .bind(monitor_id.as_uuid())
        .bind(allocation.blocks_per_admin_ad as i32)
        .bind(allocation.minutes_per_admin_ad as i32)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to store admin ad shares", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit monitor allocation", e))?;
        Ok(())
    }
}
