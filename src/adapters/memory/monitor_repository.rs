//! In-memory monitor repository.
//!
//! Slot rows are derived from the subscription repository so only ACTIVE
//! subscriptions count, mirroring the SQL join.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, MonitorId};
use crate::domain::monitor::{AdminAllocation, MonitorAd, MonitorAllocationInputs, SubscriptionMonitor};
use crate::domain::subscription::SubscriptionStatus;
use crate::ports::MonitorRepository;

use super::InMemorySubscriptionRepository;

#[derive(Debug, Clone)]
struct MonitorRow {
    max_blocks: Option<u32>,
    ads: Vec<MonitorAd>,
}

pub struct InMemoryMonitorRepository {
    monitors: RwLock<HashMap<MonitorId, MonitorRow>>,
    allocations: RwLock<HashMap<MonitorId, AdminAllocation>>,
    subscriptions: Arc<InMemorySubscriptionRepository>,
}

impl InMemoryMonitorRepository {
    pub fn new(subscriptions: Arc<InMemorySubscriptionRepository>) -> Self {
        Self {
            monitors: RwLock::new(HashMap::new()),
            allocations: RwLock::new(HashMap::new()),
            subscriptions,
        }
    }

    pub async fn insert_monitor(&self, monitor_id: MonitorId, max_blocks: Option<u32>, ads: Vec<MonitorAd>) {
        self.monitors
            .write()
            .await
            .insert(monitor_id, MonitorRow { max_blocks, ads });
    }

    pub async fn allocation(&self, monitor_id: &MonitorId) -> Option<AdminAllocation> {
        self.allocations.read().await.get(monitor_id).copied()
    }
}

#[async_trait]
impl MonitorRepository for InMemoryMonitorRepository {
    async fn load_allocation_inputs(
        &self,
        monitor_id: &MonitorId,
    ) -> Result<Option<MonitorAllocationInputs>, DomainError> {
        let Some(row) = self.monitors.read().await.get(monitor_id).cloned() else {
            return Ok(None);
        };

        let subscription_monitors = self
            .subscriptions
            .all()
            .await
            .into_iter()
            .filter(|s| s.status == SubscriptionStatus::Active)
            .flat_map(|s| {
                s.monitors
                    .iter()
                    .filter(|m| m.monitor_id == *monitor_id)
                    .map(|m| SubscriptionMonitor {
                        subscription_id: s.id,
                        monitor_id: m.monitor_id,
                        slots_quantity: m.slots_quantity,
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut ads = row.ads;
        ads.sort_by_key(|ad| ad.order_index);

        Ok(Some(MonitorAllocationInputs {
            monitor_id: *monitor_id,
            max_blocks: row.max_blocks,
            subscription_monitors,
            ads,
        }))
    }

    async fn save_admin_allocation(
        &self,
        monitor_id: &MonitorId,
        allocation: &AdminAllocation,
    ) -> Result<(), DomainError> {
        self.allocations.write().await.insert(*monitor_id, *allocation);
        Ok(())
    }
}
