//! AllocationRefresher - recomputes the admin ad share of a monitor.
//!
//! Runs after anything that changes which subscriptions are ACTIVE on a
//! monitor. The computation itself is the pure allocator; this service only
//! loads inputs and stores the result.

use std::sync::Arc;

use crate::config::AllocationConfig;
use crate::domain::foundation::{DomainError, MonitorId};
use crate::domain::monitor::{allocator, AdminAllocation};
use crate::ports::MonitorRepository;

pub struct AllocationRefresher {
    monitors: Arc<dyn MonitorRepository>,
    config: AllocationConfig,
}

impl AllocationRefresher {
    pub fn new(monitors: Arc<dyn MonitorRepository>, config: AllocationConfig) -> Self {
        Self { monitors, config }
    }

    /// Recomputes and stores the allocation for one monitor.
    ///
    /// Returns `None` when the monitor does not exist.
    pub async fn refresh(&self, monitor_id: &MonitorId) -> Result<Option<AdminAllocation>, DomainError> {
        let Some(inputs) = self.monitors.load_allocation_inputs(monitor_id).await? else {
            tracing::debug!(monitor_id = %monitor_id, "Monitor not found, skipping allocation");
            return Ok(None);
        };

        let max_blocks = inputs.max_blocks.or(Some(self.config.default_max_blocks));
        let allocation = allocator::allocate_with_day(
            max_blocks,
            &inputs.subscription_monitors,
            inputs.admin_ad_count(),
            self.config.minutes_per_day,
        );

        self.monitors.save_admin_allocation(monitor_id, &allocation).await?;

        tracing::info!(
            monitor_id = %monitor_id,
            total_subscription_blocks = allocation.total_subscription_blocks,
            remaining_blocks = allocation.remaining_blocks,
            blocks_per_admin_ad = allocation.blocks_per_admin_ad,
            minutes_per_admin_ad = allocation.minutes_per_admin_ad,
            "Admin allocation refreshed"
        );
        Ok(Some(allocation))
    }

    /// Refreshes every monitor, logging failures instead of returning them.
    pub async fn refresh_all(&self, monitor_ids: &[MonitorId]) {
        for monitor_id in monitor_ids {
            if let Err(e) = self.refresh(monitor_id).await {
                tracing::warn!(monitor_id = %monitor_id, error = %e, "Allocation refresh failed");
            }
        }
    }
}
