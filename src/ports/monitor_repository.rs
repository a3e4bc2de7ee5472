//! MonitorRepository port - allocation inputs and results.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, MonitorId};
use crate::domain::monitor::{AdminAllocation, MonitorAllocationInputs};

#[async_trait]
pub trait MonitorRepository: Send + Sync {
    /// Capacity, ACTIVE subscription slot rows and playlist for one monitor.
    async fn load_allocation_inputs(
        &self,
        monitor_id: &MonitorId,
    ) -> Result<Option<MonitorAllocationInputs>, DomainError>;

    /// Stores the computed share on every admin ad of the monitor.
    async fn save_admin_allocation(
        &self,
        monitor_id: &MonitorId,
        allocation: &AdminAllocation,
    ) -> Result<(), DomainError>;
}
