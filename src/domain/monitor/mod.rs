//! Monitor domain: display capacity and ad-slot allocation.

pub mod allocator;
mod snapshot;

pub use allocator::{allocate_admin_blocks, AdminAllocation, DEFAULT_MAX_BLOCKS, MINUTES_PER_DAY};
pub use snapshot::{MonitorAd, MonitorAllocationInputs, SubscriptionMonitor};
