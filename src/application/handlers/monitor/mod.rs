//! Monitor handlers.

mod refresh_allocation;

pub use refresh_allocation::AllocationRefresher;
