//! Background workers.
//!
//! - `EventWorkerPool` - queue consumers running the event dispatcher
//! - `ExpirySweeper` - periodic subscription expiry

mod event_worker;
mod expiry_sweeper;

pub use event_worker::{EventWorkerConfig, EventWorkerPool, WorkerStep};
pub use expiry_sweeper::ExpirySweeper;
