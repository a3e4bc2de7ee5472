//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the pipeline to external systems:
//! - `postgres` - Event store and repositories on PostgreSQL
//! - `redis` - Event queue on Redis Streams
//! - `memory` - In-process implementations of every port
//! - `worker` - Queue consumers and periodic jobs
//! - `http` - Webhook and health endpoints

pub mod http;
pub mod memory;
pub mod postgres;
pub mod redis;
pub mod worker;

pub use worker::{EventWorkerConfig, EventWorkerPool, ExpirySweeper, WorkerStep};
