//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Pipeline Ports
//!
//! - `EventStore` - Dedup ledger keyed by gateway event id
//! - `EventQueue` - Durable at-least-once queue between ingress and workers
//!
//! ## Persistence Ports
//!
//! - `SubscriptionRepository` - Optimistically locked subscription storage
//! - `PaymentRepository` - Optimistically locked payment storage
//! - `MonitorRepository` - Allocation inputs and results

mod event_queue;
mod event_store;
mod monitor_repository;
mod payment_repository;
mod subscription_repository;

pub use event_queue::{Delivery, EventQueue};
pub use event_store::{EventStore, ProcessedEvent, RecordError};
pub use monitor_repository::MonitorRepository;
pub use payment_repository::PaymentRepository;
pub use subscription_repository::SubscriptionRepository;
