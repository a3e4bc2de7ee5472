//! In-memory adapters for every port.
//!
//! Used by the test suites and for local runs without Postgres or Redis.
//! They keep the same uniqueness, version-check and redelivery semantics
//! as the real adapters.

mod event_queue;
mod event_store;
mod monitor_repository;
mod payment_repository;
mod subscription_repository;

pub use event_queue::InMemoryEventQueue;
pub use event_store::InMemoryEventStore;
pub use monitor_repository::InMemoryMonitorRepository;
pub use payment_repository::InMemoryPaymentRepository;
pub use subscription_repository::InMemorySubscriptionRepository;
