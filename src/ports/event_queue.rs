//! EventQueue port - durable at-least-once transport between ingress and workers.
//!
//! A received message stays owned by its consumer until acknowledged. If it
//! is never acknowledged it becomes visible again after the visibility
//! timeout and is redelivered with a higher attempt count.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;

/// One delivery of a queued message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Transport-assigned message id.
    pub id: String,
    /// Raw webhook body as received by ingress.
    pub payload: String,
    /// 1 on first delivery, incremented on each redelivery.
    pub attempt: u32,
}

#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Appends a raw payload. Returns the message id.
    async fn enqueue(&self, payload: &str) -> Result<String, DomainError>;

    /// Waits (bounded by the transport's block timeout) for one message.
    ///
    /// Returns `None` when nothing arrived in time.
    async fn receive(&self, consumer: &str) -> Result<Option<Delivery>, DomainError>;

    /// Removes a delivered message permanently.
    async fn ack(&self, delivery: &Delivery) -> Result<(), DomainError>;

    /// Moves a message that keeps failing aside and acknowledges it.
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), DomainError>;
}
