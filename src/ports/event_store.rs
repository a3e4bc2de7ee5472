//! EventStore port - durable dedup ledger for gateway events.
//!
//! One row per processed gateway event id. Rows are written once and never
//! updated or deleted; the unique constraint on `event_id` is what makes
//! duplicate delivery harmless. `exists` is only a fast path and may race.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::{DomainError, Timestamp};

/// A recorded gateway event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedEvent {
    pub event_id: String,
    pub event_type: String,
    pub received_at: Timestamp,
}

#[derive(Debug, Clone, Error)]
pub enum RecordError {
    /// Another worker recorded this event first.
    #[error("event {event_id} already recorded")]
    Duplicate { event_id: String },

    #[error(transparent)]
    Storage(#[from] DomainError),
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// True if the event id has been recorded.
    async fn exists(&self, event_id: &str) -> Result<bool, DomainError>;

    /// Records the event id.
    ///
    /// Safe under concurrent callers: exactly one succeeds, every other
    /// caller gets [`RecordError::Duplicate`].
    async fn record(&self, event_id: &str, event_type: &str) -> Result<(), RecordError>;

    async fn find(&self, event_id: &str) -> Result<Option<ProcessedEvent>, DomainError>;
}
