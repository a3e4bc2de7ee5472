//! In-memory event store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::{EventStore, ProcessedEvent, RecordError};

/// Map-backed [`EventStore`] with the same uniqueness guarantee as the
/// Postgres table: the map is checked and written under one lock.
#[derive(Default)]
pub struct InMemoryEventStore {
    events: Mutex<HashMap<String, ProcessedEvent>>,
    unavailable: AtomicBool,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with a database error until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }

    fn check_available(&self) -> Result<(), DomainError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DomainError::new(ErrorCode::DatabaseError, "event store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn exists(&self, event_id: &str) -> Result<bool, DomainError> {
        self.check_available()?;
        Ok(self.events.lock().await.contains_key(event_id))
    }

    async fn record(&self, event_id: &str, event_type: &str) -> Result<(), RecordError> {
        self.check_available()?;
        let mut events = self.events.lock().await;
        if events.contains_key(event_id) {
            return Err(RecordError::Duplicate {
                event_id: event_id.to_string(),
            });
        }
        events.insert(
            event_id.to_string(),
            ProcessedEvent {
                event_id: event_id.to_string(),
                event_type: event_type.to_string(),
                received_at: Timestamp::now(),
            },
        );
        Ok(())
    }

    async fn find(&self, event_id: &str) -> Result<Option<ProcessedEvent>, DomainError> {
        self.check_available()?;
        Ok(self.events.lock().await.get(event_id).cloned())
    }
}
