//! PostgreSQL implementation of EventStore.
//!
//! `record` relies on the primary key: `ON CONFLICT DO NOTHING` plus the
//! affected row count tells the one winner apart from every duplicate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{EventStore, ProcessedEvent, RecordError};

use super::db_error;

#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProcessedEventRow {
    event_id: String,
    event_type: String,
    received_at: DateTime<Utc>,
}

impl From<ProcessedEventRow> for ProcessedEvent {
    fn from(row: ProcessedEventRow) -> Self {
        Self {
            event_id: row.event_id,
            event_type: row.event_type,
            received_at: Timestamp::from_datetime(row.received_at),
        }
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn exists(&self, event_id: &str) -> Result<bool, DomainError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM processed_events WHERE event_id = $1)")
                .bind(event_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| db_error("Failed to check processed event", e))?;
        Ok(exists)
    }

    async fn record(&self, event_id: &str, event_type: &str) -> Result<(), RecordError> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, event_type, received_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .bind(Timestamp::now().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to record processed event", e))?;

        if result.rows_affected() == 0 {
            return Err(RecordError::Duplicate {
                event_id: event_id.to_string(),
            });
        }
        Ok(())
    }

    async fn find(&self, event_id: &str) -> Result<Option<ProcessedEvent>, DomainError> {
        let row: Option<ProcessedEventRow> = sqlx::query_as(
            "SELECT event_id, event_type, received_at FROM processed_events WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to fetch processed event", e))?;

        Ok(row.map(ProcessedEvent::from))
    }
}
