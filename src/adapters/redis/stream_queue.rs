//! Redis Streams implementation of the event queue.
//!
//! Every accepted webhook is `XADD`ed to one stream and consumed through a
//! consumer group:
//!
//! 1. `receive` first tries to `XCLAIM` one pending entry idle for longer
//!    than the visibility timeout (a crashed or stuck worker's message)
//! 2. otherwise it blocks on `XREADGROUP ... >` for a new entry
//! 3. `ack` is `XACK`; `dead_letter` copies the entry to the dead-letter
//!    stream and then acknowledges it
//!
//! Blocking reads run on a connection per consumer so they never hold up
//! `XADD`/`XACK` traffic on the shared connection.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadOptions, StreamReadReply,
};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::RedisConfig;
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{Delivery, EventQueue};

const PAYLOAD_FIELD: &str = "payload";

fn queue_error(e: redis::RedisError) -> DomainError {
    DomainError::new(ErrorCode::QueueError, e.to_string())
}

pub struct RedisStreamQueue {
    client: redis::Client,
    conn: MultiplexedConnection,
    readers: Mutex<HashMap<String, MultiplexedConnection>>,
    stream: String,
    group: String,
    dead_letter_stream: String,
    block: Duration,
    visibility_timeout: Duration,
}

impl RedisStreamQueue {
    /// Connects and makes sure the consumer group exists.
    pub async fn connect(config: &RedisConfig) -> Result<Self, DomainError> {
        let client = redis::Client::open(config.url.as_str()).map_err(queue_error)?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(queue_error)?;

        let queue = Self {
            client,
            conn,
            readers: Mutex::new(HashMap::new()),
            stream: config.stream.clone(),
            group: config.consumer_group.clone(),
            dead_letter_stream: config.dead_letter_stream.clone(),
            block: config.block(),
            visibility_timeout: config.visibility_timeout(),
        };
        queue.ensure_group().await?;
        Ok(queue)
    }

    /// Creates the stream and consumer group if missing.
    pub async fn ensure_group(&self) -> Result<(), DomainError> {
        let mut conn = self.conn.clone();
        let created: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(&self.stream, &self.group, "0")
            .await;
        match created {
            Ok(()) => {
                tracing::info!(stream = %self.stream, group = %self.group, "Created consumer group");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(queue_error(e)),
        }
    }

    async fn reader(&self, consumer: &str) -> Result<MultiplexedConnection, DomainError> {
        let mut readers = self.readers.lock().await;
        if let Some(conn) = readers.get(consumer) {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(queue_error)?;
        readers.insert(consumer.to_string(), conn.clone());
        Ok(conn)
    }

    fn idle_ms(&self) -> usize {
        self.visibility_timeout.as_millis() as usize
    }

    /// Claims one entry left unacknowledged past the visibility timeout.
    async fn reclaim(&self, consumer: &str) -> Result<Option<Delivery>, DomainError> {
        let mut conn = self.conn.clone();

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.stream)
            .arg(&self.group)
            .arg("IDLE")
            .arg(self.idle_ms())
            .arg("-")
            .arg("+")
            .arg(1)
            .query_async(&mut conn)
            .await
            .map_err(queue_error)?;

        let Some(stale) = pending.ids.into_iter().next() else {
            return Ok(None);
        };

        let claimed: StreamClaimReply = conn
            .xclaim(
                &self.stream,
                &self.group,
                consumer,
                self.idle_ms(),
                &[stale.id.as_str()],
            )
            .await
            .map_err(queue_error)?;

        let Some(entry) = claimed.ids.into_iter().next() else {
            // Another consumer claimed it first, or the entry was trimmed.
            return Ok(None);
        };

        let attempt = stale.times_delivered as u32 + 1;
        tracing::warn!(
            delivery_id = %entry.id,
            previous_consumer = %stale.consumer,
            attempt,
            "Reclaimed unacknowledged delivery"
        );
        self.to_delivery(entry, attempt).await
    }

    async fn read_new(&self, consumer: &str) -> Result<Option<Delivery>, DomainError> {
        let mut conn = self.reader(consumer).await?;
        let options = StreamReadOptions::default()
            .group(&self.group, consumer)
            .count(1)
            .block(self.block.as_millis() as usize);

        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&self.stream], &[">"], &options)
            .await
            .map_err(queue_error)?;

        let entry = reply
            .into_iter()
            .flat_map(|r| r.keys)
            .flat_map(|k| k.ids)
            .next();

        match entry {
            Some(entry) => self.to_delivery(entry, 1).await,
            None => Ok(None),
        }
    }

    /// Entries without a payload field can never be processed; they are
    /// dead-lettered straight away and reported as an empty read.
    async fn to_delivery(
        &self,
        entry: StreamId,
        attempt: u32,
    ) -> Result<Option<Delivery>, DomainError> {
        let payload: Option<String> = entry.get(PAYLOAD_FIELD);
        let delivery = Delivery {
            id: entry.id,
            payload: payload.unwrap_or_default(),
            attempt,
        };
        if delivery.payload.is_empty() {
            tracing::error!(delivery_id = %delivery.id, "Stream entry without payload");
            self.dead_letter(&delivery, "entry has no payload").await?;
            return Ok(None);
        }
        Ok(Some(delivery))
    }
}

#[async_trait]
impl EventQueue for RedisStreamQueue {
    async fn enqueue(&self, payload: &str) -> Result<String, DomainError> {
        let mut conn = self.conn.clone();
        conn.xadd(&self.stream, "*", &[(PAYLOAD_FIELD, payload)])
            .await
            .map_err(queue_error)
    }

    async fn receive(&self, consumer: &str) -> Result<Option<Delivery>, DomainError> {
        if let Some(delivery) = self.reclaim(consumer).await? {
            return Ok(Some(delivery));
        }
        self.read_new(consumer).await
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), DomainError> {
        let mut conn = self.conn.clone();
        conn.xack::<_, _, _, ()>(&self.stream, &self.group, &[delivery.id.as_str()])
            .await
            .map_err(queue_error)
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), DomainError> {
        let mut conn = self.conn.clone();
        let attempt = delivery.attempt.to_string();
        conn.xadd::<_, _, _, _, String>(
            &self.dead_letter_stream,
            "*",
            &[
                (PAYLOAD_FIELD, delivery.payload.as_str()),
                ("source_id", delivery.id.as_str()),
                ("attempt", attempt.as_str()),
                ("reason", reason),
            ],
        )
        .await
        .map_err(queue_error)?;
        self.ack(delivery).await
    }
}
