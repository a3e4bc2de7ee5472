//! In-memory event queue with visibility-timeout redelivery.
//!
//! Mirrors the Redis Streams consumer-group semantics closely enough for
//! the worker pool and pipeline tests: a received message is leased to its
//! consumer, and an expired lease puts it back in front of the queue.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{Delivery, EventQueue};

#[derive(Debug, Clone)]
struct Message {
    id: String,
    payload: String,
    /// Deliveries so far.
    deliveries: u32,
}

#[derive(Debug)]
struct Lease {
    message: Message,
    consumer: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    next_id: u64,
    ready: VecDeque<Message>,
    leased: HashMap<String, Lease>,
    dead: Vec<(Delivery, String)>,
    acked: u64,
}

impl QueueState {
    /// Returns expired leases to the front of the ready queue, oldest first.
    fn reclaim_expired(&mut self, now: Instant) {
        let mut expired: Vec<String> = self
            .leased
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        expired.sort();
        for id in expired.into_iter().rev() {
            if let Some(lease) = self.leased.remove(&id) {
                tracing::debug!(
                    delivery_id = %id,
                    consumer = %lease.consumer,
                    "Lease expired, message redelivered"
                );
                self.ready.push_front(lease.message);
            }
        }
    }
}

pub struct InMemoryEventQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    block: Duration,
    visibility_timeout: Duration,
    unavailable: AtomicBool,
}

impl InMemoryEventQueue {
    pub fn new() -> Self {
        Self::with_timeouts(Duration::from_millis(50), Duration::from_secs(30))
    }

    /// `block` bounds how long `receive` waits; `visibility_timeout` is how
    /// long a delivery may stay unacknowledged before it is redelivered.
    pub fn with_timeouts(block: Duration, visibility_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            block,
            visibility_timeout,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Makes `enqueue` fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Messages waiting for a consumer.
    pub async fn ready_len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    /// Messages delivered but not yet acknowledged.
    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.leased.len()
    }

    pub async fn acked_count(&self) -> u64 {
        self.state.lock().await.acked
    }

    pub async fn dead_letters(&self) -> Vec<(Delivery, String)> {
        self.state.lock().await.dead.clone()
    }

    /// True when nothing is waiting or in flight.
    pub async fn is_drained(&self) -> bool {
        let state = self.state.lock().await;
        state.ready.is_empty() && state.leased.is_empty()
    }

    async fn try_take(&self, consumer: &str) -> Option<Delivery> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.reclaim_expired(now);

        let mut message = state.ready.pop_front()?;
        message.deliveries += 1;
        let delivery = Delivery {
            id: message.id.clone(),
            payload: message.payload.clone(),
            attempt: message.deliveries,
        };
        state.leased.insert(
            message.id.clone(),
            Lease {
                message,
                consumer: consumer.to_string(),
                expires_at: now + self.visibility_timeout,
            },
        );
        Some(delivery)
    }

    /// Removes the message wherever it currently sits.
    fn remove(state: &mut QueueState, id: &str) -> bool {
        if state.leased.remove(id).is_some() {
            return true;
        }
        let before = state.ready.len();
        state.ready.retain(|m| m.id != id);
        state.ready.len() != before
    }
}

impl Default for InMemoryEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventQueue for InMemoryEventQueue {
    async fn enqueue(&self, payload: &str) -> Result<String, DomainError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DomainError::new(ErrorCode::QueueError, "queue unavailable"));
        }
        let id = {
            let mut state = self.state.lock().await;
            state.next_id += 1;
            // Zero-padded so lexical order matches arrival order
            let id = format!("{:020}-0", state.next_id);
            state.ready.push_back(Message {
                id: id.clone(),
                payload: payload.to_string(),
                deliveries: 0,
            });
            id
        };
        self.notify.notify_one();
        Ok(id)
    }

    async fn receive(&self, consumer: &str) -> Result<Option<Delivery>, DomainError> {
        let deadline = Instant::now() + self.block;
        loop {
            if let Some(delivery) = self.try_take(consumer).await {
                return Ok(Some(delivery));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            // A timeout here just means "check again"; expired leases are
            // picked up on the next pass.
            let _ = tokio::time::timeout(deadline - now, self.notify.notified()).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), DomainError> {
        let mut state = self.state.lock().await;
        if Self::remove(&mut state, &delivery.id) {
            state.acked += 1;
        }
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), DomainError> {
        let mut state = self.state.lock().await;
        Self::remove(&mut state, &delivery.id);
        state.dead.push((delivery.clone(), reason.to_string()));
        Ok(())
    }
}
