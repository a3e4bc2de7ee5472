//! EventWorkerPool - queue consumers running the dispatcher.
//!
//! Each worker is an independent tokio task pulling one delivery at a time.
//! Workers share nothing but the queue and the database behind the
//! dispatcher.
//!
//! ## Acknowledgement policy
//!
//! | Dispatch result | Action |
//! |-----------------|--------|
//! | Processed / AlreadyProcessed / Ignored | ack |
//! | Retry (conflict, entity missing) | leave for redelivery |
//! | Malformed payload | leave; dead-lettered once over `max_deliveries` |
//! | Storage error | leave, back off |
//!
//! ## Graceful Shutdown
//!
//! The shutdown signal is checked between deliveries, so a handler is never
//! cut off mid-way. Latency is bounded by the queue's block timeout.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::application::handlers::webhook::{DispatchOutcome, EventDispatcher};
use crate::config::WorkerConfig;
use crate::domain::foundation::DomainError;
use crate::ports::{Delivery, EventQueue};

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct EventWorkerConfig {
    pub concurrency: usize,
    pub consumer_name: String,
    /// Deliveries allowed before a message is dead-lettered.
    pub max_deliveries: u32,
    pub error_backoff: Duration,
}

impl Default for EventWorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            consumer_name: "billing-worker".to_string(),
            max_deliveries: 5,
            error_backoff: Duration::from_secs(1),
        }
    }
}

impl EventWorkerConfig {
    pub fn from_settings(worker: &WorkerConfig, max_deliveries: u32) -> Self {
        Self {
            concurrency: worker.concurrency,
            consumer_name: worker.consumer_name.clone(),
            max_deliveries,
            error_backoff: worker.error_backoff(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_max_deliveries(mut self, max_deliveries: u32) -> Self {
        self.max_deliveries = max_deliveries;
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }
}

/// What one worker step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStep {
    /// Nothing arrived within the block timeout.
    Idle,
    Acked(DispatchOutcome),
    /// Left unacknowledged for redelivery.
    Deferred(DispatchOutcome),
    DeadLettered { delivery_id: String, reason: String },
    /// Dispatch failed. `transient` failures trigger a backoff.
    Failed { delivery_id: String, transient: bool },
}

pub struct EventWorkerPool {
    queue: Arc<dyn EventQueue>,
    dispatcher: Arc<EventDispatcher>,
    config: EventWorkerConfig,
}

impl EventWorkerPool {
    pub fn new(
        queue: Arc<dyn EventQueue>,
        dispatcher: Arc<EventDispatcher>,
        config: EventWorkerConfig,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            config,
        }
    }

    /// Runs `concurrency` workers until shutdown, then waits for all of them.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let workers = (0..self.config.concurrency).map(|index| {
            let pool = Arc::clone(&self);
            let consumer = format!("{}-{}", self.config.consumer_name, index);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { pool.run_worker(consumer, shutdown).await })
        });

        for result in join_all(workers).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }
        tracing::info!("Worker pool stopped");
    }

    async fn run_worker(&self, consumer: String, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(consumer = %consumer, "Worker started");

        while !*shutdown.borrow() {
            let backoff = match self.process_next(&consumer).await {
                Ok(WorkerStep::Failed { transient: true, .. }) => true,
                Ok(_) => false,
                Err(e) => {
                    tracing::error!(consumer = %consumer, error = %e, "Queue transport error");
                    true
                }
            };

            if backoff {
                tokio::select! {
                    _ = shutdown.changed() => {}
                    _ = tokio::time::sleep(self.config.error_backoff) => {}
                }
            }
        }

        tracing::info!(consumer = %consumer, "Worker stopped");
    }

    /// Receives and handles at most one delivery.
    ///
    /// Errors are queue transport failures only; dispatch failures are
    /// reported as [`WorkerStep::Failed`].
    pub async fn process_next(&self, consumer: &str) -> Result<WorkerStep, DomainError> {
        let Some(delivery) = self.queue.receive(consumer).await? else {
            return Ok(WorkerStep::Idle);
        };

        if delivery.attempt > self.config.max_deliveries {
            return self.dead_letter(&delivery).await;
        }

        match self.dispatcher.dispatch(&delivery.payload).await {
            Ok(outcome) if outcome.should_ack() => {
                self.queue.ack(&delivery).await?;
                tracing::debug!(delivery_id = %delivery.id, outcome = ?outcome, "Delivery acknowledged");
                Ok(WorkerStep::Acked(outcome))
            }
            Ok(outcome) => {
                tracing::warn!(
                    delivery_id = %delivery.id,
                    attempt = delivery.attempt,
                    outcome = ?outcome,
                    "Delivery left for redelivery"
                );
                Ok(WorkerStep::Deferred(outcome))
            }
            Err(e) => {
                let transient = !e.is_permanent();
                tracing::error!(
                    delivery_id = %delivery.id,
                    attempt = delivery.attempt,
                    transient,
                    error = %e,
                    "Delivery failed"
                );
                Ok(WorkerStep::Failed {
                    delivery_id: delivery.id,
                    transient,
                })
            }
        }
    }

    async fn dead_letter(&self, delivery: &Delivery) -> Result<WorkerStep, DomainError> {
        let reason = format!(
            "exceeded {} deliveries (attempt {})",
            self.config.max_deliveries, delivery.attempt
        );
        self.queue.dead_letter(delivery, &reason).await?;
        tracing::error!(delivery_id = %delivery.id, reason = %reason, "Delivery dead-lettered");
        Ok(WorkerStep::DeadLettered {
            delivery_id: delivery.id.clone(),
            reason,
        })
    }
}
