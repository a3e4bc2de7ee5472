use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use signage_billing::adapters::http::{app_router, WebhookAppState};
use signage_billing::adapters::postgres::{
    self, PostgresEventStore, PostgresMonitorRepository, PostgresPaymentRepository,
    PostgresSubscriptionRepository,
};
use signage_billing::adapters::redis::RedisStreamQueue;
use signage_billing::adapters::worker::{EventWorkerConfig, EventWorkerPool, ExpirySweeper};
use signage_billing::application::{
    AllocationRefresher, EventDispatcher, PaymentReconciler, SubscriptionLifecycle, WebhookIngress,
};
use signage_billing::config::AppConfig;
use signage_billing::ports::{EventQueue, EventStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    config.validate().context("validating configuration")?;

    init_tracing(&config);

    let pool = postgres::connect(&config.database).await?;
    let queue: Arc<dyn EventQueue> = Arc::new(RedisStreamQueue::connect(&config.redis).await?);
    let store: Arc<dyn EventStore> = Arc::new(PostgresEventStore::new(pool.clone()));

    let subscriptions = Arc::new(PostgresSubscriptionRepository::new(pool.clone()));
    let payments = Arc::new(PostgresPaymentRepository::new(pool.clone()));
    let monitors = Arc::new(PostgresMonitorRepository::new(pool));

    let refresher = Arc::new(AllocationRefresher::new(monitors, config.allocation));
    let lifecycle = Arc::new(SubscriptionLifecycle::new(subscriptions.clone(), refresher));
    let reconciler = Arc::new(PaymentReconciler::new(
        payments,
        subscriptions,
        lifecycle.clone(),
    ));
    let dispatcher = Arc::new(EventDispatcher::new(
        store.clone(),
        lifecycle.clone(),
        reconciler,
    ));
    let ingress = Arc::new(WebhookIngress::new(
        config.payment.verifier(),
        store,
        queue.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let workers = Arc::new(EventWorkerPool::new(
        queue,
        dispatcher,
        EventWorkerConfig::from_settings(&config.worker, config.redis.max_deliveries),
    ));
    let workers_handle = tokio::spawn(workers.run(shutdown_rx.clone()));

    let sweeper = ExpirySweeper::new(
        lifecycle,
        config.worker.expiry_sweep_interval(),
        config.worker.expiry_batch_size,
    );
    let sweeper_handle = tokio::spawn(async move { sweeper.run(shutdown_rx).await });

    let state = WebhookAppState::new(ingress, config.payment.signature_header.clone());
    let app = app_router(state, config.server.request_timeout());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!(%addr, environment = ?config.server.environment, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped, draining workers");
    shutdown_tx.send(true).ok();
    let (workers_result, sweeper_result) = tokio::join!(workers_handle, sweeper_handle);
    workers_result.context("worker pool task")?;
    sweeper_result.context("expiry sweeper task")?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.is_production() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
