//! End-to-end tests for the payment-event pipeline.
//!
//! Each test drives a signed gateway webhook through the HTTP router, the
//! queue and a worker, using the in-memory adapters:
//! 1. `POST /webhook` verifies and enqueues the raw event
//! 2. `EventWorkerPool::process_next` dispatches it
//! 3. Subscription, payment and event store reflect exactly one application

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use secrecy::SecretString;
use serde_json::json;
use tower::ServiceExt;

use signage_billing::adapters::http::webhook::WebhookResponse;
use signage_billing::adapters::http::{app_router, WebhookAppState};
use signage_billing::adapters::memory::{
    InMemoryEventQueue, InMemoryEventStore, InMemoryMonitorRepository, InMemoryPaymentRepository,
    InMemorySubscriptionRepository,
};
use signage_billing::adapters::worker::{EventWorkerConfig, EventWorkerPool, WorkerStep};
use signage_billing::application::{
    AllocationRefresher, CreateSubscriptionCommand, CreateSubscriptionHandler, DispatchOutcome,
    EventDispatcher, PaymentReconciler, SubscriptionLifecycle, WebhookIngress,
};
use signage_billing::config::AllocationConfig;
use signage_billing::domain::foundation::{Actor, ClientId, MonitorId};
use signage_billing::domain::gateway::{sign_payload, GatewayWebhookVerifier};
use signage_billing::domain::payment::{Payment, PaymentStatus};
use signage_billing::domain::subscription::{
    Cart, CartItem, CartMonitor, Client, ClientRole, Recurrence, Subscription, SubscriptionStatus,
};
use signage_billing::ports::{PaymentRepository, SubscriptionRepository};

// =============================================================================
// Test Infrastructure
// =============================================================================

const SECRET: &str = "whsec_pipeline_test";
const HEADER: &str = "Stripe-Signature";
const VISIBILITY: Duration = Duration::from_millis(30);

struct Pipeline {
    store: Arc<InMemoryEventStore>,
    queue: Arc<InMemoryEventQueue>,
    subscriptions: Arc<InMemorySubscriptionRepository>,
    payments: Arc<InMemoryPaymentRepository>,
    create: CreateSubscriptionHandler,
    workers: EventWorkerPool,
    app: Router,
}

fn pipeline(max_deliveries: u32) -> Pipeline {
    let store = Arc::new(InMemoryEventStore::new());
    let queue = Arc::new(InMemoryEventQueue::with_timeouts(
        Duration::from_millis(10),
        VISIBILITY,
    ));
    let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
    let payments = Arc::new(InMemoryPaymentRepository::new());
    let monitors = Arc::new(InMemoryMonitorRepository::new(subscriptions.clone()));

    let refresher = Arc::new(AllocationRefresher::new(monitors, AllocationConfig::default()));
    let lifecycle = Arc::new(SubscriptionLifecycle::new(
        subscriptions.clone(),
        refresher.clone(),
    ));
    let reconciler = Arc::new(PaymentReconciler::new(
        payments.clone(),
        subscriptions.clone(),
        lifecycle.clone(),
    ));
    let dispatcher = Arc::new(EventDispatcher::new(store.clone(), lifecycle, reconciler));

    let verifier = GatewayWebhookVerifier::new(SecretString::new(SECRET.to_string()));
    let ingress = Arc::new(WebhookIngress::new(verifier, store.clone(), queue.clone()));
    let app = app_router(
        WebhookAppState::new(ingress, HEADER),
        Duration::from_secs(5),
    );

    let workers = EventWorkerPool::new(
        queue.clone(),
        dispatcher,
        EventWorkerConfig::default()
            .with_concurrency(2)
            .with_max_deliveries(max_deliveries)
            .with_error_backoff(Duration::from_millis(5)),
    );
    let create = CreateSubscriptionHandler::new(subscriptions.clone(), payments.clone(), refresher);

    Pipeline {
        store,
        queue,
        subscriptions,
        payments,
        create,
        workers,
        app,
    }
}

fn sixty_day_cart() -> Cart {
    Cart {
        client: Client {
            id: ClientId::new(),
            role: ClientRole::Client,
        },
        recurrence: Recurrence::SixtyDays,
        items: (0..2)
            .map(|_| CartItem {
                monitor: CartMonitor {
                    monitor_id: MonitorId::new(),
                    address_owner: None,
                    box_active: true,
                },
                slots_quantity: Some(2),
            })
            .collect(),
        amount_cents: 18_000,
        currency: "brl".to_string(),
    }
}

async fn checkout(p: &Pipeline) -> (Subscription, Payment) {
    let result = p
        .create
        .handle(CreateSubscriptionCommand {
            cart: sixty_day_cart(),
            actor: Actor::system("checkout"),
        })
        .await
        .unwrap();
    (result.subscription, result.payment.unwrap())
}

fn invoice_succeeded(event_id: &str, payment: &Payment) -> String {
    json!({
        "id": event_id,
        "type": "invoice.payment_succeeded",
        "data": {
            "object": {
                "id": format!("in_{}", event_id),
                "subscription": "sub_gw_pipeline",
                "amount_paid": payment.amount_cents,
                "currency": "brl",
                "metadata": {
                    "subscription_id": payment.subscription_id.to_string(),
                    "payment_id": payment.id.to_string()
                }
            }
        }
    })
    .to_string()
}

async fn post_webhook(app: &Router, body: &str) -> (StatusCode, Option<WebhookResponse>) {
    let signature = sign_payload(SECRET, chrono::Utc::now().timestamp(), body.as_bytes()).unwrap();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header(HEADER, signature)
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).ok())
}

/// Runs the worker until the queue is empty, waiting out visibility
/// timeouts for deferred deliveries.
async fn drain(p: &Pipeline) -> Vec<WorkerStep> {
    let mut steps = Vec::new();
    for _ in 0..50 {
        if p.queue.is_drained().await {
            break;
        }
        match p.workers.process_next("drain").await.unwrap() {
            WorkerStep::Idle => tokio::time::sleep(VISIBILITY).await,
            step => steps.push(step),
        }
    }
    steps
}

async fn reconciliations(p: &Pipeline, payment: &Payment) -> usize {
    p.payments
        .audit_entries()
        .await
        .iter()
        .filter(|e| e.entity_id == *payment.id.as_uuid() && e.action == "invoice_reconciled")
        .count()
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn successful_invoice_activates_sixty_day_subscription() {
    let p = pipeline(5);
    let (sub, payment) = checkout(&p).await;
    assert_eq!(sub.status, SubscriptionStatus::Pending);
    assert!(!sub.bonus);
    assert_eq!(sub.monitors.len(), 2);

    let (status, body) = post_webhook(&p.app, &invoice_succeeded("evt_a", &payment)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap().status, "processed");

    let step = p.workers.process_next("w-0").await.unwrap();
    assert_eq!(
        step,
        WorkerStep::Acked(DispatchOutcome::Processed {
            event_id: "evt_a".to_string()
        })
    );

    let stored = p.subscriptions.find_by_id(&sub.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Active);
    let started = stored.started_at.unwrap();
    assert_eq!(stored.ends_at, Some(started.add_days(60)));
    assert_eq!(stored.gateway_subscription_id.as_deref(), Some("sub_gw_pipeline"));
    assert_eq!(stored.paid_amount_cents, 18_000);

    let settled = p.payments.find_by_id(&payment.id).await.unwrap().unwrap();
    assert_eq!(settled.status, PaymentStatus::Completed);
    assert_eq!(p.store.len().await, 1);
    assert!(p.queue.is_drained().await);
}

#[tokio::test]
async fn redelivered_event_is_applied_once() {
    let p = pipeline(5);
    let (sub, payment) = checkout(&p).await;
    let body = invoice_succeeded("evt_b", &payment);

    post_webhook(&p.app, &body).await;
    drain(&p).await;
    let after_first = p.subscriptions.find_by_id(&sub.id).await.unwrap().unwrap();

    let (status, response) = post_webhook(&p.app, &body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response.unwrap().status, "already processed");
    assert_eq!(p.queue.ready_len().await, 0);
    assert_eq!(p.store.len().await, 1);
    assert_eq!(reconciliations(&p, &payment).await, 1);
    let after_second = p.subscriptions.find_by_id(&sub.id).await.unwrap().unwrap();
    assert_eq!(after_second, after_first);
}

#[tokio::test]
async fn duplicates_enqueued_before_processing_are_applied_once() {
    let p = pipeline(5);
    let (sub, payment) = checkout(&p).await;
    let body = invoice_succeeded("evt_c", &payment);

    // Both pass the advisory ingress check
    for _ in 0..2 {
        let (status, _) = post_webhook(&p.app, &body).await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(p.queue.ready_len().await, 2);

    let (first, second) = tokio::join!(
        p.workers.process_next("w-0"),
        p.workers.process_next("w-1")
    );
    first.unwrap();
    second.unwrap();
    drain(&p).await;

    assert!(p.queue.is_drained().await);
    assert_eq!(p.store.len().await, 1);
    assert_eq!(reconciliations(&p, &payment).await, 1);
    let stored = p.subscriptions.find_by_id(&sub.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Active);
    assert_eq!(stored.paid_amount_cents, 18_000);
}

#[tokio::test]
async fn unknown_event_type_is_acknowledged_without_record() {
    let p = pipeline(5);
    let body = json!({
        "id": "evt_unknown",
        "type": "customer.created",
        "data": { "object": { "id": "cus_1" } }
    })
    .to_string();

    let (status, _) = post_webhook(&p.app, &body).await;
    assert_eq!(status, StatusCode::OK);

    let step = p.workers.process_next("w-0").await.unwrap();

    assert!(matches!(
        step,
        WorkerStep::Acked(DispatchOutcome::Ignored { .. })
    ));
    assert!(p.queue.is_drained().await);
    assert!(p.store.is_empty().await);
}

#[tokio::test]
async fn version_conflict_is_retried_on_redelivery() {
    let p = pipeline(5);
    let (sub, payment) = checkout(&p).await;
    post_webhook(&p.app, &invoice_succeeded("evt_d", &payment)).await;
    p.subscriptions.force_conflicts(1);

    let first = p.workers.process_next("w-0").await.unwrap();
    assert!(matches!(
        first,
        WorkerStep::Deferred(DispatchOutcome::Retry { .. })
    ));
    assert!(p.store.is_empty().await);

    let steps = drain(&p).await;

    assert_eq!(
        steps,
        vec![WorkerStep::Acked(DispatchOutcome::Processed {
            event_id: "evt_d".to_string()
        })]
    );
    let stored = p.subscriptions.find_by_id(&sub.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Active);
    assert_eq!(p.store.len().await, 1);
}

#[tokio::test]
async fn malformed_known_event_is_dead_lettered() {
    let p = pipeline(2);
    // payment_intent without its status field
    let body = json!({
        "id": "evt_bad",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": "pi_1" } }
    })
    .to_string();

    let (status, _) = post_webhook(&p.app, &body).await;
    assert_eq!(status, StatusCode::OK);

    let steps = drain(&p).await;

    assert!(matches!(
        steps.last(),
        Some(WorkerStep::DeadLettered { .. })
    ));
    assert_eq!(
        steps
            .iter()
            .filter(|s| matches!(s, WorkerStep::Failed { transient: false, .. }))
            .count(),
        2
    );
    assert_eq!(p.queue.dead_letters().await.len(), 1);
    assert!(p.store.is_empty().await);
}

#[tokio::test]
async fn forged_webhook_never_reaches_the_queue() {
    let p = pipeline(5);
    let body = json!({ "id": "evt_forged", "type": "invoice.payment_succeeded", "data": { "object": {} } })
        .to_string();
    let signature =
        sign_payload("whsec_attacker", chrono::Utc::now().timestamp(), body.as_bytes()).unwrap();

    let response = p
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header(HEADER, signature)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(p.queue.is_drained().await);
}
