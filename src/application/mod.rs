//! Application layer - Commands, services, and handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.

pub mod handlers;

pub use handlers::{
    AllocationRefresher, CreateSubscriptionCommand, CreateSubscriptionHandler,
    CreateSubscriptionResult, DispatchError, DispatchOutcome, EventDispatcher, IngressOutcome,
    PaymentReconciler, Reconciliation, RenewSubscriptionCommand, RenewSubscriptionHandler,
    RenewSubscriptionResult, SubscriptionLifecycle, UpgradeSubscriptionCommand,
    UpgradeSubscriptionHandler, UpgradeSubscriptionResult, WebhookIngress,
};
