//! Application handlers.
//!
//! Command handlers and services that orchestrate domain operations.

pub mod monitor;
pub mod payment;
pub mod subscription;
pub mod webhook;

pub use monitor::AllocationRefresher;
pub use payment::{PaymentReconciler, Reconciliation};
pub use subscription::{
    CreateSubscriptionCommand, CreateSubscriptionHandler, CreateSubscriptionResult,
    RenewSubscriptionCommand, RenewSubscriptionHandler, RenewSubscriptionResult,
    SubscriptionLifecycle, UpgradeSubscriptionCommand, UpgradeSubscriptionHandler,
    UpgradeSubscriptionResult,
};
pub use webhook::{DispatchError, DispatchOutcome, EventDispatcher, IngressOutcome, WebhookIngress};
