//! Payment handlers.

mod reconcile_payment;

pub use reconcile_payment::{PaymentReconciler, Reconciliation};
