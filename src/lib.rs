//! Signage Billing - payment-event pipeline for monitor ad subscriptions.
//!
//! Gateway webhooks are verified and enqueued by the HTTP ingress, then
//! consumed by a pool of idempotent workers that drive the subscription
//! lifecycle, reconcile payments and re-run the ad slot allocation.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
