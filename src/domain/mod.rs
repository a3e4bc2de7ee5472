//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (IDs, timestamps, audit, errors, state machine)
//! - `gateway` - Webhook envelope, typed payloads and signature verification
//! - `subscription` - Subscription lifecycle, upgrade rules and bonus logic
//! - `payment` - Payment status and gateway status mapping
//! - `monitor` - Monitor capacity and the ad slot allocator

pub mod foundation;
pub mod gateway;
pub mod monitor;
pub mod payment;
pub mod subscription;
