//! Subscription handlers.
//!
//! ## Commands
//! - Creating a subscription from a checkout cart
//! - Opening an upgrade or a renewal payment
//!
//! ## Gateway-driven transitions
//! - [`SubscriptionLifecycle`] applies what webhook events and the expiry
//!   sweeper decide

mod create_subscription;
mod lifecycle;
mod renew_subscription;
mod upgrade_subscription;

pub use create_subscription::{
    CreateSubscriptionCommand, CreateSubscriptionHandler, CreateSubscriptionResult,
};
pub use lifecycle::SubscriptionLifecycle;
pub use renew_subscription::{RenewSubscriptionCommand, RenewSubscriptionHandler, RenewSubscriptionResult};
pub use upgrade_subscription::{
    UpgradeSubscriptionCommand, UpgradeSubscriptionHandler, UpgradeSubscriptionResult,
};
