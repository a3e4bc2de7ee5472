//! Subscription domain: lifecycle, recurrence, upgrade rules and bonus logic.

mod aggregate;
mod cart;
mod errors;
mod recurrence;
mod status;
pub mod upgrade_rules;

pub use aggregate::{SubscribedMonitor, Subscription};
pub use cart::{Cart, CartItem, CartMonitor, Client, ClientRole};
pub use errors::SubscriptionError;
pub use recurrence::Recurrence;
pub use status::SubscriptionStatus;
pub use upgrade_rules::UpgradeRejection;
