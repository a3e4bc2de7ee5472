//! Payment domain: local mirror of gateway money movement.

mod aggregate;
mod status;

pub use aggregate::{paid_total, Payment, PaymentPurpose};
pub use status::{InvoiceOutcome, PaymentStatus};
