//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, audit types, and error types
//! that form the vocabulary of the billing domain.

mod audit;
mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use audit::{Actor, AuditEntry};
pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{AdId, ClientId, MonitorId, PaymentId, SubscriptionId};
pub use state_machine::{StateMachine, Transition};
pub use timestamp::Timestamp;
