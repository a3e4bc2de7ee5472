//! Subscription command errors.
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | NotFound | 404 |
//! | UpgradeRejected | 422 |
//! | RenewalNotAllowed | 422 |
//! | InvalidState | 409 |
//! | Infrastructure | 500 |

use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId};

use super::UpgradeRejection;

#[derive(Debug, Clone, Error)]
pub enum SubscriptionError {
    #[error("Subscription not found: {0}")]
    NotFound(SubscriptionId),

    #[error("{0}")]
    UpgradeRejected(UpgradeRejection),

    #[error("Subscription {0} cannot be renewed")]
    RenewalNotAllowed(SubscriptionId),

    #[error("Cannot {attempted} subscription in {current} state")]
    InvalidState { current: String, attempted: String },

    #[error("Error: {0}")]
    Infrastructure(DomainError),
}

impl SubscriptionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SubscriptionError::NotFound(_) => ErrorCode::SubscriptionNotFound,
            SubscriptionError::UpgradeRejected(_) | SubscriptionError::RenewalNotAllowed(_) => {
                ErrorCode::ValidationFailed
            }
            SubscriptionError::InvalidState { .. } => ErrorCode::InvalidStateTransition,
            SubscriptionError::Infrastructure(err) => err.code,
        }
    }

    /// Conflicts and storage hiccups are worth retrying; business refusals are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SubscriptionError::Infrastructure(err) => {
                err.is_conflict() || err.code == ErrorCode::DatabaseError
            }
            _ => false,
        }
    }
}

impl From<DomainError> for SubscriptionError {
    fn from(err: DomainError) -> Self {
        SubscriptionError::Infrastructure(err)
    }
}

impl From<UpgradeRejection> for SubscriptionError {
    fn from(rejection: UpgradeRejection) -> Self {
        SubscriptionError::UpgradeRejected(rejection)
    }
}

impl From<SubscriptionError> for DomainError {
    fn from(err: SubscriptionError) -> Self {
        match err {
            SubscriptionError::Infrastructure(inner) => inner,
            other => DomainError::new(other.code(), other.to_string()),
        }
    }
}
