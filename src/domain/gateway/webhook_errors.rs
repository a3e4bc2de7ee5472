//! Errors raised while accepting a gateway webhook.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    /// No signature header on the request.
    #[error("Missing signature")]
    MissingSignature,

    /// HMAC did not match.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signed more than the allowed age ago.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Signed in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Signature header or envelope could not be parsed.
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl WebhookError {
    /// Gateway retries on 5xx only; none of these will heal on retry.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Every rejection answers 400 so the gateway stops redelivering.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    pub fn is_signature_failure(&self) -> bool {
        !matches!(self, WebhookError::ParseError(_))
    }
}
