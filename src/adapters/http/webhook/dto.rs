//! Response bodies for the webhook endpoints.

use serde::{Deserialize, Serialize};

/// Body returned to the gateway for a handled delivery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookResponse {
    /// `processed` or `already processed`.
    pub status: String,
    pub event_id: String,
}

impl WebhookResponse {
    pub fn processed(event_id: impl Into<String>) -> Self {
        Self {
            status: "processed".to_string(),
            event_id: event_id.into(),
        }
    }

    pub fn already_processed(event_id: impl Into<String>) -> Self {
        Self {
            status: "already processed".to_string(),
            event_id: event_id.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
}

/// Standard error response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error_code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}
