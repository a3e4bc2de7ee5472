//! HTTP handlers for the gateway webhook and health endpoints.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Json, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;

use crate::application::handlers::webhook::{IngressOutcome, WebhookIngress};
use crate::domain::foundation::DomainError;
use crate::domain::gateway::WebhookError;

use super::dto::{ErrorResponse, HealthResponse, WebhookResponse};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct WebhookAppState {
    pub ingress: Arc<WebhookIngress>,
    /// Header the gateway puts its signature in.
    pub signature_header: String,
}

impl WebhookAppState {
    pub fn new(ingress: Arc<WebhookIngress>, signature_header: impl Into<String>) -> Self {
        Self {
            ingress,
            signature_header: signature_header.into(),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhook - Verify a gateway event and enqueue it
pub async fn receive_webhook(
    State(state): State<WebhookAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WebhookApiError> {
    let signature = headers
        .get(state.signature_header.as_str())
        .and_then(|v| v.to_str().ok());

    match state.ingress.handle(&body, signature).await? {
        IngressOutcome::Accepted { event_id, .. } => {
            Ok((StatusCode::OK, Json(WebhookResponse::processed(event_id))))
        }
        IngressOutcome::Duplicate { event_id } => Ok((
            StatusCode::OK,
            Json(WebhookResponse::already_processed(event_id)),
        )),
        IngressOutcome::Rejected(e) => Err(e.into()),
    }
}

/// GET /health - Liveness probe
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Mapping
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts ingress failures to HTTP responses.
#[derive(Debug)]
pub enum WebhookApiError {
    Rejected(WebhookError),
    Infrastructure(DomainError),
}

impl From<WebhookError> for WebhookApiError {
    fn from(err: WebhookError) -> Self {
        Self::Rejected(err)
    }
}

impl From<DomainError> for WebhookApiError {
    fn from(err: DomainError) -> Self {
        Self::Infrastructure(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            WebhookApiError::Rejected(e) => {
                let error_code = match &e {
                    WebhookError::MissingSignature => "MISSING_SIGNATURE",
                    WebhookError::InvalidSignature => "INVALID_SIGNATURE",
                    WebhookError::TimestampOutOfRange | WebhookError::InvalidTimestamp => {
                        "INVALID_TIMESTAMP"
                    }
                    WebhookError::ParseError(_) => "INVALID_PAYLOAD",
                };
                let body = ErrorResponse::new(error_code, e.to_string());
                (e.status_code(), Json(body)).into_response()
            }
            WebhookApiError::Infrastructure(e) => {
                tracing::error!(error = %e, "Webhook ingress failed");
                // Internal detail stays in the log
                let body = ErrorResponse::new(e.code.to_string(), "Temporary failure, retry later");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}
