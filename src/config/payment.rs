//! Payment gateway configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;
use crate::domain::gateway::{GatewayWebhookVerifier, MAX_CLOCK_SKEW_SECS, MAX_EVENT_AGE_SECS};

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Webhook signing secret shared with the gateway.
    pub webhook_secret: SecretString,

    /// Request header carrying the signature.
    #[serde(default = "default_signature_header")]
    pub signature_header: String,

    #[serde(default = "default_max_event_age")]
    pub max_event_age_secs: i64,

    #[serde(default = "default_max_clock_skew")]
    pub max_clock_skew_secs: i64,
}

impl PaymentConfig {
    pub fn verifier(&self) -> GatewayWebhookVerifier {
        GatewayWebhookVerifier::new(self.webhook_secret.clone())
            .with_tolerance(self.max_event_age_secs, self.max_clock_skew_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let secret = self.webhook_secret.expose_secret();
        if secret.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__WEBHOOK_SECRET"));
        }
        if !secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidWebhookSecret);
        }
        if self.signature_header.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__SIGNATURE_HEADER"));
        }
        if self.max_event_age_secs <= 0 || self.max_clock_skew_secs < 0 {
            return Err(ValidationError::InvalidWebhookTolerance);
        }
        Ok(())
    }
}

fn default_signature_header() -> String {
    "Stripe-Signature".to_string()
}

fn default_max_event_age() -> i64 {
    MAX_EVENT_AGE_SECS
}

fn default_max_clock_skew() -> i64 {
    MAX_CLOCK_SKEW_SECS
}
