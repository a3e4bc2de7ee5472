//! Typed `data.object` payloads for the event types we act on.
//!
//! Only fields used for routing and reconciliation are captured; everything
//! else in the gateway object is ignored.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::foundation::{PaymentId, SubscriptionId};

/// Free-form key/value metadata we attach to gateway objects at checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(HashMap<String, String>);

impl Metadata {
    pub const SUBSCRIPTION_ID: &'static str = "subscription_id";
    pub const PAYMENT_ID: &'static str = "payment_id";

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.get(Self::SUBSCRIPTION_ID)?.parse().ok()
    }

    pub fn payment_id(&self) -> Option<PaymentId> {
        self.get(Self::PAYMENT_ID)?.parse().ok()
    }
}

impl<const N: usize> From<[(&str, String); N]> for Metadata {
    fn from(pairs: [(&str, String); N]) -> Self {
        Self(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl CheckoutSession {
    /// Our subscription id, from metadata first, then the client reference.
    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.metadata.subscription_id().or_else(|| {
            self.client_reference_id
                .as_deref()
                .and_then(|reference| reference.parse().ok())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: String,
    #[serde(default)]
    pub charge: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    /// Gateway subscription the invoice bills.
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount_paid: Option<i64>,
    #[serde(default)]
    pub amount_due: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_method_types: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl PaymentIntent {
    pub fn payment_method(&self) -> Option<&str> {
        self.payment_method_types.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySubscription {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}
