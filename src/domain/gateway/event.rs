//! Gateway webhook event envelope and its typed decoding.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::payloads::{CheckoutSession, Dispute, GatewaySubscription, Invoice, PaymentIntent};

/// The two fields ingress needs: dedup key and routing discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHeader {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
}

/// Full event as carried on the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: Option<i64>,
    pub data: EventData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    /// Polymorphic on `type`.
    pub object: serde_json::Value,
}

impl EventEnvelope {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn parsed_type(&self) -> GatewayEventType {
        GatewayEventType::parse(&self.event_type)
    }
}

/// Event types the pipeline acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayEventType {
    CheckoutSessionExpired,
    ChargeDisputeFundsWithdrawn,
    InvoicePaymentFailed,
    InvoicePaymentSucceeded,
    PaymentIntentSucceeded,
    PaymentIntentCanceled,
    PaymentIntentPaymentFailed,
    CustomerSubscriptionDeleted,
    Unknown,
}

const EVENT_TYPE_TABLE: &[(&str, GatewayEventType)] = &[
    ("checkout.session.expired", GatewayEventType::CheckoutSessionExpired),
    ("charge.dispute.funds_withdrawn", GatewayEventType::ChargeDisputeFundsWithdrawn),
    ("invoice.payment_failed", GatewayEventType::InvoicePaymentFailed),
    ("invoice.payment_succeeded", GatewayEventType::InvoicePaymentSucceeded),
    ("payment_intent.succeeded", GatewayEventType::PaymentIntentSucceeded),
    ("payment_intent.canceled", GatewayEventType::PaymentIntentCanceled),
    ("payment_intent.payment_failed", GatewayEventType::PaymentIntentPaymentFailed),
    ("customer.subscription.deleted", GatewayEventType::CustomerSubscriptionDeleted),
];

impl GatewayEventType {
    pub fn parse(s: &str) -> Self {
        EVENT_TYPE_TABLE
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, t)| *t)
            .unwrap_or(GatewayEventType::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        EVENT_TYPE_TABLE
            .iter()
            .find(|(_, t)| t == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }

    pub fn is_known(&self) -> bool {
        *self != GatewayEventType::Unknown
    }
}

impl fmt::Display for GatewayEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recognized event with its object decoded into the matching schema.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    CheckoutSessionExpired(CheckoutSession),
    ChargeDisputeFundsWithdrawn(Dispute),
    InvoicePaymentFailed(Invoice),
    InvoicePaymentSucceeded(Invoice),
    PaymentIntentSucceeded(PaymentIntent),
    PaymentIntentCanceled(PaymentIntent),
    PaymentIntentPaymentFailed(PaymentIntent),
    CustomerSubscriptionDeleted(GatewaySubscription),
}

impl GatewayEvent {
    /// Decodes the envelope's object according to its type.
    ///
    /// Returns `Ok(None)` for types we do not handle. A recognized type whose
    /// object does not match its schema is an error.
    pub fn decode(envelope: &EventEnvelope) -> Result<Option<Self>, serde_json::Error> {
        use GatewayEventType as T;

        let object = envelope.data.object.clone();
        let event = match envelope.parsed_type() {
            T::CheckoutSessionExpired => Self::CheckoutSessionExpired(serde_json::from_value(object)?),
            T::ChargeDisputeFundsWithdrawn => {
                Self::ChargeDisputeFundsWithdrawn(serde_json::from_value(object)?)
            }
            T::InvoicePaymentFailed => Self::InvoicePaymentFailed(serde_json::from_value(object)?),
            T::InvoicePaymentSucceeded => Self::InvoicePaymentSucceeded(serde_json::from_value(object)?),
            T::PaymentIntentSucceeded => Self::PaymentIntentSucceeded(serde_json::from_value(object)?),
            T::PaymentIntentCanceled => Self::PaymentIntentCanceled(serde_json::from_value(object)?),
            T::PaymentIntentPaymentFailed => {
                Self::PaymentIntentPaymentFailed(serde_json::from_value(object)?)
            }
            T::CustomerSubscriptionDeleted => {
                Self::CustomerSubscriptionDeleted(serde_json::from_value(object)?)
            }
            T::Unknown => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn event_type(&self) -> GatewayEventType {
        use GatewayEventType as T;
        match self {
            Self::CheckoutSessionExpired(_) => T::CheckoutSessionExpired,
            Self::ChargeDisputeFundsWithdrawn(_) => T::ChargeDisputeFundsWithdrawn,
            Self::InvoicePaymentFailed(_) => T::InvoicePaymentFailed,
            Self::InvoicePaymentSucceeded(_) => T::InvoicePaymentSucceeded,
            Self::PaymentIntentSucceeded(_) => T::PaymentIntentSucceeded,
            Self::PaymentIntentCanceled(_) => T::PaymentIntentCanceled,
            Self::PaymentIntentPaymentFailed(_) => T::PaymentIntentPaymentFailed,
            Self::CustomerSubscriptionDeleted(_) => T::CustomerSubscriptionDeleted,
        }
    }
}
