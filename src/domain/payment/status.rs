//! Payment status and the gateway status mapping table.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Cancelled,
    Failed,
}

/// Gateway status string to local status.
///
/// Covers payment-intent, subscription and invoice vocabularies. Anything
/// not listed maps to `Failed`.
const GATEWAY_STATUS_TABLE: &[(&str, PaymentStatus)] = &[
    ("succeeded", PaymentStatus::Completed),
    ("requires_payment_method", PaymentStatus::Failed),
    ("processing", PaymentStatus::Pending),
    ("canceled", PaymentStatus::Cancelled),
    ("active", PaymentStatus::Completed),
    ("incomplete", PaymentStatus::Pending),
    ("incomplete_expired", PaymentStatus::Failed),
    ("past_due", PaymentStatus::Pending),
    ("unpaid", PaymentStatus::Failed),
    ("paid", PaymentStatus::Completed),
    ("open", PaymentStatus::Pending),
    ("void", PaymentStatus::Cancelled),
    ("uncollectible", PaymentStatus::Failed),
];

impl PaymentStatus {
    /// Maps a gateway status through the lookup table.
    pub fn from_gateway(status: &str) -> Self {
        GATEWAY_STATUS_TABLE
            .iter()
            .find(|(name, _)| *name == status)
            .map(|(_, mapped)| *mapped)
            .unwrap_or(PaymentStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Failed => "failed",
        }
    }
}

/// What an invoice event reports, independent of the invoice object.
///
/// The invoice's own `status` lags the event (a failed charge leaves the
/// invoice `open`), so the event type decides and the object status only
/// narrows a failure down to a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceOutcome {
    Paid,
    PaymentFailed,
}

impl InvoiceOutcome {
    pub fn resolve(self, object_status: Option<&str>) -> PaymentStatus {
        match self {
            InvoiceOutcome::Paid => PaymentStatus::Completed,
            InvoiceOutcome::PaymentFailed => match object_status.map(PaymentStatus::from_gateway) {
                Some(PaymentStatus::Cancelled) => PaymentStatus::Cancelled,
                _ => PaymentStatus::Failed,
            },
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

/// Transitions reachable through reconciliation.
///
/// COMPLETED and CANCELLED are final here so stale or out-of-order gateway
/// events cannot move money state backwards. Disputes bypass this table and
/// leave the payment pinned at FAILED (see `Payment::mark_disputed`).
impl StateMachine for PaymentStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, target),
            (Pending, Completed)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (Failed, Pending)
                | (Failed, Completed)
                | (Failed, Cancelled)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use PaymentStatus::*;
        match self {
            Pending => vec![Completed, Cancelled, Failed],
            Failed => vec![Pending, Completed, Cancelled],
            Completed | Cancelled => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PaymentStatus::*;

    #[test]
    fn gateway_table_matches_reference_mapping() {
        let cases = [
            ("succeeded", Completed),
            ("requires_payment_method", Failed),
            ("processing", Pending),
            ("canceled", Cancelled),
            ("active", Completed),
            ("incomplete", Pending),
            ("incomplete_expired", Failed),
            ("past_due", Pending),
            ("unpaid", Failed),
        ];
        for (gateway, expected) in cases {
            assert_eq!(PaymentStatus::from_gateway(gateway), expected, "{}", gateway);
        }
    }

    #[test]
    fn unknown_gateway_status_maps_to_failed() {
        assert_eq!(PaymentStatus::from_gateway("requires_capture"), Failed);
        assert_eq!(PaymentStatus::from_gateway(""), Failed);
        assert_eq!(PaymentStatus::from_gateway("SUCCEEDED"), Failed);
    }

    #[test]
    fn completed_and_cancelled_are_final() {
        assert!(Completed.is_terminal());
        assert!(Cancelled.is_terminal());
        assert!(!Completed.can_transition_to(&Pending));
        assert!(!Completed.can_transition_to(&Failed));
    }

    #[test]
    fn invoice_event_type_decides_outcome() {
        assert_eq!(InvoiceOutcome::PaymentFailed.resolve(Some("open")), Failed);
        assert_eq!(InvoiceOutcome::PaymentFailed.resolve(None), Failed);
        assert_eq!(InvoiceOutcome::PaymentFailed.resolve(Some("paid")), Failed);
        assert_eq!(InvoiceOutcome::PaymentFailed.resolve(Some("void")), Cancelled);
        assert_eq!(InvoiceOutcome::Paid.resolve(Some("open")), Completed);
        assert_eq!(InvoiceOutcome::Paid.resolve(None), Completed);
    }

    #[test]
    fn failed_payment_can_recover() {
        assert!(Failed.can_transition_to(&Completed));
        assert!(Failed.can_transition_to(&Pending));
    }
}
