//! Checkout cart: the input to subscription creation.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ClientId, MonitorId};

use super::Recurrence;

/// Role of the client placing the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientRole {
    Client,
    Partner,
    Admin,
}

impl ClientRole {
    /// Partners hosting monitors at their own addresses get a free subscription.
    pub fn is_bonus_eligible(&self) -> bool {
        matches!(self, ClientRole::Partner)
    }
}

/// The ordering client, as seen at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub role: ClientRole,
}

/// A monitor as resolved by the catalog when building the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartMonitor {
    pub monitor_id: MonitorId,
    /// Client owning the address the monitor is installed at.
    pub address_owner: Option<ClientId>,
    pub box_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub monitor: CartMonitor,
    pub slots_quantity: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub client: Client,
    pub recurrence: Recurrence,
    pub items: Vec<CartItem>,
    /// Quoted price in cents for the first period.
    pub amount_cents: i64,
    pub currency: String,
}

impl Cart {
    /// True when the client is a partner and owns every monitor's address.
    pub fn qualifies_for_bonus(&self) -> bool {
        self.client.role.is_bonus_eligible()
            && !self.items.is_empty()
            && self
                .items
                .iter()
                .all(|item| item.monitor.address_owner == Some(self.client.id))
    }
}
