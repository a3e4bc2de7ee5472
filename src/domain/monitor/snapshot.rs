//! Monitor snapshot used for allocation.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AdId, MonitorId, SubscriptionId};

/// Slots a subscription bought on a monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionMonitor {
    pub subscription_id: SubscriptionId,
    pub monitor_id: MonitorId,
    pub slots_quantity: Option<u32>,
}

/// An ad in a monitor's playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorAd {
    pub ad_id: AdId,
    pub order_index: i32,
    /// Paying subscription behind the ad; `None` for admin ads.
    pub subscription_id: Option<SubscriptionId>,
}

impl MonitorAd {
    /// An ad still linked to a CANCELLED or EXPIRED subscription is not an
    /// admin ad, and its subscription's rows are not among the ACTIVE inputs,
    /// so it takes no blocks at all. Its blocks go back to the admin share.
    pub fn is_admin(&self) -> bool {
        self.subscription_id.is_none()
    }
}

/// Everything the allocator needs to know about one monitor.
///
/// `subscription_monitors` holds rows of ACTIVE subscriptions only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorAllocationInputs {
    pub monitor_id: MonitorId,
    pub max_blocks: Option<u32>,
    pub subscription_monitors: Vec<SubscriptionMonitor>,
    pub ads: Vec<MonitorAd>,
}

impl MonitorAllocationInputs {
    pub fn admin_ads(&self) -> impl Iterator<Item = &MonitorAd> {
        self.ads.iter().filter(|ad| ad.is_admin())
    }

    pub fn admin_ad_count(&self) -> u32 {
        u32::try_from(self.admin_ads().count()).unwrap_or(u32::MAX)
    }
}
