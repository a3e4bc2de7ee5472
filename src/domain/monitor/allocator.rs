//! Ad slot allocation.
//!
//! A monitor shows a fixed number of blocks per loop. Paying subscriptions
//! claim blocks first; whatever is left is shared among the monitor's
//! admin ads (house ads with no paying subscription). The result also gives
//! each admin ad its share of display time per day.
//!
//! The function is pure and deterministic.

use serde::{Deserialize, Serialize};

use super::SubscriptionMonitor;

/// Capacity used when a monitor carries no override.
pub const DEFAULT_MAX_BLOCKS: u32 = 17;

pub const MINUTES_PER_DAY: u32 = 1440;

/// Outcome for every admin ad on one monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminAllocation {
    pub total_subscription_blocks: u32,
    pub remaining_blocks: u32,
    pub blocks_per_admin_ad: u32,
    pub minutes_per_admin_ad: u32,
}

impl AdminAllocation {
    fn nothing(total_subscription_blocks: u32, remaining_blocks: u32) -> Self {
        Self {
            total_subscription_blocks,
            remaining_blocks,
            blocks_per_admin_ad: 0,
            minutes_per_admin_ad: 0,
        }
    }
}

/// Splits a monitor's spare capacity among its admin ads.
///
/// `max_blocks` of `None` falls back to [`DEFAULT_MAX_BLOCKS`]. Rows with no
/// slot quantity count as zero. Each admin ad gets at least one block when
/// any capacity remains, and minutes are rounded half up.
pub fn allocate_admin_blocks(
    max_blocks: Option<u32>,
    subscription_monitors: &[SubscriptionMonitor],
    admin_ad_count: u32,
) -> AdminAllocation {
    allocate_with_day(max_blocks, subscription_monitors, admin_ad_count, MINUTES_PER_DAY)
}

/// Same as [`allocate_admin_blocks`] with a configurable day length.
pub fn allocate_with_day(
    max_blocks: Option<u32>,
    subscription_monitors: &[SubscriptionMonitor],
    admin_ad_count: u32,
    minutes_per_day: u32,
) -> AdminAllocation {
    let max_blocks = max_blocks.unwrap_or(DEFAULT_MAX_BLOCKS);
    let total: u32 = subscription_monitors
        .iter()
        .map(|row| row.slots_quantity.unwrap_or(0))
        .fold(0u32, |acc, slots| acc.saturating_add(slots));
    let remaining = max_blocks.saturating_sub(total);

    if admin_ad_count == 0 || remaining == 0 {
        return AdminAllocation::nothing(total, remaining);
    }

    let per_admin = (remaining / admin_ad_count).max(1);
    let considered = u64::from(total) + u64::from(per_admin) * u64::from(admin_ad_count);
    let minutes = round_half_up(u64::from(per_admin) * u64::from(minutes_per_day), considered);

    AdminAllocation {
        total_subscription_blocks: total,
        remaining_blocks: remaining,
        blocks_per_admin_ad: per_admin,
        minutes_per_admin_ad: u32::try_from(minutes).unwrap_or(u32::MAX),
    }
}

fn round_half_up(numerator: u64, denominator: u64) -> u64 {
    if denominator == 0 {
        return 0;
    }
    (2 * numerator + denominator) / (2 * denominator)
}
