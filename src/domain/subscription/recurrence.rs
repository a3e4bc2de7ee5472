//! Billing recurrence of a subscription.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SECONDS_PER_DAY: i64 = 86_400;

/// How long one paid period lasts.
///
/// Fixed-day tiers have an end date; `Monthly` is open-ended and billed by
/// the gateway every month, so it carries zero days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recurrence {
    ThirtyDays,
    SixtyDays,
    NinetyDays,
    Monthly,
}

impl Recurrence {
    pub const ALL: [Recurrence; 4] = [
        Recurrence::ThirtyDays,
        Recurrence::SixtyDays,
        Recurrence::NinetyDays,
        Recurrence::Monthly,
    ];

    /// Length of one period in days; 0 for `Monthly`.
    pub fn days(&self) -> i64 {
        match self {
            Recurrence::ThirtyDays => 30,
            Recurrence::SixtyDays => 60,
            Recurrence::NinetyDays => 90,
            Recurrence::Monthly => 0,
        }
    }

    /// Length of one period in seconds; 0 for `Monthly`.
    pub fn period_secs(&self) -> i64 {
        self.days() * SECONDS_PER_DAY
    }

    /// True for tiers that end on a computed date.
    pub fn is_fixed_term(&self) -> bool {
        self.days() > 0
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Recurrence::ThirtyDays => "THIRTY_DAYS",
            Recurrence::SixtyDays => "SIXTY_DAYS",
            Recurrence::NinetyDays => "NINETY_DAYS",
            Recurrence::Monthly => "MONTHLY",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Recurrence::ThirtyDays => "30 days",
            Recurrence::SixtyDays => "60 days",
            Recurrence::NinetyDays => "90 days",
            Recurrence::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recurrence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Recurrence::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown recurrence: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_tiers_have_days() {
        assert_eq!(Recurrence::ThirtyDays.days(), 30);
        assert_eq!(Recurrence::SixtyDays.days(), 60);
        assert_eq!(Recurrence::NinetyDays.days(), 90);
        assert!(Recurrence::NinetyDays.is_fixed_term());
    }

    #[test]
    fn monthly_is_open_ended() {
        assert_eq!(Recurrence::Monthly.days(), 0);
        assert_eq!(Recurrence::Monthly.period_secs(), 0);
        assert!(!Recurrence::Monthly.is_fixed_term());
    }

    #[test]
    fn period_is_days_times_86400() {
        assert_eq!(Recurrence::SixtyDays.period_secs(), 5_184_000);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("sixty_days".parse::<Recurrence>().unwrap(), Recurrence::SixtyDays);
        assert_eq!("MONTHLY".parse::<Recurrence>().unwrap(), Recurrence::Monthly);
        assert!("WEEKLY".parse::<Recurrence>().is_err());
    }

    #[test]
    fn serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&Recurrence::NinetyDays).unwrap();
        assert_eq!(json, "\"NINETY_DAYS\"");
    }
}
