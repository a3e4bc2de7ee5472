//! Recurrence upgrade rule table and its message catalog.
//!
//! | from        | allowed targets                    |
//! |-------------|------------------------------------|
//! | THIRTY_DAYS | SIXTY_DAYS, NINETY_DAYS, MONTHLY   |
//! | SIXTY_DAYS  | NINETY_DAYS, MONTHLY               |
//! | NINETY_DAYS | MONTHLY                            |
//! | MONTHLY     | (none)                             |

use serde::Serialize;
use std::fmt;

use super::Recurrence;

/// Why an upgrade request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UpgradeRejection {
    /// Subscription fails the eligibility gate (bonus, inactive, expired, ...).
    NotEligible,
    /// Another upgrade is waiting for payment.
    AlreadyUpgrading,
    /// Target equals the current recurrence.
    SameRecurrence { current: Recurrence },
    /// Target is not higher than the current recurrence.
    NotAllowed { from: Recurrence, to: Recurrence },
}

impl UpgradeRejection {
    /// Human-readable message for each rejection case.
    pub fn message(&self) -> String {
        match self {
            UpgradeRejection::NotEligible => {
                "This subscription is not eligible for an upgrade".to_string()
            }
            UpgradeRejection::AlreadyUpgrading => {
                "An upgrade is already awaiting payment for this subscription".to_string()
            }
            UpgradeRejection::SameRecurrence { current } => format!(
                "The subscription already uses the {} plan",
                current.display_name()
            ),
            UpgradeRejection::NotAllowed { from, to } => match from {
                Recurrence::SixtyDays => {
                    "A 60-day plan can only be upgraded to 90 days or monthly".to_string()
                }
                Recurrence::NinetyDays => {
                    "A 90-day plan can only be upgraded to monthly".to_string()
                }
                Recurrence::Monthly => "A monthly plan cannot be upgraded".to_string(),
                Recurrence::ThirtyDays => format!(
                    "Cannot upgrade from {} to {}",
                    from.display_name(),
                    to.display_name()
                ),
            },
        }
    }
}

impl fmt::Display for UpgradeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Targets reachable from `from`.
pub fn allowed_targets(from: Recurrence) -> &'static [Recurrence] {
    match from {
        Recurrence::ThirtyDays => &[
            Recurrence::SixtyDays,
            Recurrence::NinetyDays,
            Recurrence::Monthly,
        ],
        Recurrence::SixtyDays => &[Recurrence::NinetyDays, Recurrence::Monthly],
        Recurrence::NinetyDays => &[Recurrence::Monthly],
        Recurrence::Monthly => &[],
    }
}

/// Checks one `from -> to` pair against the rule table.
pub fn check_upgrade(from: Recurrence, to: Recurrence) -> Result<(), UpgradeRejection> {
    if from == to {
        return Err(UpgradeRejection::SameRecurrence { current: from });
    }
    if allowed_targets(from).contains(&to) {
        Ok(())
    } else {
        Err(UpgradeRejection::NotAllowed { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Recurrence::*;

    #[test]
    fn thirty_days_upgrades_to_any_higher_tier() {
        for to in [SixtyDays, NinetyDays, Monthly] {
            assert_eq!(check_upgrade(ThirtyDays, to), Ok(()));
        }
    }

    #[test]
    fn sixty_days_upgrades_to_ninety_or_monthly_only() {
        assert!(check_upgrade(SixtyDays, NinetyDays).is_ok());
        assert!(check_upgrade(SixtyDays, Monthly).is_ok());
        assert_eq!(
            check_upgrade(SixtyDays, ThirtyDays),
            Err(UpgradeRejection::NotAllowed { from: SixtyDays, to: ThirtyDays })
        );
    }

    #[test]
    fn ninety_days_upgrades_to_monthly_only() {
        assert!(check_upgrade(NinetyDays, Monthly).is_ok());
        assert!(check_upgrade(NinetyDays, SixtyDays).is_err());
        assert!(check_upgrade(NinetyDays, ThirtyDays).is_err());
    }

    #[test]
    fn same_recurrence_is_rejected() {
        for r in Recurrence::ALL {
            assert_eq!(
                check_upgrade(r, r),
                Err(UpgradeRejection::SameRecurrence { current: r })
            );
        }
    }

    #[test]
    fn monthly_has_no_targets() {
        assert!(allowed_targets(Monthly).is_empty());
        let err = check_upgrade(Monthly, NinetyDays).unwrap_err();
        assert_eq!(err.message(), "A monthly plan cannot be upgraded");
    }

    #[test]
    fn catalog_messages_name_the_rule() {
        let err = check_upgrade(SixtyDays, ThirtyDays).unwrap_err();
        assert!(err.message().contains("60-day plan"));

        let err = check_upgrade(NinetyDays, NinetyDays).unwrap_err();
        assert_eq!(err.to_string(), "The subscription already uses the 90 days plan");
    }
}
