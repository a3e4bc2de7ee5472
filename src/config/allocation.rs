//! Ad slot allocation configuration

use serde::Deserialize;

use super::error::ValidationError;
use crate::domain::monitor::{DEFAULT_MAX_BLOCKS, MINUTES_PER_DAY};

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AllocationConfig {
    /// Blocks per loop for monitors without their own capacity.
    #[serde(default = "default_max_blocks")]
    pub default_max_blocks: u32,

    #[serde(default = "default_minutes_per_day")]
    pub minutes_per_day: u32,
}

impl AllocationConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.default_max_blocks == 0 || self.minutes_per_day == 0 {
            return Err(ValidationError::InvalidAllocation);
        }
        Ok(())
    }
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            default_max_blocks: default_max_blocks(),
            minutes_per_day: default_minutes_per_day(),
        }
    }
}

fn default_max_blocks() -> u32 {
    DEFAULT_MAX_BLOCKS
}

fn default_minutes_per_day() -> u32 {
    MINUTES_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_allocator_constants() {
        let config = AllocationConfig::default();
        assert_eq!(config.default_max_blocks, 17);
        assert_eq!(config.minutes_per_day, 1440);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = AllocationConfig {
            default_max_blocks: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidAllocation));
    }
}
