//! Worker pool and background task configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent queue consumers.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Prefix for consumer names; the worker index is appended.
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,

    /// Pause after a transport error before polling again.
    #[serde(default = "default_error_backoff")]
    pub error_backoff_ms: u64,

    #[serde(default = "default_expiry_interval")]
    pub expiry_sweep_interval_secs: u64,

    #[serde(default = "default_expiry_batch")]
    pub expiry_batch_size: u32,
}

impl WorkerConfig {
    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.concurrency == 0 || self.concurrency > 256 {
            return Err(ValidationError::InvalidConcurrency);
        }
        if self.consumer_name.is_empty() {
            return Err(ValidationError::MissingRequired("WORKER__CONSUMER_NAME"));
        }
        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            consumer_name: default_consumer_name(),
            error_backoff_ms: default_error_backoff(),
            expiry_sweep_interval_secs: default_expiry_interval(),
            expiry_batch_size: default_expiry_batch(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_consumer_name() -> String {
    "billing-worker".to_string()
}

fn default_error_backoff() -> u64 {
    1_000
}

fn default_expiry_interval() -> u64 {
    300
}

fn default_expiry_batch() -> u32 {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.expiry_sweep_interval(), Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = WorkerConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidConcurrency));
    }
}
