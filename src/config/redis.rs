//! Redis configuration: connection and the event stream layout.

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Redis connection plus the stream the webhook queue lives on.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Stream key every accepted webhook is appended to.
    #[serde(default = "default_stream")]
    pub stream: String,

    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    /// Stream receiving messages that exceeded `max_deliveries`.
    #[serde(default = "default_dead_letter_stream")]
    pub dead_letter_stream: String,

    /// How long a blocking read waits for new messages.
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,

    /// Unacknowledged messages older than this are redelivered.
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: u64,

    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: u32,
}

impl RedisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn block(&self) -> Duration {
        Duration::from_millis(self.block_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::MissingRequired("REDIS_URL"));
        }
        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err(ValidationError::InvalidRedisUrl);
        }
        if self.stream.is_empty()
            || self.dead_letter_stream.is_empty()
            || self.stream == self.dead_letter_stream
        {
            return Err(ValidationError::InvalidStreamKeys);
        }
        if self.max_deliveries == 0 {
            return Err(ValidationError::InvalidMaxDeliveries);
        }
        Ok(())
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: default_timeout(),
            stream: default_stream(),
            consumer_group: default_consumer_group(),
            dead_letter_stream: default_dead_letter_stream(),
            block_ms: default_block_ms(),
            visibility_timeout_secs: default_visibility_timeout(),
            max_deliveries: default_max_deliveries(),
        }
    }
}

fn default_timeout() -> u64 {
    5
}

fn default_stream() -> String {
    "billing:gateway-events".to_string()
}

fn default_consumer_group() -> String {
    "billing-workers".to_string()
}

fn default_dead_letter_stream() -> String {
    "billing:gateway-events:dead".to_string()
}

fn default_block_ms() -> u64 {
    5_000
}

fn default_visibility_timeout() -> u64 {
    60
}

fn default_max_deliveries() -> u32 {
    5
}
