//! Application configuration module
//!
//! Configuration is loaded from environment variables with the
//! `SIGNAGE_BILLING` prefix using the `config` and `dotenvy` crates. Nested
//! values are separated by a double underscore.
//!
//! # Example
//!
//! ```no_run
//! use signage_billing::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod allocation;
mod database;
mod error;
mod payment;
mod redis;
mod server;
mod worker;

pub use allocation::AllocationConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use redis::RedisConfig;
pub use server::{Environment, ServerConfig};
pub use worker::WorkerConfig;

use serde::Deserialize;

/// Root application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub database: DatabaseConfig,

    /// Redis connection and event stream layout
    pub redis: RedisConfig,

    /// Gateway webhook verification
    pub payment: PaymentConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub allocation: AllocationConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// Reads `.env` when present, then every `SIGNAGE_BILLING__*` variable.
    ///
    /// - `SIGNAGE_BILLING__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `SIGNAGE_BILLING__PAYMENT__WEBHOOK_SECRET=whsec_...` -> `payment.webhook_secret`
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("SIGNAGE_BILLING")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration sections.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.redis.validate()?;
        self.payment.validate()?;
        self.worker.validate()?;
        self.allocation.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::env;
    use std::sync::Mutex;

    // Env vars are process-global
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "SIGNAGE_BILLING__DATABASE__URL",
        "SIGNAGE_BILLING__REDIS__URL",
        "SIGNAGE_BILLING__PAYMENT__WEBHOOK_SECRET",
        "SIGNAGE_BILLING__SERVER__PORT",
        "SIGNAGE_BILLING__SERVER__ENVIRONMENT",
        "SIGNAGE_BILLING__WORKER__CONCURRENCY",
        "SIGNAGE_BILLING__ALLOCATION__DEFAULT_MAX_BLOCKS",
        "SIGNAGE_BILLING__REDIS__MAX_DELIVERIES",
    ];

    fn set_minimal_env() {
        env::set_var("SIGNAGE_BILLING__DATABASE__URL", "postgresql://test@localhost/test");
        env::set_var("SIGNAGE_BILLING__REDIS__URL", "redis://localhost:6379");
        env::set_var("SIGNAGE_BILLING__PAYMENT__WEBHOOK_SECRET", "whsec_test");
    }

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.expect("config should load");
        assert_eq!(config.database.url, "postgresql://test@localhost/test");
        assert_eq!(config.redis.url, "redis://localhost:6379");
        assert_eq!(config.payment.webhook_secret.expose_secret(), "whsec_test");
        assert_eq!(config.payment.signature_header, "Stripe-Signature");
    }

    #[test]
    fn test_validate_minimal_config() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        assert!(result.unwrap().validate().is_ok());
    }

    #[test]
    fn test_section_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.environment, Environment::Development);
        assert_eq!(config.worker.concurrency, 4);
        assert_eq!(config.allocation.default_max_blocks, 17);
        assert_eq!(config.redis.consumer_group, "billing-workers");
    }

    #[test]
    fn test_overrides_nested_values() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("SIGNAGE_BILLING__SERVER__ENVIRONMENT", "production");
        env::set_var("SIGNAGE_BILLING__WORKER__CONCURRENCY", "8");
        env::set_var("SIGNAGE_BILLING__ALLOCATION__DEFAULT_MAX_BLOCKS", "24");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(config.is_production());
        assert_eq!(config.worker.concurrency, 8);
        assert_eq!(config.allocation.default_max_blocks, 24);
    }

    #[test]
    fn test_invalid_section_fails_validation() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("SIGNAGE_BILLING__REDIS__MAX_DELIVERIES", "0");
        let result = AppConfig::load();
        clear_env();

        assert_eq!(
            result.unwrap().validate(),
            Err(ValidationError::InvalidMaxDeliveries)
        );
    }

    #[test]
    fn test_missing_webhook_secret_fails_load() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("SIGNAGE_BILLING__DATABASE__URL", "postgresql://test@localhost/test");
        env::set_var("SIGNAGE_BILLING__REDIS__URL", "redis://localhost:6379");
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_err());
    }
}
