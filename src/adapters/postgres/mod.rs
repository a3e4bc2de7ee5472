//! PostgreSQL adapters - Database implementations for the persistence ports.
//!
//! - `PostgresEventStore` - processed-event ledger, uniqueness via primary key
//! - `PostgresSubscriptionRepository` - subscriptions plus their monitor rows
//! - `PostgresPaymentRepository` - payments with JSONB purpose
//! - `PostgresMonitorRepository` - allocation inputs and admin shares
//!
//! Every aggregate write goes through one transaction together with its
//! `audit_log` row.

mod audit;
mod event_store;
mod monitor_repository;
mod payment_repository;
mod subscription_repository;

pub use event_store::PostgresEventStore;
pub use monitor_repository::PostgresMonitorRepository;
pub use payment_repository::PostgresPaymentRepository;
pub use subscription_repository::PostgresSubscriptionRepository;

use sqlx::PgPool;

use crate::config::DatabaseConfig;
use crate::domain::foundation::{DomainError, ErrorCode};

/// Opens the pool and applies pending migrations when configured to.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DomainError> {
    let pool = config
        .pool_options()
        .connect(&config.url)
        .await
        .map_err(|e| db_error("Failed to connect to database", e))?;

    if config.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::DatabaseError,
                    format!("Failed to run migrations: {}", e),
                )
            })?;
        tracing::info!("Database migrations applied");
    }

    Ok(pool)
}

pub(crate) fn db_error(context: &str, e: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("{}: {}", context, e))
}

/// True for Postgres `23505 unique_violation`.
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}
