//! PostgreSQL implementation of PaymentRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{
    AuditEntry, DomainError, ErrorCode, PaymentId, SubscriptionId, Timestamp,
};
use crate::domain::payment::{Payment, PaymentPurpose};
use crate::ports::PaymentRepository;

use super::audit::insert_audit;
use super::{db_error, is_unique_violation};

#[derive(Clone)]
pub struct PostgresPaymentRepository {
    pool: PgPool,
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_PAYMENT: &str = r#"
    SELECT id, subscription_id, amount_cents, currency, payment_method, status,
           gateway_reference, purpose, disputed, version, created_at, updated_at
    FROM payments
"#;

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    subscription_id: Uuid,
    amount_cents: i64,
    currency: String,
    payment_method: Option<String>,
    status: String,
    gateway_reference: Option<String>,
    purpose: serde_json::Value,
    disputed: bool,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DomainError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|e: String| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid status for payment {}: {}", row.id, e),
            )
        })?;
        let purpose: PaymentPurpose = serde_json::from_value(row.purpose).map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid purpose for payment {}: {}", row.id, e),
            )
        })?;

        Ok(Payment {
            id: PaymentId::from_uuid(row.id),
            subscription_id: SubscriptionId::from_uuid(row.subscription_id),
            amount_cents: row.amount_cents,
            currency: row.currency,
            payment_method: row.payment_method,
            status,
            gateway_reference: row.gateway_reference,
            purpose,
            disputed: row.disputed,
            version: row.version,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

/// Another writer already created the payment for this gateway reference.
fn duplicate_reference(payment: &Payment) -> DomainError {
    DomainError::new(
        ErrorCode::ConcurrencyConflict,
        format!(
            "Payment for gateway reference {} created concurrently",
            payment.gateway_reference.as_deref().unwrap_or("-")
        ),
    )
    .with_detail("entity", "payment")
}

fn purpose_json(purpose: &PaymentPurpose) -> Result<serde_json::Value, DomainError> {
    serde_json::to_value(purpose).map_err(|e| {
        DomainError::new(
            ErrorCode::InternalError,
            format!("Failed to encode payment purpose: {}", e),
        )
    })
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn create(&self, payment: &Payment, audit: &AuditEntry) -> Result<(), DomainError> {
        let purpose = purpose_json(&payment.purpose)?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, subscription_id, amount_cents, currency, payment_method, status,
                gateway_reference, purpose, disputed, version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.subscription_id.as_uuid())
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(&payment.payment_method)
        .bind(payment.status.as_str())
        .bind(&payment.gateway_reference)
        .bind(&purpose)
        .bind(payment.disputed)
        .bind(payment.version)
        .bind(payment.created_at.as_datetime())
        .bind(payment.updated_at.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                duplicate_reference(payment)
            } else {
                db_error("Failed to insert payment", e)
            }
        })?;

        insert_audit(&mut tx, audit).await?;
        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit payment", e))?;
        Ok(())
    }

    async fn update(&self, payment: &Payment, audit: &AuditEntry) -> Result<i32, DomainError> {
        let purpose = purpose_json(&payment.purpose)?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let new_version: Option<(i32,)> = sqlx::query_as(
            r#"
            UPDATE payments SET
                amount_cents = $3,
                payment_method = $4,
                status = $5,
                gateway_reference = $6,
                purpose = $7,
                disputed = $8,
                updated_at = $9,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING version
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.version)
        .bind(payment.amount_cents)
        .bind(&payment.payment_method)
        .bind(payment.status.as_str())
        .bind(&payment.gateway_reference)
        .bind(&purpose)
        .bind(payment.disputed)
        .bind(payment.updated_at.as_datetime())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to update payment", e))?;

        let Some((new_version,)) = new_version else {
            let (exists,): (bool,) =
                sqlx::query_as("SELECT EXISTS(SELECT 1 FROM payments WHERE id = $1)")
                    .bind(payment.id.as_uuid())
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| db_error("Failed to check payment", e))?;
            return Err(if exists {
                DomainError::concurrency_conflict("payment", payment.id, payment.version)
            } else {
                DomainError::new(
                    ErrorCode::PaymentNotFound,
                    format!("Payment not found: {}", payment.id),
                )
            });
        };

        insert_audit(&mut tx, audit).await?;
        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit payment", e))?;
        Ok(new_version)
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        let sql = format!("{} WHERE id = $1", SELECT_PAYMENT);
        let row: Option<PaymentRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to fetch payment", e))?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_by_gateway_reference(&self, reference: &str) -> Result<Option<Payment>, DomainError> {
        let sql = format!("{} WHERE gateway_reference = $1", SELECT_PAYMENT);
        let row: Option<PaymentRow> = sqlx::query_as(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to fetch payment by reference", e))?;

        row.map(Payment::try_from).transpose()
    }

    async fn list_by_subscription(&self, subscription_id: &SubscriptionId) -> Result<Vec<Payment>, DomainError> {
        let sql = format!("{} WHERE subscription_id = $1 ORDER BY created_at", SELECT_PAYMENT);
        let rows: Vec<PaymentRow> = sqlx::query_as(&sql)
            .bind(subscription_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list payments", e))?;

        rows.into_iter().map(Payment::try_from).collect()
    }
}
