use sqlx::{Postgres, Transaction};

use crate::domain::foundation::{AuditEntry, DomainError};

use super::db_error;

/// Appends an audit row inside the caller's transaction.
pub(super) async fn insert_audit(
    tx: &mut Transaction<'_, Postgres>,
    entry: &AuditEntry,
) -> Result<(), DomainError> {
    sqlx::query(
        r#"
        INSERT INTO audit_log (entity_type, entity_id, action, actor, detail, recorded_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&entry.entity_type)
    .bind(entry.entity_id)
    .bind(&entry.action)
    .bind(entry.actor.as_str())
    .bind(&entry.detail)
    .bind(entry.recorded_at.as_datetime())
    .execute(&mut **tx)
    .await
    .map_err(|e| db_error("Failed to write audit entry", e))?;

    Ok(())
}
