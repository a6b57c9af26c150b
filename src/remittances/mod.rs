//! Remittance Accessor
//!
//! User-submitted requests to send funds, tracked with a status. Admin
//! approval records a transaction row for the owner in the same database
//! transaction as the status flip.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::{DomainError, Identity, OperationContext};
use crate::error::AppError;
use crate::notifications::NotificationService;
use crate::transactions::TransactionService;

/// Remittance lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemittanceStatus {
    Pending,
    Approved,
    Rejected,
}

impl RemittanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemittanceStatus::Pending => "PENDING",
            RemittanceStatus::Approved => "APPROVED",
            RemittanceStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for RemittanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RemittanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RemittanceStatus::Pending),
            "APPROVED" => Ok(RemittanceStatus::Approved),
            "REJECTED" => Ok(RemittanceStatus::Rejected),
            other => Err(format!("Unknown remittance status: {}", other)),
        }
    }
}

/// Remittance as stored
#[derive(Debug, Clone, Serialize)]
pub struct RemittanceRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub status: RemittanceStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Remittance Service
#[derive(Debug, Clone)]
pub struct RemittanceService {
    pool: PgPool,
    audit: AuditLogService,
}

impl RemittanceService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            audit: AuditLogService::new(pool.clone()),
            pool,
        }
    }

    /// Submit a remittance request in PENDING status.
    pub async fn create(
        &self,
        identity: &Identity,
        amount: Decimal,
        note: Option<String>,
        context: &OperationContext,
    ) -> Result<RemittanceRecord, AppError> {
        if amount <= Decimal::ZERO {
            return Err(
                DomainError::InvalidAmount(format!("must be positive, got {}", amount)).into(),
            );
        }

        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        let row: RemittanceRow = sqlx::query_as(
            r#"
            INSERT INTO remittances (id, user_id, amount, status, note)
            VALUES ($1, $2, $3, 'PENDING', $4)
            RETURNING id, user_id, amount, status, note, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(identity.user_id)
        .bind(amount)
        .bind(&note)
        .fetch_one(&mut *tx)
        .await?;

        let record = record_from_row(row)?;

        self.audit
            .log_in_tx(
                &mut tx,
                AuditLogBuilder::new(AuditAction::RemittanceCreated)
                    .entity("Remittance")
                    .entity_id(record.id)
                    .changes(&serde_json::json!({
                        "amount": record.amount,
                        "note": record.note,
                    })),
                context,
            )
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        tx.commit().await?;

        Ok(record)
    }

    /// Fetch one remittance; owner-or-admin.
    pub async fn get(&self, id: Uuid, identity: &Identity) -> Result<RemittanceRecord, AppError> {
        let row: Option<RemittanceRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, amount, status, note, created_at, updated_at
            FROM remittances
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let record =
            record_from_row(row.ok_or_else(|| AppError::RemittanceNotFound(id.to_string()))?)?;

        if !identity.can_access(record.user_id) {
            return Err(AppError::PermissionDenied);
        }

        Ok(record)
    }

    /// Remittances visible to the caller: own rows, or every row for admins.
    pub async fn list(&self, identity: &Identity) -> Result<Vec<RemittanceRecord>, AppError> {
        let rows: Vec<RemittanceRow> = if identity.is_admin() {
            sqlx::query_as(
                r#"
                SELECT id, user_id, amount, status, note, created_at, updated_at
                FROM remittances
                ORDER BY created_at DESC
                LIMIT 200
                "#,
            )
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as(
                r#"
                SELECT id, user_id, amount, status, note, created_at, updated_at
                FROM remittances
                WHERE user_id = $1
                ORDER BY created_at DESC
                LIMIT 200
                "#,
            )
            .bind(identity.user_id)
            .fetch_all(&self.pool)
            .await?
        };

        rows.into_iter().map(record_from_row).collect()
    }

    /// Admin decision on a PENDING remittance. Approval records one
    /// transaction row for the owner; status flip, transaction, audit entry,
    /// and owner notification commit together.
    pub async fn decide(
        &self,
        id: Uuid,
        identity: &Identity,
        approve: bool,
        note: Option<String>,
        context: &OperationContext,
    ) -> Result<RemittanceRecord, AppError> {
        if !identity.is_admin() {
            return Err(AppError::PermissionDenied);
        }

        let mut tx = self.pool.begin().await?;

        let current = self.fetch_for_update(&mut tx, id).await?;

        let new_status = if approve {
            RemittanceStatus::Approved
        } else {
            RemittanceStatus::Rejected
        };

        if current.status != RemittanceStatus::Pending {
            return Err(DomainError::InvalidStatusTransition {
                from: current.status.to_string(),
                to: new_status.to_string(),
            }
            .into());
        }

        let row: RemittanceRow = sqlx::query_as(
            r#"
            UPDATE remittances
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, user_id, amount, status, note, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(new_status.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let record = record_from_row(row)?;

        let transaction_id = if approve {
            let description = note
                .clone()
                .or_else(|| current.note.clone())
                .unwrap_or_else(|| "Remittance payout".to_string());

            Some(
                TransactionService::record_in_tx(
                    &mut tx,
                    record.user_id,
                    None,
                    record.amount,
                    "REMITTANCE",
                    Some(&description),
                )
                .await?,
            )
        } else {
            None
        };

        let action = if approve {
            AuditAction::RemittanceApproved
        } else {
            AuditAction::RemittanceRejected
        };

        self.audit
            .log_in_tx(
                &mut tx,
                AuditLogBuilder::new(action)
                    .entity("Remittance")
                    .entity_id(id)
                    .changes(&serde_json::json!({
                        "from": RemittanceStatus::Pending,
                        "to": new_status,
                        "amount": record.amount,
                        "transaction_id": transaction_id,
                        "note": note,
                    })),
                context,
            )
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let (title, body) = if approve {
            (
                "Remittance approved",
                format!("Your remittance of {} was approved", record.amount),
            )
        } else {
            (
                "Remittance rejected",
                format!("Your remittance of {} was rejected", record.amount),
            )
        };
        NotificationService::notify_in_tx(&mut tx, record.user_id, title, &body).await?;

        tx.commit().await?;

        tracing::info!(remittance_id = %id, status = %record.status, "Remittance decided");

        Ok(record)
    }

    async fn fetch_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<RemittanceRecord, AppError> {
        let row: Option<RemittanceRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, amount, status, note, created_at, updated_at
            FROM remittances
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;

        record_from_row(row.ok_or_else(|| AppError::RemittanceNotFound(id.to_string()))?)
    }
}

type RemittanceRow = (
    Uuid,
    Uuid,
    Decimal,
    String,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn record_from_row(row: RemittanceRow) -> Result<RemittanceRecord, AppError> {
    let (id, user_id, amount, status, note, created_at, updated_at) = row;

    let status = status
        .parse::<RemittanceStatus>()
        .map_err(AppError::Internal)?;

    Ok(RemittanceRecord {
        id,
        user_id,
        amount,
        status,
        note,
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            RemittanceStatus::Pending,
            RemittanceStatus::Approved,
            RemittanceStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<RemittanceStatus>().unwrap(), status);
        }
        assert!("PAID".parse::<RemittanceStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_as_canonical_string() {
        assert_eq!(
            serde_json::to_string(&RemittanceStatus::Approved).unwrap(),
            "\"APPROVED\""
        );
    }
}
