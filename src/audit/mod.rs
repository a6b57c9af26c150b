//! Audit Log Service
//!
//! Append-only record of every mutating action: actor, action kind, affected
//! entity, and a structured changes payload. Rows are never updated or
//! deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use std::net::IpAddr;
use uuid::Uuid;

use crate::domain::OperationContext;

/// Audit log entry as stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub entity: Option<String>,
    pub entity_id: Option<Uuid>,
    pub changes: Option<serde_json::Value>,
    pub correlation_id: Option<Uuid>,
    pub client_ip: Option<IpAddr>,
    pub created_at: DateTime<Utc>,
}

/// Audit action types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    FundPoolAdjusted,
    BudgetCreated,
    BudgetUpdated,
    BudgetSubmitted,
    BudgetApproved,
    BudgetRejected,
    RemittanceCreated,
    RemittanceApproved,
    RemittanceRejected,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::FundPoolAdjusted => "fund_pool.adjusted",
            AuditAction::BudgetCreated => "budget.created",
            AuditAction::BudgetUpdated => "budget.updated",
            AuditAction::BudgetSubmitted => "budget.submitted",
            AuditAction::BudgetApproved => "budget.approved",
            AuditAction::BudgetRejected => "budget.rejected",
            AuditAction::RemittanceCreated => "remittance.created",
            AuditAction::RemittanceApproved => "remittance.approved",
            AuditAction::RemittanceRejected => "remittance.rejected",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Builder for creating audit log entries
#[derive(Debug, Clone)]
pub struct AuditLogBuilder {
    action: String,
    entity: Option<String>,
    entity_id: Option<Uuid>,
    changes: Option<serde_json::Value>,
}

impl AuditLogBuilder {
    /// Create a new audit log builder
    pub fn new(action: AuditAction) -> Self {
        Self {
            action: action.as_str().to_string(),
            entity: None,
            entity_id: None,
            changes: None,
        }
    }

    /// Create with custom action string
    pub fn custom(action: &str) -> Self {
        Self {
            action: action.to_string(),
            entity: None,
            entity_id: None,
            changes: None,
        }
    }

    /// Set the entity kind
    pub fn entity(mut self, entity: &str) -> Self {
        self.entity = Some(entity.to_string());
        self
    }

    /// Set the entity ID
    pub fn entity_id(mut self, entity_id: Uuid) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    /// Set the changes payload
    pub fn changes<T: Serialize>(mut self, changes: &T) -> Self {
        self.changes = serde_json::to_value(changes).ok();
        self
    }
}

/// Audit Log Service
#[derive(Debug, Clone)]
pub struct AuditLogService {
    pool: PgPool,
}

const INSERT_AUDIT_LOG: &str = r#"
    INSERT INTO audit_logs (
        id, user_id, action, entity, entity_id,
        changes, correlation_id, client_ip
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    RETURNING id
"#;

impl AuditLogService {
    /// Create a new AuditLogService
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Write an audit log entry
    pub async fn log(
        &self,
        builder: AuditLogBuilder,
        context: &OperationContext,
    ) -> Result<Uuid, AuditLogError> {
        let id = Uuid::new_v4();

        let result: (Uuid,) = sqlx::query_as(INSERT_AUDIT_LOG)
            .bind(id)
            .bind(context.user_id)
            .bind(&builder.action)
            .bind(&builder.entity)
            .bind(builder.entity_id)
            .bind(&builder.changes)
            .bind(context.correlation_id)
            .bind(context.client_ip.map(|ip| ip.to_string()))
            .fetch_one(&self.pool)
            .await?;

        tracing::debug!(
            audit_id = %result.0,
            action = %builder.action,
            "Audit log entry created"
        );

        Ok(result.0)
    }

    /// Write an audit log entry inside an existing transaction, so the entry
    /// commits or rolls back together with the mutation it records.
    pub async fn log_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        builder: AuditLogBuilder,
        context: &OperationContext,
    ) -> Result<Uuid, AuditLogError> {
        let id = Uuid::new_v4();

        let result: (Uuid,) = sqlx::query_as(INSERT_AUDIT_LOG)
            .bind(id)
            .bind(context.user_id)
            .bind(&builder.action)
            .bind(&builder.entity)
            .bind(builder.entity_id)
            .bind(&builder.changes)
            .bind(context.correlation_id)
            .bind(context.client_ip.map(|ip| ip.to_string()))
            .fetch_one(&mut **tx)
            .await?;

        Ok(result.0)
    }

    /// Get recent audit logs
    pub async fn get_recent(&self, limit: i64) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        let entries: Vec<AuditRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, action, entity, entity_id,
                   changes, correlation_id, client_ip, created_at
            FROM audit_logs
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries.into_iter().map(entry_from_row).collect())
    }

    /// Get audit logs for a specific acting user
    pub async fn get_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        let entries: Vec<AuditRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, action, entity, entity_id,
                   changes, correlation_id, client_ip, created_at
            FROM audit_logs
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries.into_iter().map(entry_from_row).collect())
    }
}

type AuditRow = (
    Uuid,
    Option<Uuid>,
    String,
    Option<String>,
    Option<Uuid>,
    Option<serde_json::Value>,
    Option<Uuid>,
    Option<String>,
    DateTime<Utc>,
);

fn entry_from_row(row: AuditRow) -> AuditLogEntry {
    let (id, user_id, action, entity, entity_id, changes, correlation_id, client_ip, created_at) =
        row;

    AuditLogEntry {
        id,
        user_id,
        action,
        entity,
        entity_id,
        changes,
        correlation_id,
        client_ip: client_ip.and_then(|s| s.parse().ok()),
        created_at,
    }
}

/// Audit log errors
#[derive(Debug, thiserror::Error)]
pub enum AuditLogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
