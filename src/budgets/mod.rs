//! Budget Accessor
//!
//! User-created spending requests with a lifecycle status. Creators edit
//! their budgets only while in DRAFT or PENDING; administrators decide
//! pending budgets and set the allocated amount on approval.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::{DomainError, Identity, OperationContext, Role};
use crate::error::AppError;
use crate::notifications::NotificationService;

/// Budget lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BudgetStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
}

impl BudgetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetStatus::Draft => "DRAFT",
            BudgetStatus::Pending => "PENDING",
            BudgetStatus::Approved => "APPROVED",
            BudgetStatus::Rejected => "REJECTED",
        }
    }

    /// Only budgets still in the creator's hands can be edited.
    pub fn is_editable(&self) -> bool {
        matches!(self, BudgetStatus::Draft | BudgetStatus::Pending)
    }
}

impl fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BudgetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(BudgetStatus::Draft),
            "PENDING" => Ok(BudgetStatus::Pending),
            "APPROVED" => Ok(BudgetStatus::Approved),
            "REJECTED" => Ok(BudgetStatus::Rejected),
            other => Err(format!("Unknown budget status: {}", other)),
        }
    }
}

/// Budget as stored
#[derive(Debug, Clone, Serialize)]
pub struct BudgetRecord {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub allocated_amount: Option<Decimal>,
    pub status: BudgetStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a creator may change while the budget is editable.
#[derive(Debug, Clone, Default)]
pub struct BudgetPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub amount: Option<Decimal>,
}

impl BudgetPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.amount.is_none()
    }

    fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.title.is_some() {
            fields.push("title");
        }
        if self.description.is_some() {
            fields.push("description");
        }
        if self.amount.is_some() {
            fields.push("amount");
        }
        fields
    }
}

/// Budget Service
#[derive(Debug, Clone)]
pub struct BudgetService {
    pool: PgPool,
    audit: AuditLogService,
}

const SELECT_BUDGET: &str = r#"
    SELECT id, title, description, amount, allocated_amount,
           status, created_by, created_at, updated_at
    FROM budgets
    WHERE id = $1
"#;

impl BudgetService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            audit: AuditLogService::new(pool.clone()),
            pool,
        }
    }

    /// Create a budget in DRAFT status.
    pub async fn create(
        &self,
        identity: &Identity,
        title: String,
        description: Option<String>,
        amount: Decimal,
        context: &OperationContext,
    ) -> Result<BudgetRecord, AppError> {
        if title.trim().is_empty() {
            return Err(AppError::InvalidRequest("Title must not be empty".to_string()));
        }
        validate_amount(amount)?;

        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        let row: BudgetRow = sqlx::query_as(
            r#"
            INSERT INTO budgets (id, title, description, amount, status, created_by)
            VALUES ($1, $2, $3, $4, 'DRAFT', $5)
            RETURNING id, title, description, amount, allocated_amount,
                      status, created_by, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&title)
        .bind(&description)
        .bind(amount)
        .bind(identity.user_id)
        .fetch_one(&mut *tx)
        .await?;

        let record = record_from_row(row)?;

        self.audit
            .log_in_tx(
                &mut tx,
                AuditLogBuilder::new(AuditAction::BudgetCreated)
                    .entity("Budget")
                    .entity_id(record.id)
                    .changes(&serde_json::json!({
                        "title": record.title,
                        "amount": record.amount,
                    })),
                context,
            )
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        tx.commit().await?;

        Ok(record)
    }

    /// Fetch one budget; owner-or-admin.
    pub async fn get(&self, id: Uuid, identity: &Identity) -> Result<BudgetRecord, AppError> {
        let row: Option<BudgetRow> = sqlx::query_as(SELECT_BUDGET)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let record = record_from_row(row.ok_or_else(|| AppError::BudgetNotFound(id.to_string()))?)?;

        if !identity.can_access(record.created_by) {
            return Err(AppError::PermissionDenied);
        }

        Ok(record)
    }

    /// Budgets visible to the caller: own rows, or every row for admins.
    pub async fn list(&self, identity: &Identity) -> Result<Vec<BudgetRecord>, AppError> {
        let rows: Vec<BudgetRow> = if identity.is_admin() {
            sqlx::query_as(
                r#"
                SELECT id, title, description, amount, allocated_amount,
                       status, created_by, created_at, updated_at
                FROM budgets
                ORDER BY created_at DESC
                LIMIT 200
                "#,
            )
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as(
                r#"
                SELECT id, title, description, amount, allocated_amount,
                       status, created_by, created_at, updated_at
                FROM budgets
                WHERE created_by = $1
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

    /// Edit a budget through the edit gate: the budget must exist, the
    /// requester must be its creator holding the USER role, and the status
    /// must still be DRAFT or PENDING. Otherwise nothing is mutated.
    pub async fn update(
        &self,
        id: Uuid,
        identity: &Identity,
        patch: BudgetPatch,
        context: &OperationContext,
    ) -> Result<BudgetRecord, AppError> {
        if patch.is_empty() {
            return Err(AppError::InvalidRequest("No fields to update".to_string()));
        }
        if let Some(amount) = patch.amount {
            validate_amount(amount)?;
        }
        if let Some(ref title) = patch.title {
            if title.trim().is_empty() {
                return Err(AppError::InvalidRequest("Title must not be empty".to_string()));
            }
        }

        let mut tx = self.pool.begin().await?;

        let current = self.fetch_for_update(&mut tx, id).await?;
        ensure_editable(&current, identity)?;

        let row: BudgetRow = sqlx::query_as(
            r#"
            UPDATE budgets
            SET title = COALESCE($2, title),
                description = COALESCE($3, description),
                amount = COALESCE($4, amount),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, title, description, amount, allocated_amount,
                      status, created_by, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&patch.title)
        .bind(&patch.description)
        .bind(patch.amount)
        .fetch_one(&mut *tx)
        .await?;

        let record = record_from_row(row)?;

        self.audit
            .log_in_tx(
                &mut tx,
                AuditLogBuilder::new(AuditAction::BudgetUpdated)
                    .entity("Budget")
                    .entity_id(id)
                    .changes(&serde_json::json!({
                        "changed_fields": patch.changed_fields(),
                        "amount": record.amount,
                    })),
                context,
            )
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        tx.commit().await?;

        Ok(record)
    }

    /// Submit a DRAFT budget for review (creator only).
    pub async fn submit(
        &self,
        id: Uuid,
        identity: &Identity,
        context: &OperationContext,
    ) -> Result<BudgetRecord, AppError> {
        let mut tx = self.pool.begin().await?;

        let current = self.fetch_for_update(&mut tx, id).await?;
        ensure_editable(&current, identity)?;

        if current.status != BudgetStatus::Draft {
            return Err(DomainError::InvalidStatusTransition {
                from: current.status.to_string(),
                to: BudgetStatus::Pending.to_string(),
            }
            .into());
        }

        let row: BudgetRow = sqlx::query_as(
            r#"
            UPDATE budgets
            SET status = 'PENDING', updated_at = NOW()
            WHERE id = $1
            RETURNING id, title, description, amount, allocated_amount,
                      status, created_by, created_at, updated_at
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let record = record_from_row(row)?;

        self.audit
            .log_in_tx(
                &mut tx,
                AuditLogBuilder::new(AuditAction::BudgetSubmitted)
                    .entity("Budget")
                    .entity_id(id)
                    .changes(&serde_json::json!({
                        "from": BudgetStatus::Draft,
                        "to": BudgetStatus::Pending,
                    })),
                context,
            )
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        tx.commit().await?;

        Ok(record)
    }

    /// Admin decision on a PENDING budget. Approval sets the allocated
    /// amount (defaulting to the requested amount); the status change, the
    /// audit entry, and the owner notification commit together.
    pub async fn decide(
        &self,
        id: Uuid,
        identity: &Identity,
        approve: bool,
        allocated_amount: Option<Decimal>,
        note: Option<String>,
        context: &OperationContext,
    ) -> Result<BudgetRecord, AppError> {
        if !identity.is_admin() {
            return Err(AppError::PermissionDenied);
        }

        let mut tx = self.pool.begin().await?;

        let current = self.fetch_for_update(&mut tx, id).await?;

        let new_status = if approve {
            BudgetStatus::Approved
        } else {
            BudgetStatus::Rejected
        };

        if current.status != BudgetStatus::Pending {
            return Err(DomainError::InvalidStatusTransition {
                from: current.status.to_string(),
                to: new_status.to_string(),
            }
            .into());
        }

        let allocated = if approve {
            let allocated = allocated_amount.unwrap_or(current.amount);
            validate_amount(allocated)?;
            Some(allocated)
        } else {
            None
        };

        let row: BudgetRow = sqlx::query_as(
            r#"
            UPDATE budgets
            SET status = $2, allocated_amount = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING id, title, description, amount, allocated_amount,
                      status, created_by, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(new_status.as_str())
        .bind(allocated)
        .fetch_one(&mut *tx)
        .await?;

        let record = record_from_row(row)?;

        let action = if approve {
            AuditAction::BudgetApproved
        } else {
            AuditAction::BudgetRejected
        };

        self.audit
            .log_in_tx(
                &mut tx,
                AuditLogBuilder::new(action)
                    .entity("Budget")
                    .entity_id(id)
                    .changes(&serde_json::json!({
                        "from": BudgetStatus::Pending,
                        "to": new_status,
                        "allocated_amount": allocated,
                        "note": note,
                    })),
                context,
            )
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let (title, body) = if approve {
            (
                "Budget approved",
                format!("Your budget '{}' was approved", record.title),
            )
        } else {
            (
                "Budget rejected",
                format!("Your budget '{}' was rejected", record.title),
            )
        };
        NotificationService::notify_in_tx(&mut tx, record.created_by, title, &body).await?;

        tx.commit().await?;

        tracing::info!(budget_id = %id, status = %record.status, "Budget decided");

        Ok(record)
    }

    async fn fetch_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<BudgetRecord, AppError> {
        let row: Option<BudgetRow> = sqlx::query_as(
            r#"
            SELECT id, title, description, amount, allocated_amount,
                   status, created_by, created_at, updated_at
            FROM budgets
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;

        record_from_row(row.ok_or_else(|| AppError::BudgetNotFound(id.to_string()))?)
    }
}

/// The edit gate: creator only, USER role, editable status.
fn ensure_editable(budget: &BudgetRecord, identity: &Identity) -> Result<(), AppError> {
    if identity.role != Role::User {
        return Err(AppError::Forbidden(
            "Budget editing is reserved for the creator".to_string(),
        ));
    }
    if budget.created_by != identity.user_id {
        return Err(AppError::PermissionDenied);
    }
    if !budget.status.is_editable() {
        return Err(DomainError::BudgetNotEditable {
            status: budget.status.to_string(),
        }
        .into());
    }
    Ok(())
}

fn validate_amount(amount: Decimal) -> Result<(), AppError> {
    if amount <= Decimal::ZERO {
        return Err(DomainError::InvalidAmount(format!("must be positive, got {}", amount)).into());
    }
    Ok(())
}

type BudgetRow = (
    Uuid,
    String,
    Option<String>,
    Decimal,
    Option<Decimal>,
    String,
    Uuid,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn record_from_row(row: BudgetRow) -> Result<BudgetRecord, AppError> {
    let (id, title, description, amount, allocated_amount, status, created_by, created_at, updated_at) =
        row;

    let status = status
        .parse::<BudgetStatus>()
        .map_err(AppError::Internal)?;

    Ok(BudgetRecord {
        id,
        title,
        description,
        amount,
        allocated_amount,
        status,
        created_by,
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn budget(status: BudgetStatus, created_by: Uuid) -> BudgetRecord {
        BudgetRecord {
            id: Uuid::new_v4(),
            title: "Office supplies".to_string(),
            description: None,
            amount: dec!(500.00),
            allocated_amount: None,
            status,
            created_by,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            BudgetStatus::Draft,
            BudgetStatus::Pending,
            BudgetStatus::Approved,
            BudgetStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<BudgetStatus>().unwrap(), status);
        }
        assert!("CANCELLED".parse::<BudgetStatus>().is_err());
    }

    #[test]
    fn test_editable_statuses() {
        assert!(BudgetStatus::Draft.is_editable());
        assert!(BudgetStatus::Pending.is_editable());
        assert!(!BudgetStatus::Approved.is_editable());
        assert!(!BudgetStatus::Rejected.is_editable());
    }

    #[test]
    fn test_edit_gate_allows_creator_draft() {
        let creator = Uuid::new_v4();
        let identity = Identity::new(creator, Role::User);

        assert!(ensure_editable(&budget(BudgetStatus::Draft, creator), &identity).is_ok());
        assert!(ensure_editable(&budget(BudgetStatus::Pending, creator), &identity).is_ok());
    }

    #[test]
    fn test_edit_gate_rejects_non_creator() {
        let identity = Identity::new(Uuid::new_v4(), Role::User);
        let result = ensure_editable(&budget(BudgetStatus::Draft, Uuid::new_v4()), &identity);

        assert!(matches!(result, Err(AppError::PermissionDenied)));
    }

    #[test]
    fn test_edit_gate_rejects_admin_role() {
        let creator = Uuid::new_v4();
        let identity = Identity::new(creator, Role::Admin);
        let result = ensure_editable(&budget(BudgetStatus::Draft, creator), &identity);

        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[test]
    fn test_edit_gate_rejects_decided_budget() {
        let creator = Uuid::new_v4();
        let identity = Identity::new(creator, Role::User);
        let result = ensure_editable(&budget(BudgetStatus::Approved, creator), &identity);

        assert!(matches!(
            result,
            Err(AppError::Domain(DomainError::BudgetNotEditable { .. }))
        ));
    }

    #[test]
    fn test_patch_changed_fields() {
        let patch = BudgetPatch {
            title: Some("New title".to_string()),
            description: None,
            amount: Some(dec!(750.00)),
        };

        assert_eq!(patch.changed_fields(), vec!["title", "amount"]);
        assert!(!patch.is_empty());
        assert!(BudgetPatch::default().is_empty());
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(dec!(0.01)).is_ok());
        assert!(validate_amount(Decimal::ZERO).is_err());
        assert!(validate_amount(dec!(-5)).is_err());
    }
}
