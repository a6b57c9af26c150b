//! Transaction Accessor
//!
//! Transactions are read-only in the API surface; rows are written when a
//! remittance is approved. Access is restricted to the owning user or an
//! admin, with safe column projections for the joined user and budget.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::Identity;
use crate::error::AppError;

/// Safe projection of the owning user.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// Safe projection of the related budget.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetSummary {
    pub id: Uuid,
    pub title: String,
    pub status: String,
}

/// A transaction with its owning user and optional budget.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionDetail {
    pub id: Uuid,
    pub user_id: Uuid,
    pub budget_id: Option<Uuid>,
    pub amount: Decimal,
    pub transaction_type: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub user: UserSummary,
    pub budget: Option<BudgetSummary>,
}

/// Transaction row without the joined projections, used by listings.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionSummary {
    pub id: Uuid,
    pub user_id: Uuid,
    pub budget_id: Option<Uuid>,
    pub amount: Decimal,
    pub transaction_type: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Transaction Service
#[derive(Debug, Clone)]
pub struct TransactionService {
    pool: PgPool,
}

impl TransactionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch one transaction with user and budget projections.
    ///
    /// An absent row is NotFound; a requester that is neither admin nor the
    /// owner is rejected only after existence is established.
    pub async fn get_by_id(
        &self,
        id: Uuid,
        identity: &Identity,
    ) -> Result<TransactionDetail, AppError> {
        let row: Option<DetailRow> = sqlx::query_as(
            r#"
            SELECT
                t.id, t.user_id, t.budget_id, t.amount,
                t.transaction_type, t.description, t.created_at,
                u.name, u.email,
                b.title, b.status
            FROM transactions t
            JOIN users u ON u.id = t.user_id
            LEFT JOIN budgets b ON b.id = t.budget_id
            WHERE t.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let (
            id,
            user_id,
            budget_id,
            amount,
            transaction_type,
            description,
            created_at,
            user_name,
            user_email,
            budget_title,
            budget_status,
        ) = row.ok_or_else(|| AppError::TransactionNotFound(id.to_string()))?;

        if !identity.can_access(user_id) {
            return Err(AppError::PermissionDenied);
        }

        let budget = match (budget_id, budget_title, budget_status) {
            (Some(budget_id), Some(title), Some(status)) => Some(BudgetSummary {
                id: budget_id,
                title,
                status,
            }),
            _ => None,
        };

        Ok(TransactionDetail {
            id,
            user_id,
            budget_id,
            amount,
            transaction_type,
            description,
            created_at,
            user: UserSummary {
                id: user_id,
                name: user_name,
                email: user_email,
            },
            budget,
        })
    }

    /// Transactions visible to the caller: own rows, or every row for admins.
    pub async fn list(
        &self,
        identity: &Identity,
        limit: i64,
    ) -> Result<Vec<TransactionSummary>, AppError> {
        let limit = limit.min(1000);

        let rows: Vec<SummaryRow> = if identity.is_admin() {
            sqlx::query_as(
                r#"
                SELECT id, user_id, budget_id, amount, transaction_type, description, created_at
                FROM transactions
                ORDER BY created_at DESC
                LIMIT $1
                "#,
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as(
                r#"
                SELECT id, user_id, budget_id, amount, transaction_type, description, created_at
                FROM transactions
                WHERE user_id = $1
                ORDER BY created_at DESC
                LIMIT $2
                "#,
            )
            .bind(identity.user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(rows
            .into_iter()
            .map(
                |(id, user_id, budget_id, amount, transaction_type, description, created_at)| {
                    TransactionSummary {
                        id,
                        user_id,
                        budget_id,
                        amount,
                        transaction_type,
                        description,
                        created_at,
                    }
                },
            )
            .collect())
    }

    /// Record a transaction inside an existing transaction block, so the row
    /// commits together with the approval that produced it.
    pub async fn record_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        budget_id: Option<Uuid>,
        amount: Decimal,
        transaction_type: &str,
        description: Option<&str>,
    ) -> Result<Uuid, sqlx::Error> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO transactions (id, user_id, budget_id, amount, transaction_type, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(budget_id)
        .bind(amount)
        .bind(transaction_type)
        .bind(description)
        .execute(&mut **tx)
        .await?;

        Ok(id)
    }
}

type DetailRow = (
    Uuid,
    Uuid,
    Option<Uuid>,
    Decimal,
    String,
    Option<String>,
    DateTime<Utc>,
    String,
    String,
    Option<String>,
    Option<String>,
);

type SummaryRow = (
    Uuid,
    Uuid,
    Option<Uuid>,
    Decimal,
    String,
    Option<String>,
    DateTime<Utc>,
);

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_transaction_detail_serialization() {
        let user_id = Uuid::new_v4();
        let detail = TransactionDetail {
            id: Uuid::new_v4(),
            user_id,
            budget_id: None,
            amount: dec!(120.50),
            transaction_type: "REMITTANCE".to_string(),
            description: Some("Payout".to_string()),
            created_at: Utc::now(),
            user: UserSummary {
                id: user_id,
                name: "Alice".to_string(),
                email: "alice@example.com".to_string(),
            },
            budget: None,
        };

        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["amount"], "120.50");
        assert_eq!(json["user"]["name"], "Alice");
        assert!(json["budget"].is_null());
    }
}
