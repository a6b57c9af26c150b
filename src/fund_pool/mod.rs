//! Fund Pool Ledger
//!
//! A single shared balance administrators can top up or draw down. The
//! balance lives in one keyed row; reads require no authorization, writes
//! require the admin role and keep the balance non-negative.
//!
//! The adjustment is a single conditional `UPDATE ... WHERE value + delta >= 0`
//! executed in the same transaction as the audit append, so concurrent
//! adjustments serialize on the row and cannot lose updates or drive the
//! balance negative.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::{Delta, DomainError, Identity, OperationContext};
use crate::error::AppError;

/// Key of the singleton balance row.
pub const FUND_POOL_KEY: &str = "fund_pool";

/// Safe projection of the last updater.
#[derive(Debug, Clone, Serialize)]
pub struct UpdaterSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// Current state of the fund pool.
#[derive(Debug, Clone, Serialize)]
pub struct FundPoolBalance {
    pub balance: i64,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<UpdaterSummary>,
}

/// Fund Pool Service
#[derive(Debug, Clone)]
pub struct FundPoolService {
    pool: PgPool,
    audit: AuditLogService,
}

impl FundPoolService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            audit: AuditLogService::new(pool.clone()),
            pool,
        }
    }

    /// Current balance, last-updated timestamp, and last updater.
    /// An absent row reads as balance 0 with no update metadata.
    pub async fn get_balance(&self) -> Result<FundPoolBalance, AppError> {
        let row: Option<(i64, DateTime<Utc>, Option<Uuid>)> = sqlx::query_as(
            "SELECT value, updated_at, updated_by FROM fund_pool_settings WHERE key = $1",
        )
        .bind(FUND_POOL_KEY)
        .fetch_optional(&self.pool)
        .await?;

        let Some((balance, updated_at, updated_by)) = row else {
            return Ok(FundPoolBalance {
                balance: 0,
                updated_at: None,
                updated_by: None,
            });
        };

        let updater = match updated_by {
            Some(user_id) => {
                let user: Option<(Uuid, String, String)> =
                    sqlx::query_as("SELECT id, name, email FROM users WHERE id = $1")
                        .bind(user_id)
                        .fetch_optional(&self.pool)
                        .await?;

                user.map(|(id, name, email)| UpdaterSummary { id, name, email })
            }
            None => None,
        };

        Ok(FundPoolBalance {
            balance,
            updated_at: Some(updated_at),
            updated_by: updater,
        })
    }

    /// Apply a signed delta to the balance.
    ///
    /// Requires the admin role. Fails with an insufficient-funds error and no
    /// side effects when the resulting balance would be negative. On success
    /// exactly one balance upsert and one audit entry are committed together,
    /// and the new balance is returned.
    pub async fn apply_delta(
        &self,
        actor: &Identity,
        delta: Delta,
        note: Option<String>,
        context: &OperationContext,
    ) -> Result<i64, AppError> {
        if !actor.is_admin() {
            return Err(AppError::PermissionDenied);
        }

        let mut tx = self.pool.begin().await?;

        // Zero rows means either the row is missing or the delta would
        // overdraw the pool; disambiguate below.
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE fund_pool_settings
            SET value = value + $2, updated_at = NOW(), updated_by = $3
            WHERE key = $1 AND value + $2 >= 0
            RETURNING value
            "#,
        )
        .bind(FUND_POOL_KEY)
        .bind(delta.value())
        .bind(actor.user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let new_balance = match updated {
            Some(value) => value,
            None => {
                let current: Option<i64> =
                    sqlx::query_scalar("SELECT value FROM fund_pool_settings WHERE key = $1")
                        .bind(FUND_POOL_KEY)
                        .fetch_optional(&mut *tx)
                        .await?;

                match current {
                    Some(balance) => {
                        return Err(
                            DomainError::insufficient_funds(balance, delta.value()).into()
                        );
                    }
                    None if !delta.is_credit() => {
                        return Err(DomainError::insufficient_funds(0, delta.value()).into());
                    }
                    None => {
                        // First-ever credit creates the singleton row; the
                        // conflict arm covers a concurrent creator.
                        sqlx::query_scalar(
                            r#"
                            INSERT INTO fund_pool_settings (key, value, updated_at, updated_by)
                            VALUES ($1, $2, NOW(), $3)
                            ON CONFLICT (key) DO UPDATE
                            SET value = fund_pool_settings.value + $2,
                                updated_at = NOW(),
                                updated_by = $3
                            RETURNING value
                            "#,
                        )
                        .bind(FUND_POOL_KEY)
                        .bind(delta.value())
                        .bind(actor.user_id)
                        .fetch_one(&mut *tx)
                        .await?
                    }
                }
            }
        };

        let previous = new_balance - delta.value();

        self.audit
            .log_in_tx(
                &mut tx,
                AuditLogBuilder::new(AuditAction::FundPoolAdjusted)
                    .entity("FundPoolSetting")
                    .changes(&serde_json::json!({
                        "from": previous,
                        "delta": delta.value(),
                        "to": new_balance,
                        "note": note,
                    })),
                context,
            )
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        tx.commit().await?;

        tracing::info!(
            actor = %actor.user_id,
            delta = delta.value(),
            balance = new_balance,
            "Fund pool adjusted"
        );

        Ok(new_balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_balance_serializes_with_nulls() {
        let balance = FundPoolBalance {
            balance: 0,
            updated_at: None,
            updated_by: None,
        };

        let json = serde_json::to_value(&balance).unwrap();
        assert_eq!(json["balance"], 0);
        assert!(json["updated_at"].is_null());
        assert!(json["updated_by"].is_null());
    }

    #[test]
    fn test_updater_summary_projection() {
        let updater = UpdaterSummary {
            id: Uuid::new_v4(),
            name: "Admin".to_string(),
            email: "admin@example.com".to_string(),
        };

        let json = serde_json::to_value(&updater).unwrap();
        // Safe columns only; no role or activity flags leak through.
        assert_eq!(json.as_object().unwrap().len(), 3);
    }
}
