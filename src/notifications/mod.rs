//! Notification Accessor
//!
//! Per-user notifications with a read flag. The only bulk mutation is the
//! owner marking everything read, which is idempotent.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::AppError;

/// Notification as stored
#[derive(Debug, Clone, Serialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Notification Service
#[derive(Debug, Clone)]
pub struct NotificationService {
    pool: PgPool,
}

impl NotificationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Mark every unread notification of `user_id` as read.
    ///
    /// Returns the number of rows flipped. The `is_read = FALSE` predicate
    /// makes the call idempotent: an immediate second call reports 0.
    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        let updated = result.rows_affected();

        if updated > 0 {
            tracing::debug!(user_id = %user_id, updated, "Notifications marked read");
        }

        Ok(updated)
    }

    /// Notifications of a user, newest first.
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<NotificationRecord>, AppError> {
        let rows: Vec<(Uuid, Uuid, String, String, bool, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, user_id, title, body, is_read, created_at
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT 100
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, user_id, title, body, is_read, created_at)| NotificationRecord {
                id,
                user_id,
                title,
                body,
                is_read,
                created_at,
            })
            .collect())
    }

    /// Insert a notification inside an existing transaction, so it commits
    /// together with the status change that triggered it.
    pub async fn notify_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        title: &str,
        body: &str,
    ) -> Result<Uuid, sqlx::Error> {
        let id = Uuid::new_v4();

        sqlx::query(
            "INSERT INTO notifications (id, user_id, title, body) VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(user_id)
        .bind(title)
        .bind(body)
        .execute(&mut **tx)
        .await?;

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_record_serialization() {
        let record = NotificationRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Budget approved".to_string(),
            body: "Your budget 'Office supplies' was approved".to_string(),
            is_read: false,
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["title"], "Budget approved");
        assert_eq!(json["is_read"], false);
    }
}
