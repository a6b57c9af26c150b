//! Scheduled Jobs
//!
//! Background jobs for periodic maintenance tasks: purging expired sessions
//! and pruning old read notifications.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::interval;

// =========================================================================
// Expired Session Cleanup Job
// =========================================================================

/// Delete sessions whose expiry has passed.
/// Expired sessions are already rejected by the session gate; this keeps the
/// table from growing without bound.
pub async fn cleanup_expired_sessions(pool: &PgPool) -> Result<u64, JobError> {
    let result = sqlx::query(
        r#"
        DELETE FROM sessions
        WHERE expires_at < NOW()
        "#,
    )
    .execute(pool)
    .await?;

    let rows_deleted = result.rows_affected();

    if rows_deleted > 0 {
        tracing::info!(
            rows_deleted = rows_deleted,
            "Cleaned up expired sessions"
        );
    }

    Ok(rows_deleted)
}

// =========================================================================
// Read Notification Pruning Job
// =========================================================================

/// Delete read notifications older than 90 days
pub async fn prune_read_notifications(pool: &PgPool) -> Result<u64, JobError> {
    let result = sqlx::query(
        r#"
        DELETE FROM notifications
        WHERE is_read AND created_at < NOW() - INTERVAL '90 days'
        "#,
    )
    .execute(pool)
    .await?;

    let rows_deleted = result.rows_affected();

    if rows_deleted > 0 {
        tracing::info!(
            rows_deleted = rows_deleted,
            "Pruned old read notifications"
        );
    }

    Ok(rows_deleted)
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval for session cleanup (default: 10 minutes)
    pub session_cleanup_interval: Duration,
    /// Interval for notification pruning (default: 1 hour)
    pub notification_prune_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            session_cleanup_interval: Duration::from_secs(600),
            notification_prune_interval: Duration::from_secs(3600),
        }
    }
}

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler {
    pool: PgPool,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    /// Create a new job scheduler
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            config: JobSchedulerConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(pool: PgPool, config: JobSchedulerConfig) -> Self {
        Self { pool, config }
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the scheduler loop
    async fn run(&self) {
        tracing::info!("Job scheduler started");

        let mut session_interval = interval(self.config.session_cleanup_interval);
        let mut notification_interval = interval(self.config.notification_prune_interval);

        loop {
            tokio::select! {
                _ = session_interval.tick() => {
                    if let Err(e) = cleanup_expired_sessions(&self.pool).await {
                        tracing::error!(error = %e, "Session cleanup failed");
                    }
                }
                _ = notification_interval.tick() => {
                    if let Err(e) = prune_read_notifications(&self.pool).await {
                        tracing::error!(error = %e, "Notification pruning failed");
                    }
                }
            }
        }
    }

    /// Run all maintenance jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match cleanup_expired_sessions(&self.pool).await {
            Ok(count) => report.sessions_purged = count,
            Err(e) => report.errors.push(format!("Session cleanup: {}", e)),
        }

        match prune_read_notifications(&self.pool).await {
            Ok(count) => report.notifications_pruned = count,
            Err(e) => report.errors.push(format!("Notification pruning: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub sessions_purged: u64,
    pub notifications_pruned: u64,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_scheduler_config_default() {
        let config = JobSchedulerConfig::default();
        assert_eq!(config.session_cleanup_interval, Duration::from_secs(600));
        assert_eq!(config.notification_prune_interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_maintenance_report_default() {
        let report = MaintenanceReport::default();
        assert_eq!(report.sessions_purged, 0);
        assert_eq!(report.notifications_pruned, 0);
        assert!(report.errors.is_empty());
    }
}
