//! Automatic retention and cleanup of monitoring history.
//!
//! Closed uptime and SSL events are kept for `event_data_retention_days`,
//! latency logs for `latency_data_retention_days`. Still-open events are never
//! removed. Cleanup runs once a day as a background task.

use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::database::Database;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 3600);

/// Retention policy for the stored history
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub event_days: u32,
    pub latency_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { event_days: 365, latency_days: 7 }
    }
}

impl From<&AppConfig> for RetentionPolicy {
    fn from(app: &AppConfig) -> Self {
        Self { event_days: app.event_data_retention_days, latency_days: app.latency_data_retention_days }
    }
}

impl RetentionPolicy {
    fn event_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - TimeDelta::days(i64::from(self.event_days))
    }

    fn latency_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - TimeDelta::days(i64::from(self.latency_days))
    }
}

/// Rows removed by one cleanup run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub uptime_events: u64,
    pub ssl_events: u64,
    pub latency_logs: u64,
}

/// Cleanup manager for expired history
pub struct RetentionCleanup {
    database: Arc<dyn Database>,
    policy: RetentionPolicy,
}

impl RetentionCleanup {
    pub fn new(database: Arc<dyn Database>, policy: RetentionPolicy) -> Self {
        Self { database, policy }
    }

    pub async fn cleanup(&self, now: DateTime<Utc>) -> Result<CleanupReport> {
        let event_cutoff = self.policy.event_cutoff(now);
        let latency_cutoff = self.policy.latency_cutoff(now);
        debug!(%event_cutoff, %latency_cutoff, "Starting retention cleanup");

        let report = CleanupReport {
            uptime_events: self.database.delete_uptime_events_before(event_cutoff).await?,
            ssl_events: self.database.delete_ssl_events_before(event_cutoff).await?,
            latency_logs: self.database.delete_latency_logs_before(latency_cutoff).await?,
        };

        info!(
            "Retention cleanup completed: {} uptime events, {} SSL events, {} latency logs deleted",
            report.uptime_events, report.ssl_events, report.latency_logs
        );
        Ok(report)
    }

    /// Start background cleanup task (runs every day, first run immediately)
    pub fn start_periodic_cleanup(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

            loop {
                interval.tick().await;

                if let Err(e) = self.cleanup(Utc::now()).await {
                    warn!("Periodic retention cleanup failed: {e}");
                }
            }
        })
    }
}
