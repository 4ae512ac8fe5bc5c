use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::database::Database;
use crate::database::models::{LatencyLog, Monitor, NewMonitor, SslEventRecord, UptimeEventRecord};
use crate::integrations::{IntegrationConfigError, IntegrationId, IntegrationRepository};
use crate::monitoring::types::CheckType;
use crate::monitoring::{CheckScheduler, SchedulingError};
use crate::validation;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Monitor {0} not found")]
    NotFound(i64),
    #[error("Invalid monitor: {0}")]
    Invalid(String),
    #[error(transparent)]
    Integration(#[from] IntegrationConfigError),
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextChecks {
    pub uptime: Option<DateTime<Utc>>,
    pub ssl: Option<DateTime<Utc>>,
}

/// Latency summary over a period, in milliseconds. The aggregates are `None`
/// when latency history is disabled or nothing was recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorStats {
    pub monitor_id: i64,
    pub latency_history_enabled: bool,
    pub average: Option<u64>,
    pub min: Option<u64>,
    pub max: Option<u64>,
    pub p90: Option<u64>,
    pub p95: Option<u64>,
    pub p99: Option<u64>,
    /// Newest first
    pub latency_logs: Vec<LatencyLog>,
}

/// Monitor lifecycle: every mutation keeps the scheduler in step with storage
pub struct MonitorService {
    db: Arc<dyn Database>,
    scheduler: Arc<CheckScheduler>,
    integrations: Arc<IntegrationRepository>,
}

impl MonitorService {
    pub fn new(
        db: Arc<dyn Database>,
        scheduler: Arc<CheckScheduler>,
        integrations: Arc<IntegrationRepository>,
    ) -> Self {
        Self { db, scheduler, integrations }
    }

    fn ensure_configured(&self, ids: &BTreeSet<IntegrationId>) -> Result<(), MonitorError> {
        let configured = self.integrations.configured_integrations();
        match ids.iter().find(|id| !configured.contains_key(*id)) {
            Some(id) => Err(IntegrationConfigError::NonExisting(id.clone()).into()),
            None => Ok(()),
        }
    }

    async fn find(&self, id: i64) -> Result<Monitor, MonitorError> {
        self.db.find_by_id(id).await?.ok_or(MonitorError::NotFound(id))
    }

    pub async fn list(&self) -> Result<Vec<Monitor>, MonitorError> {
        Ok(self.db.fetch_all().await?)
    }

    pub async fn get(&self, id: i64) -> Result<Monitor, MonitorError> {
        self.find(id).await
    }

    /// Persist and schedule a new monitor. If scheduling fails the row is
    /// deleted again and the error returned.
    pub async fn create(&self, new_monitor: NewMonitor) -> Result<Monitor, MonitorError> {
        validation::validate_new_monitor(&new_monitor)
            .to_result()
            .map_err(|e| MonitorError::Invalid(e.to_string()))?;
        self.ensure_configured(&new_monitor.integrations)?;

        let monitor = self.db.insert_monitor(&new_monitor).await?;
        if monitor.enabled {
            if let Err(e) = self.scheduler.create_checks_for_monitor(&monitor) {
                warn!(monitor_id = monitor.id, "Rolling back monitor creation: {e}");
                self.db.delete_monitor_by_id(monitor.id).await?;
                return Err(e.into());
            }
        }

        info!(monitor_id = monitor.id, monitor = %monitor.name, url = %monitor.url, "Monitor created");
        Ok(monitor)
    }

    pub async fn update(&self, monitor: Monitor) -> Result<Monitor, MonitorError> {
        let existing = self.find(monitor.id).await?;
        validation::validate_monitor(&monitor)
            .to_result()
            .map_err(|e| MonitorError::Invalid(e.to_string()))?;
        self.ensure_configured(&monitor.integrations)?;

        let updated = self.db.update_monitor(&monitor).await?;
        if updated.enabled {
            // The old timers are only replaced once scheduling succeeds
            if let Err(e) = self.scheduler.create_checks_for_monitor(&updated) {
                warn!(monitor_id = updated.id, "Rolling back monitor update: {e}");
                self.db.update_monitor(&existing).await?;
                return Err(e.into());
            }
        } else {
            self.scheduler.remove_checks_of_monitor(updated.id);
        }

        if existing.latency_history_enabled && !updated.latency_history_enabled {
            let deleted = self.db.delete_all_latency_logs(updated.id).await?;
            info!(monitor_id = updated.id, "Latency history disabled, {deleted} logs deleted");
        }

        Ok(updated)
    }

    /// Returns false when no such monitor existed
    pub async fn delete(&self, id: i64) -> Result<bool, MonitorError> {
        let deleted = self.db.delete_monitor_by_id(id).await?;
        self.scheduler.remove_checks_of_monitor(id);
        if deleted {
            info!(monitor_id = id, "Monitor deleted");
        }
        Ok(deleted)
    }

    pub async fn next_checks(&self, id: i64) -> Result<NextChecks, MonitorError> {
        let monitor = self.find(id).await?;
        Ok(NextChecks {
            uptime: self.scheduler.get_next_check(CheckType::Uptime, monitor.id),
            ssl: self.scheduler.get_next_check(CheckType::Ssl, monitor.id),
        })
    }

    pub async fn uptime_events(&self, id: i64, limit: Option<usize>) -> Result<Vec<UptimeEventRecord>, MonitorError> {
        let monitor = self.find(id).await?;
        Ok(self.db.get_uptime_events(monitor.id, limit).await?)
    }

    pub async fn ssl_events(&self, id: i64, limit: Option<usize>) -> Result<Vec<SslEventRecord>, MonitorError> {
        let monitor = self.find(id).await?;
        Ok(self.db.get_ssl_events(monitor.id, limit).await?)
    }

    pub async fn monitor_stats(&self, id: i64, period: TimeDelta) -> Result<MonitorStats, MonitorError> {
        let monitor = self.find(id).await?;
        let logs = if monitor.latency_history_enabled {
            self.db.fetch_latest_latency(monitor.id, Utc::now() - period).await?
        } else {
            Vec::new()
        };

        let mut latencies: Vec<u64> = logs.iter().map(|log| log.latency_ms).collect();
        latencies.sort_unstable();

        Ok(MonitorStats {
            monitor_id: monitor.id,
            latency_history_enabled: monitor.latency_history_enabled,
            average: average(&latencies),
            min: latencies.first().copied(),
            max: latencies.last().copied(),
            p90: percentile(&latencies, 0.90),
            p95: percentile(&latencies, 0.95),
            p99: percentile(&latencies, 0.99),
            latency_logs: logs,
        })
    }
}

fn average(values: &[u64]) -> Option<u64> {
    if values.is_empty() {
        return None;
    }
    let sum: u64 = values.iter().sum();
    Some((sum as f64 / values.len() as f64).round() as u64)
}

/// Continuous percentile with linear interpolation over sorted values
fn percentile(sorted: &[u64], fraction: f64) -> Option<u64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = fraction * last as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let low = sorted[lower] as f64;
    let high = sorted[upper.min(last)] as f64;
    Some((low + (high - low) * (rank - lower as f64)).round() as u64)
}
