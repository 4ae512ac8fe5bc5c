use std::collections::BTreeSet;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Row, params};

use super::models::{
    LatencyLog, Monitor, NewMonitor, NewSslEvent, NewUptimeEvent, SslEventRecord, UptimeEventRecord,
    i64_to_timestamp, integrations_from_column, integrations_to_column, timestamp_to_i64,
};
use crate::integrations::models::IntegrationId;
use crate::pool::{LibsqlManager, LibsqlPool};

/// Monitor store
#[async_trait]
pub trait MonitorRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Monitor>>;

    async fn fetch_all(&self) -> Result<Vec<Monitor>>;

    async fn fetch_by_enabled(&self, enabled: bool) -> Result<Vec<Monitor>>;

    async fn insert_monitor(&self, monitor: &NewMonitor) -> Result<Monitor>;

    /// Persist every mutable field of `monitor`, returning the stored row
    async fn update_monitor(&self, monitor: &Monitor) -> Result<Monitor>;

    /// Returns false when no monitor had this id
    async fn delete_monitor_by_id(&self, id: i64) -> Result<bool>;

    async fn update_integrations(&self, id: i64, integrations: &BTreeSet<IntegrationId>) -> Result<()>;
}

/// Uptime event log with open/close semantics
#[async_trait]
pub trait UptimeEventRepository: Send + Sync {
    async fn insert_uptime_event(&self, event: &NewUptimeEvent) -> Result<UptimeEventRecord>;

    /// The still-open event of a monitor, if any
    async fn get_previous_uptime_event(&self, monitor_id: i64) -> Result<Option<UptimeEventRecord>>;

    async fn end_uptime_event(&self, id: i64, ended_at: DateTime<Utc>) -> Result<()>;

    async fn update_uptime_event(&self, id: i64, error: Option<&str>, updated_at: DateTime<Utc>) -> Result<()>;

    async fn get_uptime_events(&self, monitor_id: i64, limit: Option<usize>) -> Result<Vec<UptimeEventRecord>>;

    /// Delete closed events that ended before `cutoff`
    async fn delete_uptime_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Whether the latest uptime status is UP; `null_as_up` answers for
    /// monitors without any event yet
    async fn is_monitor_up(&self, monitor_id: i64, null_as_up: bool) -> Result<bool> {
        Ok(self
            .get_previous_uptime_event(monitor_id)
            .await?
            .map(|event| event.status == crate::monitoring::types::UptimeStatus::Up)
            .unwrap_or(null_as_up))
    }
}

/// Certificate event log with open/close semantics
#[async_trait]
pub trait SslEventRepository: Send + Sync {
    async fn insert_ssl_event(&self, event: &NewSslEvent) -> Result<SslEventRecord>;

    async fn get_previous_ssl_event(&self, monitor_id: i64) -> Result<Option<SslEventRecord>>;

    async fn end_ssl_event(&self, id: i64, ended_at: DateTime<Utc>) -> Result<()>;

    async fn update_ssl_event(
        &self,
        id: i64,
        error: Option<&str>,
        ssl_valid_until: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn get_ssl_events(&self, monitor_id: i64, limit: Option<usize>) -> Result<Vec<SslEventRecord>>;

    async fn delete_ssl_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait LatencyLogRepository: Send + Sync {
    async fn insert_latency(&self, monitor_id: i64, latency_ms: u64, created_at: DateTime<Utc>) -> Result<()>;

    /// Logs recorded since `since`, newest first
    async fn fetch_latest_latency(&self, monitor_id: i64, since: DateTime<Utc>) -> Result<Vec<LatencyLog>>;

    async fn delete_latency_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn delete_all_latency_logs(&self, monitor_id: i64) -> Result<u64>;
}

/// Everything the engine needs from persistence
pub trait Database:
    MonitorRepository + UptimeEventRepository + SslEventRepository + LatencyLogRepository
{
}

impl<T> Database for T where
    T: MonitorRepository + UptimeEventRepository + SslEventRepository + LatencyLogRepository
{
}

const MONITOR_COLUMNS: &str = "id, name, url, uptime_check_interval, enabled, ssl_check_enabled, \
     request_method, follow_redirects, force_no_cache, latency_history_enabled, \
     ssl_expiry_threshold, integrations, created_at, updated_at";

const UPTIME_EVENT_COLUMNS: &str =
    "id, monitor_id, status, error, started_at, ended_at, updated_at";

const SSL_EVENT_COLUMNS: &str =
    "id, monitor_id, status, error, ssl_valid_until, started_at, ended_at, updated_at";

fn monitor_from_row(row: &Row) -> Result<Monitor> {
    let request_method: String = row.get(6)?;
    let integrations: String = row.get(11)?;

    Ok(Monitor {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        uptime_check_interval: row.get::<i64>(3)? as u64,
        enabled: row.get::<i64>(4)? != 0,
        ssl_check_enabled: row.get::<i64>(5)? != 0,
        request_method: request_method.parse()?,
        follow_redirects: row.get::<i64>(7)? != 0,
        force_no_cache: row.get::<i64>(8)? != 0,
        latency_history_enabled: row.get::<i64>(9)? != 0,
        ssl_expiry_threshold: row.get::<i64>(10)? as u32,
        integrations: integrations_from_column(&integrations),
        created_at: i64_to_timestamp(row.get(12)?),
        updated_at: i64_to_timestamp(row.get(13)?),
    })
}

fn uptime_event_from_row(row: &Row) -> Result<UptimeEventRecord> {
    let status: String = row.get(2)?;

    Ok(UptimeEventRecord {
        id: row.get(0)?,
        monitor_id: row.get(1)?,
        status: status.parse()?,
        error: row.get(3)?,
        started_at: i64_to_timestamp(row.get(4)?),
        ended_at: row.get::<Option<i64>>(5)?.map(i64_to_timestamp),
        updated_at: i64_to_timestamp(row.get(6)?),
    })
}

fn ssl_event_from_row(row: &Row) -> Result<SslEventRecord> {
    let status: String = row.get(2)?;

    Ok(SslEventRecord {
        id: row.get(0)?,
        monitor_id: row.get(1)?,
        status: status.parse()?,
        error: row.get(3)?,
        ssl_valid_until: row.get::<Option<i64>>(4)?.map(i64_to_timestamp),
        started_at: i64_to_timestamp(row.get(5)?),
        ended_at: row.get::<Option<i64>>(6)?.map(i64_to_timestamp),
        updated_at: i64_to_timestamp(row.get(7)?),
    })
}

fn limit_clause(limit: Option<usize>) -> String {
    limit.map(|limit| format!(" LIMIT {limit}")).unwrap_or_default()
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        self.pool.get().await.map_err(|e| anyhow!("Failed to get a database connection: {e}"))
    }

    async fn query_monitors(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<Monitor>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, params).await?;
        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }
        Ok(monitors)
    }
}

#[async_trait]
impl MonitorRepository for DatabaseImpl {
    async fn find_by_id(&self, id: i64) -> Result<Option<Monitor>> {
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ?");
        Ok(self.query_monitors(&sql, params![id]).await?.into_iter().next())
    }

    async fn fetch_all(&self) -> Result<Vec<Monitor>> {
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors ORDER BY id");
        self.query_monitors(&sql, ()).await
    }

    async fn fetch_by_enabled(&self, enabled: bool) -> Result<Vec<Monitor>> {
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE enabled = ? ORDER BY id");
        self.query_monitors(&sql, params![enabled as i64]).await
    }

    async fn insert_monitor(&self, monitor: &NewMonitor) -> Result<Monitor> {
        let conn = self.get_conn().await?;
        let now = Utc::now();
        let stamp = timestamp_to_i64(now);

        conn.execute(
            "INSERT INTO monitors (name, url, uptime_check_interval, enabled, ssl_check_enabled, \
             request_method, follow_redirects, force_no_cache, latency_history_enabled, \
             ssl_expiry_threshold, integrations, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                monitor.name.clone(),
                monitor.url.clone(),
                monitor.uptime_check_interval as i64,
                monitor.enabled as i64,
                monitor.ssl_check_enabled as i64,
                monitor.request_method.as_str(),
                monitor.follow_redirects as i64,
                monitor.force_no_cache as i64,
                monitor.latency_history_enabled as i64,
                monitor.ssl_expiry_threshold as i64,
                integrations_to_column(&monitor.integrations),
                stamp,
                stamp
            ],
        )
        .await?;

        Ok(monitor.clone().into_monitor(conn.last_insert_rowid(), i64_to_timestamp(stamp)))
    }

    async fn update_monitor(&self, monitor: &Monitor) -> Result<Monitor> {
        let conn = self.get_conn().await?;
        let updated_at = i64_to_timestamp(timestamp_to_i64(Utc::now()));

        let affected = conn
            .execute(
                "UPDATE monitors SET name = ?, url = ?, uptime_check_interval = ?, enabled = ?, \
                 ssl_check_enabled = ?, request_method = ?, follow_redirects = ?, force_no_cache = ?, \
                 latency_history_enabled = ?, ssl_expiry_threshold = ?, integrations = ?, updated_at = ? \
                 WHERE id = ?",
                params![
                    monitor.name.clone(),
                    monitor.url.clone(),
                    monitor.uptime_check_interval as i64,
                    monitor.enabled as i64,
                    monitor.ssl_check_enabled as i64,
                    monitor.request_method.as_str(),
                    monitor.follow_redirects as i64,
                    monitor.force_no_cache as i64,
                    monitor.latency_history_enabled as i64,
                    monitor.ssl_expiry_threshold as i64,
                    integrations_to_column(&monitor.integrations),
                    timestamp_to_i64(updated_at),
                    monitor.id
                ],
            )
            .await?;

        if affected == 0 {
            return Err(anyhow!("Monitor with ID {} does not exist", monitor.id));
        }

        Ok(Monitor { updated_at, ..monitor.clone() })
    }

    async fn delete_monitor_by_id(&self, id: i64) -> Result<bool> {
        let conn = self.get_conn().await?;

        // Children first, foreign key enforcement is per connection in SQLite
        for table in ["uptime_events", "ssl_events", "latency_logs"] {
            conn.execute(&format!("DELETE FROM {table} WHERE monitor_id = ?"), params![id]).await?;
        }

        let affected = conn.execute("DELETE FROM monitors WHERE id = ?", params![id]).await?;
        Ok(affected > 0)
    }

    async fn update_integrations(&self, id: i64, integrations: &BTreeSet<IntegrationId>) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE monitors SET integrations = ?, updated_at = ? WHERE id = ?",
            params![integrations_to_column(integrations), timestamp_to_i64(Utc::now()), id],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UptimeEventRepository for DatabaseImpl {
    async fn insert_uptime_event(&self, event: &NewUptimeEvent) -> Result<UptimeEventRecord> {
        let conn = self.get_conn().await?;
        let started_at = timestamp_to_i64(event.started_at);

        conn.execute(
            "INSERT INTO uptime_events (monitor_id, status, error, started_at, updated_at) VALUES (?, ?, ?, ?, ?)",
            params![event.monitor_id, event.status.as_str(), event.error.clone(), started_at, started_at],
        )
        .await?;

        Ok(UptimeEventRecord {
            id: conn.last_insert_rowid(),
            monitor_id: event.monitor_id,
            status: event.status,
            error: event.error.clone(),
            started_at: i64_to_timestamp(started_at),
            ended_at: None,
            updated_at: i64_to_timestamp(started_at),
        })
    }

    async fn get_previous_uptime_event(&self, monitor_id: i64) -> Result<Option<UptimeEventRecord>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {UPTIME_EVENT_COLUMNS} FROM uptime_events \
             WHERE monitor_id = ? AND ended_at IS NULL ORDER BY started_at DESC LIMIT 1"
        );
        let mut rows = conn.query(&sql, params![monitor_id]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(uptime_event_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn end_uptime_event(&self, id: i64, ended_at: DateTime<Utc>) -> Result<()> {
        let conn = self.get_conn().await?;
        let stamp = timestamp_to_i64(ended_at);
        conn.execute(
            "UPDATE uptime_events SET ended_at = ?, updated_at = ? WHERE id = ?",
            params![stamp, stamp, id],
        )
        .await?;
        Ok(())
    }

    async fn update_uptime_event(&self, id: i64, error: Option<&str>, updated_at: DateTime<Utc>) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE uptime_events SET error = ?, updated_at = ? WHERE id = ?",
            params![error.map(str::to_string), timestamp_to_i64(updated_at), id],
        )
        .await?;
        Ok(())
    }

    async fn get_uptime_events(&self, monitor_id: i64, limit: Option<usize>) -> Result<Vec<UptimeEventRecord>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {UPTIME_EVENT_COLUMNS} FROM uptime_events WHERE monitor_id = ? ORDER BY started_at DESC, id DESC{}",
            limit_clause(limit)
        );
        let mut rows = conn.query(&sql, params![monitor_id]).await?;
        let mut events = Vec::new();
        while let Some(row) = rows.next().await? {
            events.push(uptime_event_from_row(&row)?);
        }
        Ok(events)
    }

    async fn delete_uptime_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self.get_conn().await?;
        Ok(conn
            .execute(
                "DELETE FROM uptime_events WHERE ended_at IS NOT NULL AND ended_at < ?",
                params![timestamp_to_i64(cutoff)],
            )
            .await?)
    }
}

#[async_trait]
impl SslEventRepository for DatabaseImpl {
    async fn insert_ssl_event(&self, event: &NewSslEvent) -> Result<SslEventRecord> {
        let conn = self.get_conn().await?;
        let started_at = timestamp_to_i64(event.started_at);

        conn.execute(
            "INSERT INTO ssl_events (monitor_id, status, error, ssl_valid_until, started_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                event.monitor_id,
                event.status.as_str(),
                event.error.clone(),
                event.ssl_valid_until.map(timestamp_to_i64),
                started_at,
                started_at
            ],
        )
        .await?;

        Ok(SslEventRecord {
            id: conn.last_insert_rowid(),
            monitor_id: event.monitor_id,
            status: event.status,
            error: event.error.clone(),
            ssl_valid_until: event.ssl_valid_until.map(|t| i64_to_timestamp(timestamp_to_i64(t))),
            started_at: i64_to_timestamp(started_at),
            ended_at: None,
            updated_at: i64_to_timestamp(started_at),
        })
    }

    async fn get_previous_ssl_event(&self, monitor_id: i64) -> Result<Option<SslEventRecord>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {SSL_EVENT_COLUMNS} FROM ssl_events \
             WHERE monitor_id = ? AND ended_at IS NULL ORDER BY started_at DESC LIMIT 1"
        );
        let mut rows = conn.query(&sql, params![monitor_id]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(ssl_event_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn end_ssl_event(&self, id: i64, ended_at: DateTime<Utc>) -> Result<()> {
        let conn = self.get_conn().await?;
        let stamp = timestamp_to_i64(ended_at);
        conn.execute(
            "UPDATE ssl_events SET ended_at = ?, updated_at = ? WHERE id = ?",
            params![stamp, stamp, id],
        )
        .await?;
        Ok(())
    }

    async fn update_ssl_event(
        &self,
        id: i64,
        error: Option<&str>,
        ssl_valid_until: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE ssl_events SET error = ?, ssl_valid_until = ?, updated_at = ? WHERE id = ?",
            params![
                error.map(str::to_string),
                ssl_valid_until.map(timestamp_to_i64),
                timestamp_to_i64(updated_at),
                id
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_ssl_events(&self, monitor_id: i64, limit: Option<usize>) -> Result<Vec<SslEventRecord>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {SSL_EVENT_COLUMNS} FROM ssl_events WHERE monitor_id = ? ORDER BY started_at DESC, id DESC{}",
            limit_clause(limit)
        );
        let mut rows = conn.query(&sql, params![monitor_id]).await?;
        let mut events = Vec::new();
        while let Some(row) = rows.next().await? {
            events.push(ssl_event_from_row(&row)?);
        }
        Ok(events)
    }

    async fn delete_ssl_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self.get_conn().await?;
        Ok(conn
            .execute(
                "DELETE FROM ssl_events WHERE ended_at IS NOT NULL AND ended_at < ?",
                params![timestamp_to_i64(cutoff)],
            )
            .await?)
    }
}

#[async_trait]
impl LatencyLogRepository for DatabaseImpl {
    async fn insert_latency(&self, monitor_id: i64, latency_ms: u64, created_at: DateTime<Utc>) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO latency_logs (monitor_id, latency, created_at) VALUES (?, ?, ?)",
            params![monitor_id, latency_ms as i64, timestamp_to_i64(created_at)],
        )
        .await?;
        Ok(())
    }

    async fn fetch_latest_latency(&self, monitor_id: i64, since: DateTime<Utc>) -> Result<Vec<LatencyLog>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, monitor_id, latency, created_at FROM latency_logs \
                 WHERE monitor_id = ? AND created_at >= ? ORDER BY created_at DESC, id DESC",
                params![monitor_id, timestamp_to_i64(since)],
            )
            .await?;

        let mut logs = Vec::new();
        while let Some(row) = rows.next().await? {
            logs.push(LatencyLog {
                id: row.get(0)?,
                monitor_id: row.get(1)?,
                latency_ms: row.get::<i64>(2)? as u64,
                created_at: i64_to_timestamp(row.get(3)?),
            });
        }
        Ok(logs)
    }

    async fn delete_latency_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self.get_conn().await?;
        Ok(conn
            .execute("DELETE FROM latency_logs WHERE created_at < ?", params![timestamp_to_i64(cutoff)])
            .await?)
    }

    async fn delete_all_latency_logs(&self, monitor_id: i64) -> Result<u64> {
        let conn = self.get_conn().await?;
        Ok(conn.execute("DELETE FROM latency_logs WHERE monitor_id = ?", params![monitor_id]).await?)
    }
}
