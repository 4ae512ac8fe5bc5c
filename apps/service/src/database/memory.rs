//! In-process store used by engine tests.

use std::collections::BTreeSet;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{
    LatencyLog, Monitor, NewMonitor, NewSslEvent, NewUptimeEvent, SslEventRecord, UptimeEventRecord,
};
use super::repository::{
    LatencyLogRepository, MonitorRepository, SslEventRepository, UptimeEventRepository,
};
use crate::integrations::models::IntegrationId;

#[derive(Default)]
struct State {
    next_id: i64,
    monitors: Vec<Monitor>,
    uptime_events: Vec<UptimeEventRecord>,
    ssl_events: Vec<SslEventRecord>,
    latency_logs: Vec<LatencyLog>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uptime_events(&self, monitor_id: i64) -> Vec<UptimeEventRecord> {
        let state = self.state.lock().unwrap();
        state.uptime_events.iter().filter(|e| e.monitor_id == monitor_id).cloned().collect()
    }

    pub fn ssl_events(&self, monitor_id: i64) -> Vec<SslEventRecord> {
        let state = self.state.lock().unwrap();
        state.ssl_events.iter().filter(|e| e.monitor_id == monitor_id).cloned().collect()
    }

    pub fn latency_logs(&self, monitor_id: i64) -> Vec<LatencyLog> {
        let state = self.state.lock().unwrap();
        state.latency_logs.iter().filter(|l| l.monitor_id == monitor_id).cloned().collect()
    }
}

#[async_trait]
impl MonitorRepository for MemoryDatabase {
    async fn find_by_id(&self, id: i64) -> Result<Option<Monitor>> {
        Ok(self.state.lock().unwrap().monitors.iter().find(|m| m.id == id).cloned())
    }

    async fn fetch_all(&self) -> Result<Vec<Monitor>> {
        Ok(self.state.lock().unwrap().monitors.clone())
    }

    async fn fetch_by_enabled(&self, enabled: bool) -> Result<Vec<Monitor>> {
        let state = self.state.lock().unwrap();
        Ok(state.monitors.iter().filter(|m| m.enabled == enabled).cloned().collect())
    }

    async fn insert_monitor(&self, monitor: &NewMonitor) -> Result<Monitor> {
        let mut state = self.state.lock().unwrap();
        if state.monitors.iter().any(|m| m.name == monitor.name) {
            return Err(anyhow!("UNIQUE constraint failed: monitors.name"));
        }
        let id = state.next_id();
        let inserted = monitor.clone().into_monitor(id, Utc::now());
        state.monitors.push(inserted.clone());
        Ok(inserted)
    }

    async fn update_monitor(&self, monitor: &Monitor) -> Result<Monitor> {
        let mut state = self.state.lock().unwrap();
        let stored = state
            .monitors
            .iter_mut()
            .find(|m| m.id == monitor.id)
            .ok_or_else(|| anyhow!("Monitor with ID {} does not exist", monitor.id))?;
        *stored = Monitor { updated_at: Utc::now(), ..monitor.clone() };
        Ok(stored.clone())
    }

    async fn delete_monitor_by_id(&self, id: i64) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let before = state.monitors.len();
        state.monitors.retain(|m| m.id != id);
        state.uptime_events.retain(|e| e.monitor_id != id);
        state.ssl_events.retain(|e| e.monitor_id != id);
        state.latency_logs.retain(|l| l.monitor_id != id);
        Ok(state.monitors.len() != before)
    }

    async fn update_integrations(&self, id: i64, integrations: &BTreeSet<IntegrationId>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(monitor) = state.monitors.iter_mut().find(|m| m.id == id) {
            monitor.integrations = integrations.clone();
        }
        Ok(())
    }
}

#[async_trait]
impl UptimeEventRepository for MemoryDatabase {
    async fn insert_uptime_event(&self, event: &NewUptimeEvent) -> Result<UptimeEventRecord> {
        let mut state = self.state.lock().unwrap();
        if state.uptime_events.iter().any(|e| e.monitor_id == event.monitor_id && e.ended_at.is_none()) {
            return Err(anyhow!("UNIQUE constraint failed: open uptime event"));
        }
        let record = UptimeEventRecord {
            id: state.next_id(),
            monitor_id: event.monitor_id,
            status: event.status,
            error: event.error.clone(),
            started_at: event.started_at,
            ended_at: None,
            updated_at: event.started_at,
        };
        state.uptime_events.push(record.clone());
        Ok(record)
    }

    async fn get_previous_uptime_event(&self, monitor_id: i64) -> Result<Option<UptimeEventRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .uptime_events
            .iter()
            .find(|e| e.monitor_id == monitor_id && e.ended_at.is_none())
            .cloned())
    }

    async fn end_uptime_event(&self, id: i64, ended_at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(event) = state.uptime_events.iter_mut().find(|e| e.id == id) {
            event.ended_at = Some(ended_at);
            event.updated_at = ended_at;
        }
        Ok(())
    }

    async fn update_uptime_event(&self, id: i64, error: Option<&str>, updated_at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(event) = state.uptime_events.iter_mut().find(|e| e.id == id) {
            event.error = error.map(str::to_string);
            event.updated_at = updated_at;
        }
        Ok(())
    }

    async fn get_uptime_events(&self, monitor_id: i64, limit: Option<usize>) -> Result<Vec<UptimeEventRecord>> {
        let mut events = self.uptime_events(monitor_id);
        events.reverse();
        events.truncate(limit.unwrap_or(usize::MAX));
        Ok(events)
    }

    async fn delete_uptime_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let before = state.uptime_events.len();
        state.uptime_events.retain(|e| e.ended_at.is_none_or(|ended| ended >= cutoff));
        Ok((before - state.uptime_events.len()) as u64)
    }
}

#[async_trait]
impl SslEventRepository for MemoryDatabase {
    async fn insert_ssl_event(&self, event: &NewSslEvent) -> Result<SslEventRecord> {
        let mut state = self.state.lock().unwrap();
        if state.ssl_events.iter().any(|e| e.monitor_id == event.monitor_id && e.ended_at.is_none()) {
            return Err(anyhow!("UNIQUE constraint failed: open ssl event"));
        }
        let record = SslEventRecord {
            id: state.next_id(),
            monitor_id: event.monitor_id,
            status: event.status,
            error: event.error.clone(),
            ssl_valid_until: event.ssl_valid_until,
            started_at: event.started_at,
            ended_at: None,
            updated_at: event.started_at,
        };
        state.ssl_events.push(record.clone());
        Ok(record)
    }

    async fn get_previous_ssl_event(&self, monitor_id: i64) -> Result<Option<SslEventRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state.ssl_events.iter().find(|e| e.monitor_id == monitor_id && e.ended_at.is_none()).cloned())
    }

    async fn end_ssl_event(&self, id: i64, ended_at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(event) = state.ssl_events.iter_mut().find(|e| e.id == id) {
            event.ended_at = Some(ended_at);
            event.updated_at = ended_at;
        }
        Ok(())
    }

    async fn update_ssl_event(
        &self,
        id: i64,
        error: Option<&str>,
        ssl_valid_until: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(event) = state.ssl_events.iter_mut().find(|e| e.id == id) {
            event.error = error.map(str::to_string);
            event.ssl_valid_until = ssl_valid_until;
            event.updated_at = updated_at;
        }
        Ok(())
    }

    async fn get_ssl_events(&self, monitor_id: i64, limit: Option<usize>) -> Result<Vec<SslEventRecord>> {
        let mut events = self.ssl_events(monitor_id);
        events.reverse();
        events.truncate(limit.unwrap_or(usize::MAX));
        Ok(events)
    }

    async fn delete_ssl_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let before = state.ssl_events.len();
        state.ssl_events.retain(|e| e.ended_at.is_none_or(|ended| ended >= cutoff));
        Ok((before - state.ssl_events.len()) as u64)
    }
}

#[async_trait]
impl LatencyLogRepository for MemoryDatabase {
    async fn insert_latency(&self, monitor_id: i64, latency_ms: u64, created_at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.latency_logs.push(LatencyLog { id, monitor_id, latency_ms, created_at });
        Ok(())
    }

    async fn fetch_latest_latency(&self, monitor_id: i64, since: DateTime<Utc>) -> Result<Vec<LatencyLog>> {
        let mut logs: Vec<_> =
            self.latency_logs(monitor_id).into_iter().filter(|l| l.created_at >= since).collect();
        logs.reverse();
        Ok(logs)
    }

    async fn delete_latency_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let before = state.latency_logs.len();
        state.latency_logs.retain(|l| l.created_at >= cutoff);
        Ok((before - state.latency_logs.len()) as u64)
    }

    async fn delete_all_latency_logs(&self, monitor_id: i64) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let before = state.latency_logs.len();
        state.latency_logs.retain(|l| l.monitor_id != monitor_id);
        Ok((before - state.latency_logs.len()) as u64)
    }
}
