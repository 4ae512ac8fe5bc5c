use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::database::Database;
use crate::database::models::{NewSslEvent, NewUptimeEvent};
use crate::events::{EventHandler, MonitorEvent, SslMonitorEvent, UptimeMonitorEvent, UptimeOutcome};

/// Keeps the event history: extends the open interval on a repeat, closes it
/// and opens a new one on a transition
pub struct DatabaseEventHandler {
    db: Arc<dyn Database>,
}

impl DatabaseEventHandler {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    async fn handle_uptime(&self, event: &UptimeMonitorEvent) -> Result<()> {
        let monitor_id = event.monitor.id;
        let error = event.persisted_error();

        match &event.previous_event {
            Some(previous) if previous.status == event.status() => {
                self.db.update_uptime_event(previous.id, error.as_deref(), event.dispatched_at).await?;
            }
            previous => {
                if let Some(previous) = previous {
                    self.db.end_uptime_event(previous.id, event.dispatched_at).await?;
                }
                self.db
                    .insert_uptime_event(&NewUptimeEvent {
                        monitor_id,
                        status: event.status(),
                        error,
                        started_at: event.dispatched_at,
                    })
                    .await?;
                debug!(monitor_id, status = %event.status(), "Uptime status changed");
            }
        }

        if let UptimeOutcome::Up { latency_ms, .. } = event.outcome {
            if event.monitor.latency_history_enabled {
                self.db.insert_latency(monitor_id, latency_ms, event.dispatched_at).await?;
            }
        }
        Ok(())
    }

    async fn handle_ssl(&self, event: &SslMonitorEvent) -> Result<()> {
        let monitor_id = event.monitor.id;
        let error = event.persisted_error();
        let valid_until = event.cert_info().map(|info| info.valid_to);

        match &event.previous_event {
            Some(previous) if previous.status == event.status() => {
                self.db
                    .update_ssl_event(previous.id, error.as_deref(), valid_until, event.dispatched_at)
                    .await?;
            }
            previous => {
                if let Some(previous) = previous {
                    self.db.end_ssl_event(previous.id, event.dispatched_at).await?;
                }
                self.db
                    .insert_ssl_event(&NewSslEvent {
                        monitor_id,
                        status: event.status(),
                        error,
                        ssl_valid_until: valid_until,
                        started_at: event.dispatched_at,
                    })
                    .await?;
                debug!(monitor_id, status = %event.status(), "SSL status changed");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for DatabaseEventHandler {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn handle(&self, event: &MonitorEvent) -> Result<()> {
        match event {
            MonitorEvent::Uptime(uptime) => self.handle_uptime(uptime).await,
            MonitorEvent::Ssl(ssl) => self.handle_ssl(ssl).await,
            MonitorEvent::Redirect(_) => Ok(()),
        }
    }
}
