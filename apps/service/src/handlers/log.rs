use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use super::formatter::{MessageFormatter, PlainTextFormatter};
use crate::events::{EventHandler, EventKind, MonitorEvent};

/// Writes every event to the log as a single plain-text line
pub struct LogEventHandler {
    formatter: PlainTextFormatter,
}

impl LogEventHandler {
    pub fn new() -> Self {
        Self { formatter: PlainTextFormatter }
    }
}

impl Default for LogEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventHandler for LogEventHandler {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn handle(&self, event: &MonitorEvent) -> Result<()> {
        let monitor_id = event.monitor().id;
        let message = self.formatter.format(event);
        match event.kind() {
            EventKind::MonitorDown | EventKind::SslInvalid | EventKind::SslWillExpire => {
                warn!(monitor_id, "{message}")
            }
            EventKind::MonitorUp | EventKind::SslValid | EventKind::Redirect => info!(monitor_id, "{message}"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::tests::test_monitor;

    #[tokio::test]
    async fn test_log_handler_accepts_every_kind() -> Result<()> {
        let handler = LogEventHandler::new();
        let monitor = test_monitor();

        handler.handle(&MonitorEvent::up(monitor.clone(), 200, 5, None)).await?;
        handler
            .handle(&MonitorEvent::redirect(monitor, url::Url::parse("https://test.url/next")?))
            .await?;
        Ok(())
    }
}
