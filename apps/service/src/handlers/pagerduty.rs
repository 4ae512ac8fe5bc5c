use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use tracing::error;

use crate::events::{EventHandler, MonitorEvent, SslOutcome, UptimeOutcome};
use crate::integrations::models::{IntegrationConfig, IntegrationType};
use crate::integrations::senders::pagerduty::{PagerdutySender, PagerdutySeverity};
use crate::integrations::{IntegrationId, IntegrationRepository};

use super::formatter::{MessageFormatter, PlainTextFormatter};
use super::notification::should_notify;

enum Action {
    Trigger(PagerdutySeverity),
    Resolve,
}

/// Opens and resolves PagerDuty incidents, one incident per monitor and check type
pub struct PagerdutyEventHandler {
    sender: PagerdutySender,
    integrations: Arc<IntegrationRepository>,
}

impl PagerdutyEventHandler {
    pub fn new(sender: PagerdutySender, integrations: Arc<IntegrationRepository>) -> Self {
        Self { sender, integrations }
    }

    fn dedup_key(event: &MonitorEvent) -> String {
        let id = event.monitor().id;
        match event {
            MonitorEvent::Ssl(_) => format!("vigil_ssl_{id}"),
            _ => format!("vigil_uptime_{id}"),
        }
    }

    fn action(event: &MonitorEvent) -> Option<Action> {
        match event {
            MonitorEvent::Uptime(uptime) => match uptime.outcome {
                UptimeOutcome::Down { .. } => Some(Action::Trigger(PagerdutySeverity::Critical)),
                UptimeOutcome::Up { .. } => uptime.previous_event.is_some().then_some(Action::Resolve),
            },
            MonitorEvent::Ssl(ssl) => match ssl.outcome {
                SslOutcome::Invalid(_) => Some(Action::Trigger(PagerdutySeverity::Critical)),
                SslOutcome::WillExpire(_) => Some(Action::Trigger(PagerdutySeverity::Warning)),
                SslOutcome::Valid(_) => ssl.previous_event.is_some().then_some(Action::Resolve),
            },
            MonitorEvent::Redirect(_) => None,
        }
    }

    async fn deliver(&self, config: &IntegrationConfig, event: &MonitorEvent, action: &Action) -> Result<(), String> {
        let IntegrationConfig::Pagerduty(pagerduty) = config else {
            return Err(format!("{} is not a PagerDuty integration", config.id()));
        };
        let dedup_key = Self::dedup_key(event);
        let result = match action {
            Action::Trigger(severity) => {
                let summary = PlainTextFormatter.format(event);
                self.sender
                    .trigger(&pagerduty.integration_key, &dedup_key, &summary, &event.monitor().url, *severity)
                    .await
            }
            Action::Resolve => self.sender.resolve(&pagerduty.integration_key, &dedup_key).await,
        };
        result.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl EventHandler for PagerdutyEventHandler {
    fn name(&self) -> &'static str {
        "pagerduty"
    }

    async fn handle(&self, event: &MonitorEvent) -> Result<()> {
        if !should_notify(event) {
            return Ok(());
        }
        let Some(action) = Self::action(event) else {
            return Ok(());
        };

        let monitor = event.monitor();
        let targets = self.integrations.get_enabled_integrations(&monitor.integrations, IntegrationType::Pagerduty);
        let deliveries = targets.iter().map(|config| async {
            let id: IntegrationId = config.id();
            (id, self.deliver(config, event, &action).await)
        });

        for (id, result) in join_all(deliveries).await {
            if let Err(e) = result {
                error!(monitor_id = monitor.id, integration = %id, "Failed to send PagerDuty event: {e}");
            }
        }
        Ok(())
    }
}
