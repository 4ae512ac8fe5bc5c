use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, error};

use super::formatter::{MessageFormatter, emoji};
use crate::events::{EventHandler, MonitorEvent, SslOutcome};
use crate::integrations::{IntegrationRepository, IntegrationType};
use crate::integrations::senders::{Notification, NotificationSender};
use crate::monitoring::types::UptimeStatus;

/// Whether an event is worth telling a human about: only transitions, and not
/// the first healthy result of a brand-new monitor.
pub fn should_notify(event: &MonitorEvent) -> bool {
    match event {
        MonitorEvent::Uptime(uptime) => {
            uptime.status_changed() && (uptime.previous_event.is_some() || uptime.status() == UptimeStatus::Down)
        }
        MonitorEvent::Ssl(ssl) => {
            ssl.status_changed() && (ssl.previous_event.is_some() || !matches!(ssl.outcome, SslOutcome::Valid(_)))
        }
        MonitorEvent::Redirect(_) => false,
    }
}

/// Subject line used by the email sender
pub fn email_subject(event: &MonitorEvent) -> String {
    let monitor = event.monitor();
    let state = match event {
        MonitorEvent::Uptime(uptime) => format!("is {}", uptime.status()),
        MonitorEvent::Ssl(ssl) => match ssl.outcome {
            SslOutcome::Valid(_) => "has a valid certificate".to_string(),
            SslOutcome::Invalid(_) => "has an invalid certificate".to_string(),
            SslOutcome::WillExpire(_) => "has an expiring certificate".to_string(),
        },
        MonitorEvent::Redirect(_) => "was redirected".to_string(),
    };
    format!("[vigil] - {} [{}] {} {}", emoji(event), monitor.name, monitor.url, state)
}

fn handler_name(integration_type: IntegrationType) -> &'static str {
    match integration_type {
        IntegrationType::Email => "email_notification",
        IntegrationType::Pagerduty => "pagerduty_notification",
        IntegrationType::Slack => "slack_notification",
        IntegrationType::Telegram => "telegram_notification",
        IntegrationType::Discord => "discord_notification",
    }
}

/// Fans a status change out to every enabled integration of one family
pub struct TextNotificationHandler {
    sender: Arc<dyn NotificationSender>,
    formatter: Box<dyn MessageFormatter>,
    integrations: Arc<IntegrationRepository>,
}

impl TextNotificationHandler {
    pub fn new(
        sender: Arc<dyn NotificationSender>,
        formatter: Box<dyn MessageFormatter>,
        integrations: Arc<IntegrationRepository>,
    ) -> Self {
        Self { sender, formatter, integrations }
    }
}

#[async_trait]
impl EventHandler for TextNotificationHandler {
    fn name(&self) -> &'static str {
        handler_name(self.sender.integration_type())
    }

    async fn handle(&self, event: &MonitorEvent) -> Result<()> {
        if !should_notify(event) {
            return Ok(());
        }

        let monitor = event.monitor();
        let integration_type = self.sender.integration_type();
        let targets = self.integrations.get_enabled_integrations(&monitor.integrations, integration_type);
        if targets.is_empty() {
            debug!(monitor_id = monitor.id, %integration_type, "No integrations to notify");
            return Ok(());
        }

        let notification = Notification { subject: email_subject(event), body: self.formatter.format(event) };
        let sends = targets.iter().map(|config| {
            let notification = &notification;
            async move { (config.id(), self.sender.send(config, notification).await) }
        });

        for (id, result) in join_all(sends).await {
            if let Err(e) = result {
                error!(monitor_id = monitor.id, integration = %id, "Failed to send notification: {e}");
            }
        }
        Ok(())
    }
}
