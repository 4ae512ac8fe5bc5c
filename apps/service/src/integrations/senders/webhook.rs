use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{Notification, NotificationSender, SenderError, ensure_success, wrong_config};
use crate::integrations::models::{IntegrationConfig, IntegrationType};

/// Posts to Slack incoming webhooks
pub struct SlackSender {
    client: Client,
}

impl SlackSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Serialize)]
struct SlackMessage<'a> {
    text: &'a str,
}

#[async_trait]
impl NotificationSender for SlackSender {
    fn integration_type(&self) -> IntegrationType {
        IntegrationType::Slack
    }

    async fn send(&self, config: &IntegrationConfig, notification: &Notification) -> Result<(), SenderError> {
        let IntegrationConfig::Slack(slack) = config else {
            return Err(wrong_config(IntegrationType::Slack, config));
        };

        let response = self
            .client
            .post(&slack.webhook_url)
            .json(&SlackMessage { text: &notification.body })
            .send()
            .await?;

        ensure_success("Slack", response).await
    }
}

/// Posts to Discord webhooks
pub struct DiscordSender {
    client: Client,
}

impl DiscordSender {
    pub const USERNAME: &'static str = "vigil";

    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Serialize)]
struct DiscordMessage<'a> {
    username: &'a str,
    content: &'a str,
}

#[async_trait]
impl NotificationSender for DiscordSender {
    fn integration_type(&self) -> IntegrationType {
        IntegrationType::Discord
    }

    async fn send(&self, config: &IntegrationConfig, notification: &Notification) -> Result<(), SenderError> {
        let IntegrationConfig::Discord(discord) = config else {
            return Err(wrong_config(IntegrationType::Discord, config));
        };

        let response = self
            .client
            .post(&discord.webhook_url)
            .json(&DiscordMessage { username: Self::USERNAME, content: &notification.body })
            .send()
            .await?;

        ensure_success("Discord", response).await
    }
}
