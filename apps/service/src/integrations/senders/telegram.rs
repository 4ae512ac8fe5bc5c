use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{Notification, NotificationSender, SenderError, ensure_success, wrong_config};
use crate::integrations::models::{IntegrationConfig, IntegrationType};

pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// A sender for pushing notifications via the Telegram Bot API.
///
/// Messages are sent in `HTML` parse mode, matching the Telegram formatter.
pub struct TelegramSender {
    client: Client,
    api_url: String,
}

impl TelegramSender {
    pub fn new(client: Client) -> Self {
        Self::with_api_url(client, TELEGRAM_API_URL)
    }

    pub fn with_api_url(client: Client, api_url: impl Into<String>) -> Self {
        Self { client, api_url: api_url.into() }
    }
}

#[derive(Serialize)]
struct TelegramMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

#[async_trait]
impl NotificationSender for TelegramSender {
    fn integration_type(&self) -> IntegrationType {
        IntegrationType::Telegram
    }

    async fn send(&self, config: &IntegrationConfig, notification: &Notification) -> Result<(), SenderError> {
        let IntegrationConfig::Telegram(telegram) = config else {
            return Err(wrong_config(IntegrationType::Telegram, config));
        };

        let url = format!("{}/bot{}/sendMessage", self.api_url, telegram.api_token);
        let payload = TelegramMessage {
            chat_id: &telegram.chat_id,
            text: &notification.body,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let response = self.client.post(&url).json(&payload).send().await?;
        ensure_success("Telegram API", response).await
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::integrations::models::TelegramConfig;

    #[tokio::test]
    async fn test_send_message_in_html_mode() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(serde_json::json!({
                "chat_id": "-1001",
                "text": "<b>down</b>",
                "parse_mode": "HTML"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let config = IntegrationConfig::Telegram(TelegramConfig {
            name: "alerts".into(),
            enabled: true,
            global: true,
            api_token: "123:abc".into(),
            chat_id: "-1001".into(),
        });
        let sender = TelegramSender::with_api_url(Client::new(), server.uri());
        sender
            .send(&config, &Notification { subject: String::new(), body: "<b>down</b>".into() })
            .await?;
        Ok(())
    }
}
