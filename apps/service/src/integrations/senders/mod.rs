use async_trait::async_trait;
use thiserror::Error;

use super::models::{IntegrationConfig, IntegrationType};

pub mod email;
pub mod pagerduty;
pub mod telegram;
pub mod webhook;

pub use email::EmailSender;
pub use pagerduty::PagerdutySender;
pub use telegram::TelegramSender;
pub use webhook::{DiscordSender, SlackSender};

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// A rendered notification. Only email uses the subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

/// Delivers text notifications for one integration family
#[async_trait]
pub trait NotificationSender: Send + Sync {
    fn integration_type(&self) -> IntegrationType;

    async fn send(&self, config: &IntegrationConfig, notification: &Notification) -> Result<(), SenderError>;
}

/// Turn a non-2xx answer into a `SendFailed` carrying the body
pub(crate) async fn ensure_success(service: &str, response: reqwest::Response) -> Result<(), SenderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_else(|_| "Failed to read error body".to_string());
    Err(SenderError::SendFailed(format!("{service} returned non-success status: {status}. Body: {body}")))
}

pub(crate) fn wrong_config(expected: IntegrationType, config: &IntegrationConfig) -> SenderError {
    SenderError::InvalidConfiguration(format!(
        "Expected {expected} config, but found {}",
        config.id()
    ))
}

/// Client shared by the HTTP based senders
pub fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(std::time::Duration::from_secs(10)).build()
}
