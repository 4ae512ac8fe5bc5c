use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Notification channel families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IntegrationType {
    Email,
    Pagerduty,
    Slack,
    Telegram,
    Discord,
}

impl IntegrationType {
    pub const ALL: [IntegrationType; 5] = [
        IntegrationType::Email,
        IntegrationType::Pagerduty,
        IntegrationType::Slack,
        IntegrationType::Telegram,
        IntegrationType::Discord,
    ];

    pub fn identifier(&self) -> &'static str {
        match self {
            IntegrationType::Email => "email",
            IntegrationType::Pagerduty => "pagerduty",
            IntegrationType::Slack => "slack",
            IntegrationType::Telegram => "telegram",
            IntegrationType::Discord => "discord",
        }
    }

    pub fn from_identifier(identifier: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.identifier() == identifier)
    }
}

impl fmt::Display for IntegrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid integration ID format: {0}. Expected format is 'type:name'.")]
pub struct InvalidIntegrationId(pub String);

/// Identity of a configured integration, rendered as `type:name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntegrationId {
    pub integration_type: IntegrationType,
    pub name: String,
}

impl IntegrationId {
    pub fn new(integration_type: IntegrationType, name: impl Into<String>) -> Self {
        Self { integration_type, name: name.into() }
    }
}

impl fmt::Display for IntegrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.integration_type, self.name)
    }
}

impl FromStr for IntegrationId {
    type Err = InvalidIntegrationId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(raw_type), Some(name), None) => IntegrationType::from_identifier(raw_type)
                .map(|integration_type| IntegrationId::new(integration_type, name))
                .ok_or_else(|| InvalidIntegrationId(s.to_string())),
            _ => Err(InvalidIntegrationId(s.to_string())),
        }
    }
}

impl Serialize for IntegrationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IntegrationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub global: bool,
    pub webhook_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub global: bool,
    pub webhook_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub global: bool,
    pub api_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub global: bool,
    pub from_address: String,
    pub to_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagerdutyConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub global: bool,
    pub integration_key: String,
}

/// A configured notification channel instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrationConfig {
    Slack(SlackConfig),
    Discord(DiscordConfig),
    Telegram(TelegramConfig),
    Email(EmailConfig),
    Pagerduty(PagerdutyConfig),
}

impl IntegrationConfig {
    pub fn integration_type(&self) -> IntegrationType {
        match self {
            IntegrationConfig::Slack(_) => IntegrationType::Slack,
            IntegrationConfig::Discord(_) => IntegrationType::Discord,
            IntegrationConfig::Telegram(_) => IntegrationType::Telegram,
            IntegrationConfig::Email(_) => IntegrationType::Email,
            IntegrationConfig::Pagerduty(_) => IntegrationType::Pagerduty,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            IntegrationConfig::Slack(c) => &c.name,
            IntegrationConfig::Discord(c) => &c.name,
            IntegrationConfig::Telegram(c) => &c.name,
            IntegrationConfig::Email(c) => &c.name,
            IntegrationConfig::Pagerduty(c) => &c.name,
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            IntegrationConfig::Slack(c) => c.enabled,
            IntegrationConfig::Discord(c) => c.enabled,
            IntegrationConfig::Telegram(c) => c.enabled,
            IntegrationConfig::Email(c) => c.enabled,
            IntegrationConfig::Pagerduty(c) => c.enabled,
        }
    }

    pub fn global(&self) -> bool {
        match self {
            IntegrationConfig::Slack(c) => c.global,
            IntegrationConfig::Discord(c) => c.global,
            IntegrationConfig::Telegram(c) => c.global,
            IntegrationConfig::Email(c) => c.global,
            IntegrationConfig::Pagerduty(c) => c.global,
        }
    }

    pub fn id(&self) -> IntegrationId {
        IntegrationId::new(self.integration_type(), self.name())
    }
}
