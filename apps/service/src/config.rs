use std::{env, fmt, fs, path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::integrations::models::{
    DiscordConfig, EmailConfig, IntegrationConfig, PagerdutyConfig, SlackConfig, TelegramConfig,
};
use crate::monitoring::{RetryPolicy, SchedulerSettings};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFailed(#[source] std::io::Error),
    #[error("Failed to write config file: {0}")]
    WriteFailed(#[source] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("Neither XDG_CONFIG_HOME nor a home directory is available")]
    ConfigPathUnavailable,
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub app: AppConfig,
    pub http_check: HttpCheckConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smtp: Option<SmtpConfig>,
    pub integrations: IntegrationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: path::PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: path::PathBuf::from("vigil.db") }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub uptime_check_lock_timeout_ms: u64,
    pub ssl_check_interval_seconds: u64,
    pub ssl_check_initial_delay_seconds: u64,
    pub event_data_retention_days: u32,
    pub latency_data_retention_days: u32,
    pub log_event_handler: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            uptime_check_lock_timeout_ms: 300_000,
            ssl_check_interval_seconds: 86_400,
            ssl_check_initial_delay_seconds: 60,
            event_data_retention_days: 365,
            latency_data_retention_days: 7,
            log_event_handler: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpCheckConfig {
    pub read_timeout_seconds: u64,
    pub retry_count: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_backoff_multiplier: u32,
}

impl Default for HttpCheckConfig {
    fn default() -> Self {
        Self {
            read_timeout_seconds: 30,
            retry_count: 2,
            retry_initial_delay_ms: 500,
            retry_backoff_multiplier: 3,
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub use_tls: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    pub slack: Vec<SlackConfig>,
    pub discord: Vec<DiscordConfig>,
    pub telegram: Vec<TelegramConfig>,
    pub email: Vec<EmailConfig>,
    pub pagerduty: Vec<PagerdutyConfig>,
}

impl IntegrationsConfig {
    pub fn to_configs(&self) -> Vec<IntegrationConfig> {
        let slack = self.slack.iter().cloned().map(IntegrationConfig::Slack);
        let discord = self.discord.iter().cloned().map(IntegrationConfig::Discord);
        let telegram = self.telegram.iter().cloned().map(IntegrationConfig::Telegram);
        let email = self.email.iter().cloned().map(IntegrationConfig::Email);
        let pagerduty = self.pagerduty.iter().cloned().map(IntegrationConfig::Pagerduty);
        slack.chain(discord).chain(telegram).chain(email).chain(pagerduty).collect()
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/vigil/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("vigil/config.toml"))
}

fn mask(secret: &str) -> String {
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", secret.chars().take(4).collect::<String>())
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path.display())?;

        write_title_1(f, "App")?;
        write_1(f, "Uptime Check Lock Timeout (ms)", &self.app.uptime_check_lock_timeout_ms)?;
        write_1(f, "SSL Check Interval (s)", &self.app.ssl_check_interval_seconds)?;
        write_1(f, "SSL Check Initial Delay (s)", &self.app.ssl_check_initial_delay_seconds)?;
        write_1(f, "Event Retention (days)", &self.app.event_data_retention_days)?;
        write_1(f, "Latency Retention (days)", &self.app.latency_data_retention_days)?;
        write_1(f, "Log Event Handler", &self.app.log_event_handler)?;

        write_title_1(f, "HTTP Check")?;
        write_1(f, "Read Timeout (s)", &self.http_check.read_timeout_seconds)?;
        write_1(f, "Retry Count", &self.http_check.retry_count)?;
        write_1(f, "Retry Initial Delay (ms)", &self.http_check.retry_initial_delay_ms)?;
        write_1(f, "Retry Backoff Multiplier", &self.http_check.retry_backoff_multiplier)?;

        write_title_1(f, "SMTP")?;
        match &self.smtp {
            Some(smtp) => {
                write_1(f, "Host", &format!("{}:{}", smtp.host, smtp.port))?;
                write_1(f, "Username", &smtp.username.as_deref().unwrap_or("-"))?;
                write_1(f, "Password", &smtp.password.as_deref().map(mask).unwrap_or_else(|| "-".into()))?;
                write_1(f, "TLS", &smtp.use_tls)?;
            }
            None => write_1(f, "Configured", &false)?,
        }

        write_title_1(f, "Integrations")?;
        for config in self.integrations.to_configs() {
            let secret = match &config {
                IntegrationConfig::Slack(c) => mask(&c.webhook_url),
                IntegrationConfig::Discord(c) => mask(&c.webhook_url),
                IntegrationConfig::Telegram(c) => format!("{} -> {}", mask(&c.api_token), c.chat_id),
                IntegrationConfig::Email(c) => format!("{} -> {}", c.from_address, c.to_address),
                IntegrationConfig::Pagerduty(c) => mask(&c.integration_key),
            };
            let flags = format!(
                "{}{}",
                if config.enabled() { "enabled" } else { "disabled" },
                if config.global() { ", global" } else { "" }
            );
            write_2(f, &config.id().to_string(), &format!("{secret} ({flags})"))?;
        }

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/vigil/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```rust,ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(ConfigError::ReadFailed)?;
            toml::from_str::<Self>(raw_string.as_str())?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::WriteFailed)?;
        }

        fs::write(path, config_str).map_err(ConfigError::WriteFailed)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let app = &self.app;
        if app.event_data_retention_days < 1 {
            return Err(ConfigError::Invalid("app.event_data_retention_days must be at least 1".into()));
        }
        if app.latency_data_retention_days < 1 {
            return Err(ConfigError::Invalid("app.latency_data_retention_days must be at least 1".into()));
        }
        if app.uptime_check_lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid("app.uptime_check_lock_timeout_ms must be positive".into()));
        }
        if app.ssl_check_interval_seconds == 0 {
            return Err(ConfigError::Invalid("app.ssl_check_interval_seconds must be positive".into()));
        }
        if self.http_check.read_timeout_seconds == 0 {
            return Err(ConfigError::Invalid("http_check.read_timeout_seconds must be positive".into()));
        }
        if self.http_check.retry_backoff_multiplier == 0 {
            return Err(ConfigError::Invalid("http_check.retry_backoff_multiplier must be positive".into()));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.app.uptime_check_lock_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.http_check.read_timeout_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_count: self.http_check.retry_count,
            initial_delay: Duration::from_millis(self.http_check.retry_initial_delay_ms),
            multiplier: self.http_check.retry_backoff_multiplier,
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            ssl_check_interval: Duration::from_secs(self.app.ssl_check_interval_seconds),
            ssl_initial_delay: Duration::from_secs(self.app.ssl_check_initial_delay_seconds),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_missing_file_is_created_with_defaults() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("nested/config");

        let config = Config::from_config(Some(&path))?;
        assert!(dir.path().join("nested/config.toml").exists());
        assert_eq!(config.app.uptime_check_lock_timeout_ms, 300_000);
        assert_eq!(config.retry_policy().delay_for(1), Duration::from_millis(1500));
        assert!(config.smtp.is_none());
        Ok(())
    }

    #[test]
    fn test_parse_sections_and_integrations() -> anyhow::Result<()> {
        let raw = r#"
            [database]
            path = "/var/lib/vigil/vigil.db"

            [app]
            event_data_retention_days = 30
            log_event_handler = true

            [smtp]
            host = "smtp.example.test"
            username = "vigil"
            password = "hunter22"

            [[integrations.slack]]
            name = "ops"
            global = true
            webhook_url = "https://hooks.slack.test/T000/B000"

            [[integrations.pagerduty]]
            name = "oncall"
            enabled = false
            integration_key = "abcdef123456"
        "#;
        let config: Config = toml::from_str(raw)?;
        config.validate()?;

        assert_eq!(config.app.event_data_retention_days, 30);
        assert_eq!(config.app.ssl_check_interval_seconds, 86_400);
        assert!(config.app.log_event_handler);
        let smtp = config.smtp.as_ref().ok_or_else(|| anyhow::anyhow!("smtp missing"))?;
        assert_eq!(smtp.port, 587);
        assert!(smtp.use_tls);

        let integrations = config.integrations.to_configs();
        assert_eq!(integrations.len(), 2);
        assert!(integrations[0].global());
        assert!(integrations[0].enabled());
        assert!(!integrations[1].enabled());

        let dump = config.to_string();
        assert!(dump.contains("slack:ops"));
        assert!(!dump.contains("hunter22"));
        assert!(!dump.contains("abcdef123456"));
        Ok(())
    }

    #[test]
    fn test_zero_retention_is_rejected() -> anyhow::Result<()> {
        let config: Config = toml::from_str("[app]\nlatency_data_retention_days = 0\n")?;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        Ok(())
    }
}
