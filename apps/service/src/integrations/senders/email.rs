use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::warn;

use super::{Notification, NotificationSender, SenderError, wrong_config};
use crate::config::SmtpConfig;
use crate::integrations::models::{IntegrationConfig, IntegrationType};

const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    #[cfg(test)]
    Stub(lettre::transport::stub::AsyncStubTransport),
}

/// Sends plain-text emails through the configured SMTP server
pub struct EmailSender {
    transport: EmailTransport,
}

impl EmailSender {
    pub fn from_config(config: &SmtpConfig) -> Result<Self, SenderError> {
        if !config.use_tls {
            warn!("SMTP TLS is disabled - this is not recommended for production");
        }

        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| SenderError::InvalidConfiguration(format!("SMTP transport: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        }
        .port(config.port)
        .timeout(Some(SMTP_TIMEOUT));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self { transport: EmailTransport::Smtp(builder.build()) })
    }

    fn build_message(config: &IntegrationConfig, notification: &Notification) -> Result<Message, SenderError> {
        let IntegrationConfig::Email(email) = config else {
            return Err(wrong_config(IntegrationType::Email, config));
        };

        let from: Mailbox = email
            .from_address
            .parse()
            .map_err(|e| SenderError::InvalidConfiguration(format!("from address: {e}")))?;
        let to: Mailbox = email
            .to_address
            .parse()
            .map_err(|e| SenderError::InvalidConfiguration(format!("to address: {e}")))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(&notification.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(notification.body.clone())
            .map_err(|e| SenderError::SendFailed(format!("Failed to build email: {e}")))
    }
}

#[async_trait]
impl NotificationSender for EmailSender {
    fn integration_type(&self) -> IntegrationType {
        IntegrationType::Email
    }

    async fn send(&self, config: &IntegrationConfig, notification: &Notification) -> Result<(), SenderError> {
        let message = Self::build_message(config, notification)?;

        match &self.transport {
            EmailTransport::Smtp(smtp) => smtp
                .send(message)
                .await
                .map(|_| ())
                .map_err(|e| SenderError::SendFailed(format!("SMTP delivery failed: {e}"))),
            #[cfg(test)]
            EmailTransport::Stub(stub) => stub
                .send(message)
                .await
                .map(|_| ())
                .map_err(|e| SenderError::SendFailed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use lettre::transport::stub::AsyncStubTransport;

    use super::*;
    use crate::integrations::models::EmailConfig;

    fn email_config(from: &str) -> IntegrationConfig {
        IntegrationConfig::Email(EmailConfig {
            name: "team".into(),
            enabled: true,
            global: false,
            from_address: from.into(),
            to_address: "oncall@example.test".into(),
        })
    }

    #[tokio::test]
    async fn test_email_is_built_with_subject_and_body() -> anyhow::Result<()> {
        let stub = AsyncStubTransport::new_ok();
        let sender = EmailSender { transport: EmailTransport::Stub(stub.clone()) };

        let notification = Notification {
            subject: "[vigil] - 🚨 [api] https://api.test is DOWN".into(),
            body: "Your monitor is DOWN".into(),
        };
        sender.send(&email_config("vigil@example.test"), &notification).await?;

        let messages = stub.messages().await;
        assert_eq!(messages.len(), 1);
        let (envelope, raw) = &messages[0];
        assert_eq!(envelope.to()[0].to_string(), "oncall@example.test");
        assert!(raw.contains("Your monitor is DOWN"));
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_address_is_a_configuration_error() {
        let sender = EmailSender { transport: EmailTransport::Stub(AsyncStubTransport::new_ok()) };
        let notification = Notification { subject: "s".into(), body: "b".into() };

        let result = sender.send(&email_config("not an address"), &notification).await;
        assert!(matches!(result, Err(SenderError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_smtp_transport_from_config() {
        let config = SmtpConfig {
            host: "smtp.example.test".into(),
            port: 587,
            username: Some("user".into()),
            password: Some("secret".into()),
            use_tls: true,
        };
        assert!(EmailSender::from_config(&config).is_ok());
    }
}
