use crate::events::{MonitorEvent, SslOutcome, StructuredMessage, UptimeOutcome};

/// Renders events as text for one channel family.
///
/// Rich formatters put the summary on the first line in bold and each detail
/// on its own italic line; the plain formatter joins everything with `. `.
pub trait MessageFormatter: Send + Sync {
    fn bold(&self, input: &str) -> String;

    fn italic(&self, input: &str) -> String;

    fn format(&self, event: &MonitorEvent) -> String {
        let StructuredMessage { summary, details } = event.to_structured_message();
        std::iter::once(self.bold(&summary))
            .chain(details.iter().map(|detail| self.italic(detail)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct SlackFormatter;

impl MessageFormatter for SlackFormatter {
    fn bold(&self, input: &str) -> String {
        format!("*{input}*")
    }

    fn italic(&self, input: &str) -> String {
        format!("_{input}_")
    }
}

pub struct DiscordFormatter;

impl MessageFormatter for DiscordFormatter {
    fn bold(&self, input: &str) -> String {
        format!("**{input}**")
    }

    fn italic(&self, input: &str) -> String {
        format!("*{input}*")
    }
}

/// Telegram `HTML` parse mode
pub struct TelegramFormatter;

impl MessageFormatter for TelegramFormatter {
    fn bold(&self, input: &str) -> String {
        format!("<b>{}</b>", escape_html(input))
    }

    fn italic(&self, input: &str) -> String {
        format!("<i>{}</i>", escape_html(input))
    }
}

fn escape_html(input: &str) -> String {
    input.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Single line, no markup; used for logs and email bodies
pub struct PlainTextFormatter;

impl MessageFormatter for PlainTextFormatter {
    fn bold(&self, input: &str) -> String {
        input.to_string()
    }

    fn italic(&self, input: &str) -> String {
        input.to_string()
    }

    fn format(&self, event: &MonitorEvent) -> String {
        let StructuredMessage { summary, details } = event.to_structured_message();
        std::iter::once(summary).chain(details).collect::<Vec<_>>().join(". ")
    }
}

/// The leading emoji of an event's message
pub fn emoji(event: &MonitorEvent) -> &'static str {
    match event {
        MonitorEvent::Uptime(uptime) => match uptime.outcome {
            UptimeOutcome::Up { .. } => "✅",
            UptimeOutcome::Down { .. } => "🚨",
        },
        MonitorEvent::Ssl(ssl) => match ssl.outcome {
            SslOutcome::Valid(_) => "🔒️",
            SslOutcome::Invalid(_) => "🚨",
            SslOutcome::WillExpire(_) => "⚠️",
        },
        MonitorEvent::Redirect(_) => "ℹ️",
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, TimeDelta, Utc};
    use url::Url;

    use super::*;
    use crate::events::tests::{ssl_record, test_monitor, uptime_record};
    use crate::monitoring::types::{CertificateInfo, CheckError, SslStatus, SslValidationError, UptimeStatus};

    #[test]
    fn test_plain_up_messages() {
        let formatter = PlainTextFormatter;

        let first = MonitorEvent::up(test_monitor(), 200, 300, None);
        assert_eq!(
            formatter.format(&first),
            "✅ Your monitor \"test_monitor\" (https://test.url) is UP (200). Latency: 300ms"
        );

        let same = MonitorEvent::up(test_monitor(), 200, 300, Some(uptime_record(UptimeStatus::Up, 5)));
        assert_eq!(formatter.format(&same), formatter.format(&first));

        let recovered = MonitorEvent::up(test_monitor(), 200, 300, Some(uptime_record(UptimeStatus::Down, 90)));
        assert_eq!(
            formatter.format(&recovered),
            "✅ Your monitor \"test_monitor\" (https://test.url) is UP (200). Latency: 300ms. Was down for 1h 30m"
        );
    }

    #[test]
    fn test_plain_down_messages() {
        let formatter = PlainTextFormatter;

        let no_status = MonitorEvent::down(
            test_monitor(),
            None,
            CheckError::Transport("uptime error".into()),
            None,
        );
        assert_eq!(
            formatter.format(&no_status),
            "🚨 Your monitor \"test_monitor\" (https://test.url) is DOWN. Reason: uptime error"
        );

        let with_status = MonitorEvent::down(
            test_monitor(),
            Some(400),
            CheckError::IneligibleStatusCode(400),
            Some(uptime_record(UptimeStatus::Up, 2)),
        );
        assert_eq!(
            formatter.format(&with_status),
            "🚨 Your monitor \"test_monitor\" (https://test.url) is DOWN (400). Reason: 400 Bad Request. Was up for 2m"
        );
    }

    #[test]
    fn test_plain_ssl_messages() {
        let formatter = PlainTextFormatter;
        let valid_to = Utc.with_ymd_and_hms(2030, 5, 1, 12, 0, 0).unwrap();
        let info = CertificateInfo { valid_to };

        let valid = MonitorEvent::ssl(
            test_monitor(),
            SslOutcome::Valid(info),
            Some(ssl_record(SslStatus::Invalid, 60)),
        );
        assert_eq!(
            formatter.format(&valid),
            "🔒️ Your site \"test_monitor\" (https://test.url) has a VALID certificate. Was INVALID for 1h"
        );

        let invalid = MonitorEvent::ssl(
            test_monitor(),
            SslOutcome::Invalid(SslValidationError::MissingCertificate),
            None,
        );
        assert_eq!(
            formatter.format(&invalid),
            "🚨 Your site \"test_monitor\" (https://test.url) has an INVALID certificate. \
             Reason: The server did not present a certificate"
        );

        let expiring = MonitorEvent::ssl(test_monitor(), SslOutcome::WillExpire(info), None);
        assert_eq!(
            formatter.format(&expiring),
            "⚠️ Your SSL certificate for https://test.url will expire soon. Expiry date: 2030-05-01T12:00:00Z"
        );
    }

    #[test]
    fn test_redirect_message() {
        let event = MonitorEvent::redirect(test_monitor(), Url::parse("https://redirected.url/").unwrap());
        assert_eq!(
            PlainTextFormatter.format(&event),
            "ℹ️ Request to \"test_monitor\" (https://test.url) has been redirected to https://redirected.url/"
        );
    }

    #[test]
    fn test_rich_formatters_mark_up_summary_and_details() {
        let event = MonitorEvent::up(test_monitor(), 200, 300, Some(uptime_record(UptimeStatus::Down, 1)));

        assert_eq!(
            SlackFormatter.format(&event),
            "*✅ Your monitor \"test_monitor\" (https://test.url) is UP (200)*\n_Latency: 300ms_\n_Was down for 1m_"
        );
        assert_eq!(
            DiscordFormatter.format(&event),
            "**✅ Your monitor \"test_monitor\" (https://test.url) is UP (200)**\n*Latency: 300ms*\n*Was down for 1m*"
        );
    }

    #[test]
    fn test_telegram_escapes_html() {
        let event = MonitorEvent::down(
            test_monitor(),
            None,
            CheckError::Transport("<b>&oops</b>".into()),
            None,
        );
        let formatted = TelegramFormatter.format(&event);
        assert!(formatted.starts_with("<b>🚨 Your monitor"));
        assert!(formatted.contains("<i>Reason: &lt;b&gt;&amp;oops&lt;/b&gt;</i>"));
    }

    #[test]
    fn test_emoji_matches_event() {
        let expiring = MonitorEvent::ssl(
            test_monitor(),
            SslOutcome::WillExpire(CertificateInfo { valid_to: Utc::now() + TimeDelta::days(3) }),
            None,
        );
        assert_eq!(emoji(&expiring), "⚠️");
    }
}
