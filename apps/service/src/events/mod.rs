//! Status events published by the checkers.
//!
//! Every uptime and SSL outcome becomes a [`MonitorEvent`] carrying the
//! monitor snapshot and the still-open event it may close, so subscribers can
//! tell a status transition from a repeat without another lookup.

pub mod dispatcher;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use url::Url;

use crate::database::models::{Monitor, SslEventRecord, UptimeEventRecord};
use crate::monitoring::types::{
    CertificateInfo, CheckError, SslStatus, SslValidationError, UptimeStatus,
};

pub use dispatcher::{EventDispatcher, EventFilter, EventHandler};

/// Longest error text kept before redaction
pub const ERROR_MAX_LENGTH: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MonitorUp,
    MonitorDown,
    Redirect,
    SslValid,
    SslInvalid,
    SslWillExpire,
}

#[derive(Debug, Clone)]
pub enum UptimeOutcome {
    Up { status_code: u16, latency_ms: u64 },
    Down { status_code: Option<u16>, error: CheckError },
}

#[derive(Debug, Clone)]
pub struct UptimeMonitorEvent {
    pub monitor: Monitor,
    pub outcome: UptimeOutcome,
    pub previous_event: Option<UptimeEventRecord>,
    pub dispatched_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum SslOutcome {
    Valid(CertificateInfo),
    WillExpire(CertificateInfo),
    Invalid(SslValidationError),
}

#[derive(Debug, Clone)]
pub struct SslMonitorEvent {
    pub monitor: Monitor,
    pub outcome: SslOutcome,
    pub previous_event: Option<SslEventRecord>,
    pub dispatched_at: DateTime<Utc>,
}

/// A redirect seen while following a chain; informational only
#[derive(Debug, Clone)]
pub struct RedirectEvent {
    pub monitor: Monitor,
    pub location: Url,
    pub dispatched_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum MonitorEvent {
    Uptime(UptimeMonitorEvent),
    Ssl(SslMonitorEvent),
    Redirect(RedirectEvent),
}

/// Summary line plus ordered detail sentences, rendered by the formatters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredMessage {
    pub summary: String,
    pub details: Vec<String>,
}

impl MonitorEvent {
    pub fn up(
        monitor: Monitor,
        status_code: u16,
        latency_ms: u64,
        previous_event: Option<UptimeEventRecord>,
    ) -> Self {
        MonitorEvent::Uptime(UptimeMonitorEvent {
            monitor,
            outcome: UptimeOutcome::Up { status_code, latency_ms },
            previous_event,
            dispatched_at: Utc::now(),
        })
    }

    pub fn down(
        monitor: Monitor,
        status_code: Option<u16>,
        error: CheckError,
        previous_event: Option<UptimeEventRecord>,
    ) -> Self {
        MonitorEvent::Uptime(UptimeMonitorEvent {
            monitor,
            outcome: UptimeOutcome::Down { status_code, error },
            previous_event,
            dispatched_at: Utc::now(),
        })
    }

    pub fn redirect(monitor: Monitor, location: Url) -> Self {
        MonitorEvent::Redirect(RedirectEvent { monitor, location, dispatched_at: Utc::now() })
    }

    pub fn ssl(monitor: Monitor, outcome: SslOutcome, previous_event: Option<SslEventRecord>) -> Self {
        MonitorEvent::Ssl(SslMonitorEvent { monitor, outcome, previous_event, dispatched_at: Utc::now() })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            MonitorEvent::Uptime(event) => match event.outcome {
                UptimeOutcome::Up { .. } => EventKind::MonitorUp,
                UptimeOutcome::Down { .. } => EventKind::MonitorDown,
            },
            MonitorEvent::Ssl(event) => match event.outcome {
                SslOutcome::Valid(_) => EventKind::SslValid,
                SslOutcome::WillExpire(_) => EventKind::SslWillExpire,
                SslOutcome::Invalid(_) => EventKind::SslInvalid,
            },
            MonitorEvent::Redirect(_) => EventKind::Redirect,
        }
    }

    pub fn monitor(&self) -> &Monitor {
        match self {
            MonitorEvent::Uptime(event) => &event.monitor,
            MonitorEvent::Ssl(event) => &event.monitor,
            MonitorEvent::Redirect(event) => &event.monitor,
        }
    }

    pub fn to_structured_message(&self) -> StructuredMessage {
        match self {
            MonitorEvent::Uptime(event) => event.to_structured_message(),
            MonitorEvent::Ssl(event) => event.to_structured_message(),
            MonitorEvent::Redirect(event) => StructuredMessage {
                summary: format!(
                    "ℹ️ Request to \"{}\" ({}) has been redirected to {}",
                    event.monitor.name, event.monitor.url, event.location
                ),
                details: Vec::new(),
            },
        }
    }
}

impl UptimeMonitorEvent {
    pub fn status(&self) -> UptimeStatus {
        match self.outcome {
            UptimeOutcome::Up { .. } => UptimeStatus::Up,
            UptimeOutcome::Down { .. } => UptimeStatus::Down,
        }
    }

    /// True without a previous event, or when the previous status differs
    pub fn status_changed(&self) -> bool {
        self.previous_event.as_ref().is_none_or(|previous| previous.status != self.status())
    }

    /// Length of the interval this event closes, only on a transition
    pub fn ended_event_duration(&self) -> Option<TimeDelta> {
        self.previous_event
            .as_ref()
            .filter(|previous| previous.status != self.status())
            .map(|previous| diff_in_seconds(previous.started_at, self.dispatched_at))
    }

    /// Error text as stored on the event row
    pub fn persisted_error(&self) -> Option<String> {
        match &self.outcome {
            UptimeOutcome::Up { .. } => None,
            UptimeOutcome::Down { status_code: Some(code), .. } => Some(status_line(*code)),
            UptimeOutcome::Down { status_code: None, error } => {
                Some(sanitize_message(&error.to_string()))
            }
        }
    }

    fn to_structured_message(&self) -> StructuredMessage {
        let monitor = &self.monitor;
        let previous = self.ended_event_duration().map(format_duration);

        match &self.outcome {
            UptimeOutcome::Up { status_code, latency_ms } => StructuredMessage {
                summary: format!(
                    "✅ Your monitor \"{}\" ({}) is UP ({status_code})",
                    monitor.name, monitor.url
                ),
                details: std::iter::once(format!("Latency: {latency_ms}ms"))
                    .chain(previous.map(|d| format!("Was down for {d}")))
                    .collect(),
            },
            UptimeOutcome::Down { status_code, .. } => StructuredMessage {
                summary: format!(
                    "🚨 Your monitor \"{}\" ({}) is DOWN{}",
                    monitor.name,
                    monitor.url,
                    status_code.map(|code| format!(" ({code})")).unwrap_or_default()
                ),
                details: std::iter::once(format!(
                    "Reason: {}",
                    self.persisted_error().unwrap_or_default()
                ))
                .chain(previous.map(|d| format!("Was up for {d}")))
                .collect(),
            },
        }
    }
}

impl SslMonitorEvent {
    pub fn status(&self) -> SslStatus {
        match self.outcome {
            SslOutcome::Valid(_) => SslStatus::Valid,
            SslOutcome::WillExpire(_) => SslStatus::WillExpire,
            SslOutcome::Invalid(_) => SslStatus::Invalid,
        }
    }

    pub fn status_changed(&self) -> bool {
        self.previous_event.as_ref().is_none_or(|previous| previous.status != self.status())
    }

    pub fn ended_event_duration(&self) -> Option<TimeDelta> {
        self.previous_event
            .as_ref()
            .filter(|previous| previous.status != self.status())
            .map(|previous| diff_in_seconds(previous.started_at, self.dispatched_at))
    }

    pub fn cert_info(&self) -> Option<&CertificateInfo> {
        match &self.outcome {
            SslOutcome::Valid(info) | SslOutcome::WillExpire(info) => Some(info),
            SslOutcome::Invalid(_) => None,
        }
    }

    pub fn persisted_error(&self) -> Option<String> {
        match &self.outcome {
            SslOutcome::Invalid(error) => Some(sanitize_message(&error.to_string())),
            _ => None,
        }
    }

    fn previous_status_for(&self, duration: TimeDelta) -> Option<String> {
        let previous = self.previous_event.as_ref()?;
        Some(format!("Was {} for {}", previous.status, format_duration(duration)))
    }

    fn to_structured_message(&self) -> StructuredMessage {
        let monitor = &self.monitor;
        let previous = self.ended_event_duration().and_then(|d| self.previous_status_for(d));

        match &self.outcome {
            SslOutcome::Valid(_) => StructuredMessage {
                summary: format!(
                    "🔒️ Your site \"{}\" ({}) has a VALID certificate",
                    monitor.name, monitor.url
                ),
                details: previous.into_iter().collect(),
            },
            SslOutcome::Invalid(_) => StructuredMessage {
                summary: format!(
                    "🚨 Your site \"{}\" ({}) has an INVALID certificate",
                    monitor.name, monitor.url
                ),
                details: std::iter::once(format!(
                    "Reason: {}",
                    self.persisted_error().unwrap_or_default()
                ))
                .chain(previous)
                .collect(),
            },
            SslOutcome::WillExpire(info) => StructuredMessage {
                summary: format!("⚠️ Your SSL certificate for {} will expire soon", monitor.url),
                details: vec![format!(
                    "Expiry date: {}",
                    info.valid_to.to_rfc3339_opts(SecondsFormat::Secs, true)
                )],
            },
        }
    }
}

fn diff_in_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> TimeDelta {
    TimeDelta::seconds(end.timestamp() - start.timestamp())
}

/// `"<code> <reason>"`, e.g. `500 Internal Server Error`
pub fn status_line(code: u16) -> String {
    let reason = reqwest::StatusCode::from_u16(code)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("Unknown Status");
    format!("{code} {reason}")
}

/// Strip control characters and cap the length of user visible error text
pub fn sanitize_message(message: &str) -> String {
    let sanitized: String =
        message.replace('\u{0}', "null").chars().filter(|c| !c.is_control()).collect();

    if sanitized.chars().count() > ERROR_MAX_LENGTH {
        let truncated: String = sanitized.chars().take(ERROR_MAX_LENGTH).collect();
        format!("{truncated} ... [REDACTED]")
    } else {
        sanitized
    }
}

/// `1d 2h 3m 4s`, leaving out zero parts
pub fn format_duration(duration: TimeDelta) -> String {
    let total = duration.num_seconds().max(0);
    let parts = [
        (total / 86_400, "d"),
        (total % 86_400 / 3_600, "h"),
        (total % 3_600 / 60, "m"),
        (total % 60, "s"),
    ];

    let rendered: Vec<String> = parts
        .iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| format!("{value}{unit}"))
        .collect();

    if rendered.is_empty() { "0s".to_string() } else { rendered.join(" ") }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::database::models::NewMonitor;

    pub(crate) fn test_monitor() -> Monitor {
        NewMonitor::new("test_monitor", "https://test.url").into_monitor(1111, Utc::now())
    }

    pub(crate) fn uptime_record(status: UptimeStatus, minutes_ago: i64) -> UptimeEventRecord {
        let started_at = Utc::now() - TimeDelta::minutes(minutes_ago);
        UptimeEventRecord {
            id: 1,
            monitor_id: 1111,
            status,
            error: None,
            started_at,
            ended_at: None,
            updated_at: started_at,
        }
    }

    pub(crate) fn ssl_record(status: SslStatus, minutes_ago: i64) -> SslEventRecord {
        let started_at = Utc::now() - TimeDelta::minutes(minutes_ago);
        SslEventRecord {
            id: 1,
            monitor_id: 1111,
            status,
            error: None,
            ssl_valid_until: None,
            started_at,
            ended_at: None,
            updated_at: started_at,
        }
    }

    fn uptime(event: MonitorEvent) -> UptimeMonitorEvent {
        match event {
            MonitorEvent::Uptime(event) => event,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_status_change_detection() {
        let monitor = test_monitor();

        let first = uptime(MonitorEvent::up(monitor.clone(), 200, 10, None));
        assert!(first.status_changed());
        assert!(first.ended_event_duration().is_none());

        let repeat = uptime(MonitorEvent::up(
            monitor.clone(),
            200,
            10,
            Some(uptime_record(UptimeStatus::Up, 5)),
        ));
        assert!(!repeat.status_changed());
        assert!(repeat.ended_event_duration().is_none());

        let flip = uptime(MonitorEvent::down(
            monitor,
            Some(500),
            CheckError::IneligibleStatusCode(500),
            Some(uptime_record(UptimeStatus::Up, 30)),
        ));
        assert!(flip.status_changed());
        assert_eq!(flip.ended_event_duration().map(|d| d.num_minutes()), Some(30));
    }

    #[test]
    fn test_down_error_prefers_status_line() {
        let monitor = test_monitor();
        let with_status = uptime(MonitorEvent::down(
            monitor.clone(),
            Some(400),
            CheckError::IneligibleStatusCode(400),
            None,
        ));
        assert_eq!(with_status.persisted_error().as_deref(), Some("400 Bad Request"));

        let transport = uptime(MonitorEvent::down(
            monitor,
            None,
            CheckError::Transport("connection refused".into()),
            None,
        ));
        assert_eq!(transport.persisted_error().as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_sanitize_message() {
        assert_eq!(sanitize_message("bad\u{0}byte\n\there"), "badnullbytehere");

        let long = "x".repeat(300);
        let sanitized = sanitize_message(&long);
        assert!(sanitized.ends_with(" ... [REDACTED]"));
        assert_eq!(sanitized.len(), ERROR_MAX_LENGTH + " ... [REDACTED]".len());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(TimeDelta::seconds(0)), "0s");
        assert_eq!(format_duration(TimeDelta::seconds(90_061)), "1d 1h 1m 1s");
        assert_eq!(format_duration(TimeDelta::minutes(30)), "30m");
    }

    #[test]
    fn test_event_kinds() {
        let monitor = test_monitor();
        let info = CertificateInfo { valid_to: Utc::now() };
        assert_eq!(MonitorEvent::ssl(monitor.clone(), SslOutcome::WillExpire(info), None).kind(), EventKind::SslWillExpire);
        assert_eq!(
            MonitorEvent::redirect(monitor, Url::parse("https://other.test").unwrap()).kind(),
            EventKind::Redirect
        );
    }
}
