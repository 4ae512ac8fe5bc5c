use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::integrations::models::IntegrationId;
use crate::monitoring::types::{HttpMethod, SslStatus, UptimeStatus};

/// Monitor model - a configured endpoint and its check settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: i64,
    pub name: String,
    pub url: String,
    /// Seconds between two uptime checks
    pub uptime_check_interval: u64,
    pub enabled: bool,
    pub ssl_check_enabled: bool,
    pub request_method: HttpMethod,
    pub follow_redirects: bool,
    pub force_no_cache: bool,
    pub latency_history_enabled: bool,
    /// Days before expiry from which a certificate counts as expiring
    pub ssl_expiry_threshold: u32,
    pub integrations: BTreeSet<IntegrationId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Monitor fields accepted on insert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMonitor {
    pub name: String,
    pub url: String,
    pub uptime_check_interval: u64,
    pub enabled: bool,
    pub ssl_check_enabled: bool,
    pub request_method: HttpMethod,
    pub follow_redirects: bool,
    pub force_no_cache: bool,
    pub latency_history_enabled: bool,
    pub ssl_expiry_threshold: u32,
    pub integrations: BTreeSet<IntegrationId>,
}

impl NewMonitor {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            uptime_check_interval: 60,
            enabled: true,
            ssl_check_enabled: false,
            request_method: HttpMethod::Get,
            follow_redirects: true,
            force_no_cache: true,
            latency_history_enabled: true,
            ssl_expiry_threshold: 30,
            integrations: BTreeSet::new(),
        }
    }

    pub fn into_monitor(self, id: i64, now: DateTime<Utc>) -> Monitor {
        Monitor {
            id,
            name: self.name,
            url: self.url,
            uptime_check_interval: self.uptime_check_interval,
            enabled: self.enabled,
            ssl_check_enabled: self.ssl_check_enabled,
            request_method: self.request_method,
            follow_redirects: self.follow_redirects,
            force_no_cache: self.force_no_cache,
            latency_history_enabled: self.latency_history_enabled,
            ssl_expiry_threshold: self.ssl_expiry_threshold,
            integrations: self.integrations,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One interval of uptime status; `ended_at` is `None` while it is current
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UptimeEventRecord {
    pub id: i64,
    pub monitor_id: i64,
    pub status: UptimeStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUptimeEvent {
    pub monitor_id: i64,
    pub status: UptimeStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// One interval of certificate status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SslEventRecord {
    pub id: i64,
    pub monitor_id: i64,
    pub status: SslStatus,
    pub error: Option<String>,
    pub ssl_valid_until: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSslEvent {
    pub monitor_id: i64,
    pub status: SslStatus,
    pub error: Option<String>,
    pub ssl_valid_until: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyLog {
    pub id: i64,
    pub monitor_id: i64,
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Convert a timestamp to the stored Unix milliseconds
pub fn timestamp_to_i64(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Convert stored Unix milliseconds back to a timestamp
pub fn i64_to_timestamp(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// Integrations are stored as a comma separated list of `type:name` ids
pub fn integrations_to_column(integrations: &BTreeSet<IntegrationId>) -> String {
    integrations.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}

pub fn integrations_from_column(raw: &str) -> BTreeSet<IntegrationId> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| match part.parse() {
            Ok(id) => Some(id),
            Err(error) => {
                warn!("Ignoring stored integration id: {error}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integration_column_round_trip() {
        let ids: BTreeSet<IntegrationId> =
            ["slack:ops".parse().unwrap(), "email:team".parse().unwrap()].into_iter().collect();
        let column = integrations_to_column(&ids);
        assert_eq!(column, "email:team,slack:ops");
        assert_eq!(integrations_from_column(&column), ids);
    }

    #[test]
    fn test_integration_column_skips_garbage() {
        assert!(integrations_from_column("").is_empty());
        assert_eq!(integrations_from_column("bogus, slack:ops").len(), 1);
    }

    #[test]
    fn test_timestamp_conversion_keeps_millis() {
        let now = i64_to_timestamp(1_700_000_000_123);
        assert_eq!(timestamp_to_i64(now), 1_700_000_000_123);
    }
}
