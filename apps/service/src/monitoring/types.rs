use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// The two independent check pipelines a monitor can have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    Uptime,
    Ssl,
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckType::Uptime => write!(f, "uptime"),
            CheckType::Ssl => write!(f, "ssl"),
        }
    }
}

/// Request method used by the uptime check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "HEAD" => Ok(HttpMethod::Head),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown value: {0}")]
pub struct ParseStatusError(pub String);

/// Reachability status of a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UptimeStatus {
    Up,
    Down,
}

impl UptimeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UptimeStatus::Up => "UP",
            UptimeStatus::Down => "DOWN",
        }
    }
}

impl fmt::Display for UptimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UptimeStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UP" => Ok(UptimeStatus::Up),
            "DOWN" => Ok(UptimeStatus::Down),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// Certificate health of a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SslStatus {
    Valid,
    WillExpire,
    Invalid,
}

impl SslStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslStatus::Valid => "VALID",
            SslStatus::WillExpire => "WILL_EXPIRE",
            SslStatus::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for SslStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SslStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VALID" => Ok(SslStatus::Valid),
            "WILL_EXPIRE" => Ok(SslStatus::WillExpire),
            "INVALID" => Ok(SslStatus::Invalid),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// Outcome of one evaluation step of an HTTP check.
///
/// Only `Continue` may proceed to a further step; `Redirected` asks the
/// caller to send the next request, `Finished` means an UP or DOWN event has
/// already been dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    Continue,
    Redirected { uri: Url, visited: Vec<Url> },
    Finished,
}

/// What the evaluator needs from one HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCheckResponse {
    pub status: u16,
    pub location: Option<String>,
    pub latency_ms: u64,
}

/// Why an uptime check ended in DOWN
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    #[error("{0}")]
    Transport(String),
    #[error("Malformed HTTP response: {0}")]
    MalformedResponse(String),
    #[error("Ineligible status code: {0}")]
    IneligibleStatusCode(u16),
    #[error("{0}")]
    InvalidRedirection(String),
    #[error("Redirect loop detected")]
    RedirectLoop,
    #[error("Invalid URL [{url}]: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl CheckError {
    /// Failures where no response was received and another attempt may help
    pub fn is_retryable(&self) -> bool {
        matches!(self, CheckError::Transport(_) | CheckError::MalformedResponse(_))
    }
}

/// The part of a server certificate the SSL check cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CertificateInfo {
    pub valid_to: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SslValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("TLS handshake failed: {0}")]
    Handshake(String),
    #[error("The server did not present a certificate")]
    MissingCertificate,
    #[error("Certificate could not be parsed: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_through_strings() {
        assert_eq!("WILL_EXPIRE".parse::<SslStatus>(), Ok(SslStatus::WillExpire));
        assert_eq!(UptimeStatus::Down.to_string(), "DOWN");
        assert!("SIDEWAYS".parse::<UptimeStatus>().is_err());
    }

    #[test]
    fn test_http_method_parsing_is_case_insensitive() {
        assert_eq!("head".parse::<HttpMethod>(), Ok(HttpMethod::Head));
        assert_eq!(reqwest::Method::from(HttpMethod::Get), reqwest::Method::GET);
    }

    #[test]
    fn test_check_error_messages() {
        assert_eq!(CheckError::IneligibleStatusCode(500).to_string(), "Ineligible status code: 500");
        assert_eq!(CheckError::RedirectLoop.to_string(), "Redirect loop detected");
    }
}
