use anyhow::{Result, anyhow};
use url::Url;

use crate::database::models::{Monitor, NewMonitor};

/// Validation results with specific error messages
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self { is_valid: true, error: None }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self { is_valid: false, error: Some(msg.into()) }
    }

    pub fn to_result(&self) -> Result<()> {
        if self.is_valid {
            Ok(())
        } else {
            Err(anyhow!(self.error.clone().unwrap_or_else(|| "Validation failed".to_string())))
        }
    }

    fn and_then(self, next: impl FnOnce() -> ValidationResult) -> ValidationResult {
        if self.is_valid { next() } else { self }
    }
}

/// Validate HTTP/HTTPS URL endpoint
pub fn validate_http_endpoint(target: &str) -> ValidationResult {
    if target.trim().is_empty() {
        return ValidationResult::err("URL cannot be empty");
    }

    match Url::parse(target) {
        Ok(url) => {
            let scheme = url.scheme();
            if scheme != "http" && scheme != "https" {
                return ValidationResult::err(format!(
                    "Invalid scheme '{scheme}'. Must be http or https"
                ));
            }

            if url.host_str().is_none() {
                return ValidationResult::err("URL must have a valid host");
            }

            ValidationResult::ok()
        }
        Err(e) => {
            if !target.contains("://") {
                ValidationResult::err("URL must include scheme (http:// or https://)")
            } else {
                ValidationResult::err(format!("Invalid URL: {e}"))
            }
        }
    }
}

/// Validate monitor name
pub fn validate_monitor_name(name: &str) -> ValidationResult {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return ValidationResult::err("Name cannot be empty");
    }

    if trimmed.len() > 100 {
        return ValidationResult::err("Name too long (max 100 characters)");
    }

    ValidationResult::ok()
}

/// Validate uptime check interval in seconds
pub fn validate_interval(interval: u64) -> ValidationResult {
    if interval == 0 {
        return ValidationResult::err("Interval must be at least 1 second");
    }

    if interval > 86400 {
        return ValidationResult::err("Interval too long (max 24 hours)");
    }

    ValidationResult::ok()
}

/// Validate the SSL expiry warning threshold in days
pub fn validate_ssl_expiry_threshold(days: u32) -> ValidationResult {
    if days > 365 {
        return ValidationResult::err("SSL expiry threshold too long (max 365 days)");
    }

    ValidationResult::ok()
}

fn validate_fields(name: &str, url: &str, interval: u64, ssl_expiry_threshold: u32) -> ValidationResult {
    validate_monitor_name(name)
        .and_then(|| validate_http_endpoint(url))
        .and_then(|| validate_interval(interval))
        .and_then(|| validate_ssl_expiry_threshold(ssl_expiry_threshold))
}

pub fn validate_new_monitor(monitor: &NewMonitor) -> ValidationResult {
    validate_fields(&monitor.name, &monitor.url, monitor.uptime_check_interval, monitor.ssl_expiry_threshold)
}

pub fn validate_monitor(monitor: &Monitor) -> ValidationResult {
    validate_fields(&monitor.name, &monitor.url, monitor.uptime_check_interval, monitor.ssl_expiry_threshold)
}
