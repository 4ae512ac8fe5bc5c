use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use tracing::{debug, warn};
use url::Url;

use super::evaluator::HttpCheckResponseEvaluator;
use super::request::{self, RequestDescriptor};
use super::types::{CheckError, CheckResult, HttpCheckResponse};
use crate::database::Database;
use crate::database::models::Monitor;

/// Default read timeout of a single probe
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Status and `Location` of a response; the body is never read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHttpResponse {
    pub status: u16,
    pub location: Option<String>,
}

/// Outbound HTTP used by the uptime check
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: RequestDescriptor) -> Result<RawHttpResponse, CheckError>;
}

/// reqwest transport that never follows redirects on its own
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(read_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(read_timeout)
            .redirect(Policy::none())
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: RequestDescriptor) -> Result<RawHttpResponse, CheckError> {
        let RequestDescriptor { method, url, headers } = request;

        let response = self
            .client
            .request(method.into(), url.clone())
            .headers(headers)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&url, e))?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        Ok(RawHttpResponse { status: response.status().as_u16(), location })
    }
}

fn classify_reqwest_error(url: &Url, error: reqwest::Error) -> CheckError {
    let message = error_chain(&error);
    if error.is_builder() {
        CheckError::InvalidUrl { url: url.to_string(), reason: message }
    } else if error.is_decode() || error.is_body() {
        CheckError::MalformedResponse(message)
    } else if error.is_timeout() {
        CheckError::Transport(format!("Request timed out: {message}"))
    } else {
        CheckError::Transport(message)
    }
}

/// reqwest's own message is terse, the causes carry the useful part
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Attempts after the first failure, with exponential backoff between them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retry_count: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { retry_count: 2, initial_delay: Duration::from_millis(500), multiplier: 3 }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (zero based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.initial_delay.saturating_mul(self.multiplier.saturating_pow(retry))
    }
}

/// Called with the re-read monitor once a check has completed
pub type DoAfter = Box<dyn FnOnce(Monitor) + Send>;

/// Drives one uptime check: request, evaluate, follow redirects until finished
pub struct UptimeChecker {
    transport: Arc<dyn HttpTransport>,
    evaluator: HttpCheckResponseEvaluator,
    db: Arc<dyn Database>,
    retry: RetryPolicy,
}

impl UptimeChecker {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        evaluator: HttpCheckResponseEvaluator,
        db: Arc<dyn Database>,
        retry: RetryPolicy,
    ) -> Self {
        Self { transport, evaluator, db, retry }
    }

    pub async fn check(&self, monitor: &Monitor, do_after: Option<DoAfter>) {
        debug!(monitor = %monitor.name, url = %monitor.url, "Starting uptime check");

        match Url::parse(&monitor.url) {
            Ok(start) => self.follow_chain(monitor, start).await,
            Err(e) => {
                let error = CheckError::InvalidUrl { url: monitor.url.clone(), reason: e.to_string() };
                self.evaluator.evaluate_error(monitor, error).await;
            }
        }

        debug!(monitor = %monitor.name, "Uptime check finished");

        if let Some(do_after) = do_after {
            match self.db.find_by_id(monitor.id).await {
                Ok(Some(up_to_date)) => {
                    debug!(monitor = %up_to_date.name, "Calling do_after hook");
                    do_after(up_to_date);
                }
                Ok(None) => debug!(monitor_id = monitor.id, "Monitor is gone, skipping do_after hook"),
                Err(e) => warn!(monitor_id = monitor.id, "Failed to re-read monitor: {e:#}"),
            }
        }
    }

    async fn follow_chain(&self, monitor: &Monitor, start: Url) {
        let mut uri = start;
        let mut visited: Vec<Url> = Vec::new();

        loop {
            if !visited.contains(&uri) {
                visited.push(uri.clone());
            }

            let response = match self.send_with_retry(monitor, &uri).await {
                Ok(response) => response,
                Err(error) => {
                    self.evaluator.evaluate_error(monitor, error).await;
                    return;
                }
            };

            match self.evaluator.evaluate_response(monitor, &response, &visited).await {
                CheckResult::Redirected { uri: next, visited: next_visited } => {
                    uri = next;
                    visited = next_visited;
                }
                CheckResult::Continue => {
                    warn!(monitor_id = monitor.id, "HTTP uptime check returned Continue unexpectedly");
                    return;
                }
                CheckResult::Finished => {
                    debug!(monitor_id = monitor.id, "HTTP uptime check finished");
                    return;
                }
            }
        }
    }

    async fn send_with_retry(&self, monitor: &Monitor, uri: &Url) -> Result<HttpCheckResponse, CheckError> {
        let mut retry = 0;
        loop {
            match self.send(monitor, uri).await {
                Err(error) if error.is_retryable() && retry < self.retry.retry_count => {
                    let delay = self.retry.delay_for(retry);
                    debug!(monitor_id = monitor.id, %uri, ?delay, "Request failed, retrying: {error}");
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                other => return other,
            }
        }
    }

    async fn send(&self, monitor: &Monitor, uri: &Url) -> Result<HttpCheckResponse, CheckError> {
        debug!(monitor = %monitor.name, %uri, "Sending HTTP request");
        let request = request::from_monitor(monitor, uri);

        let start = Instant::now();
        let raw = self.transport.send(request).await?;
        let latency_ms = start.elapsed().as_millis() as u64;

        Ok(HttpCheckResponse { status: raw.status, location: raw.location, latency_ms })
    }
}
