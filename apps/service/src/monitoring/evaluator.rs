use std::sync::Arc;

use tracing::{debug, error};
use url::Url;

use super::types::{CheckError, CheckResult, HttpCheckResponse};
use crate::database::Database;
use crate::database::models::{Monitor, UptimeEventRecord};
use crate::events::{EventDispatcher, MonitorEvent};

const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

fn is_success(status: u16) -> bool {
    (200..=299).contains(&status)
}

fn is_redirect(status: u16) -> bool {
    REDIRECT_STATUSES.contains(&status)
}

/// Turns HTTP responses and transport failures into UP, DOWN and redirect events.
///
/// Evaluation is a chain of steps where every step may finish early; only a
/// [`CheckResult::Continue`] lets the next step run.
pub struct HttpCheckResponseEvaluator {
    dispatcher: Arc<EventDispatcher>,
    db: Arc<dyn Database>,
}

impl HttpCheckResponseEvaluator {
    pub fn new(dispatcher: Arc<EventDispatcher>, db: Arc<dyn Database>) -> Self {
        Self { dispatcher, db }
    }

    pub async fn evaluate_response(
        &self,
        monitor: &Monitor,
        response: &HttpCheckResponse,
        visited: &[Url],
    ) -> CheckResult {
        match self.check_status_and_redirection(monitor, response, visited).await {
            CheckResult::Continue => self.dispatch_up(monitor, response).await,
            other => other,
        }
    }

    /// Map a failure without a usable response to a DOWN event
    pub async fn evaluate_error(&self, monitor: &Monitor, error: CheckError) -> CheckResult {
        self.dispatch_down(monitor, None, error).await
    }

    async fn check_status_and_redirection(
        &self,
        monitor: &Monitor,
        response: &HttpCheckResponse,
        visited: &[Url],
    ) -> CheckResult {
        let status = response.status;

        if is_success(status) {
            debug!(monitor_id = monitor.id, status, "Status check passed");
            return CheckResult::Continue;
        }

        if is_redirect(status) && monitor.follow_redirects {
            debug!(monitor_id = monitor.id, status, "Redirect detected, following to new location");
            return self.check_redirection(monitor, response, visited).await;
        }

        debug!(monitor_id = monitor.id, status, "Status check failed");
        let error = if is_redirect(status) {
            CheckError::InvalidRedirection(
                "The request was redirected, but the followRedirects option is disabled".to_string(),
            )
        } else {
            CheckError::IneligibleStatusCode(status)
        };
        self.dispatch_down(monitor, Some(status), error).await
    }

    async fn check_redirection(
        &self,
        monitor: &Monitor,
        response: &HttpCheckResponse,
        visited: &[Url],
    ) -> CheckResult {
        let Some(location) = response.location.as_deref() else {
            let error = CheckError::InvalidRedirection(
                "Invalid redirection without a Location header".to_string(),
            );
            return self.dispatch_down(monitor, Some(response.status), error).await;
        };

        let uri = match resolve_location(&monitor.url, location) {
            Ok(uri) => uri,
            Err(reason) => {
                let error = CheckError::InvalidRedirection(format!(
                    "Invalid redirection to [{location}]: {reason}"
                ));
                return self.dispatch_down(monitor, Some(response.status), error).await;
            }
        };

        self.dispatcher.dispatch(MonitorEvent::redirect(monitor.clone(), uri.clone())).await;

        if visited.contains(&uri) {
            return self.dispatch_down(monitor, Some(response.status), CheckError::RedirectLoop).await;
        }

        let mut visited = visited.to_vec();
        visited.push(uri.clone());
        CheckResult::Redirected { uri, visited }
    }

    async fn previous_event(&self, monitor: &Monitor) -> Result<Option<UptimeEventRecord>, ()> {
        self.db.get_previous_uptime_event(monitor.id).await.map_err(|e| {
            error!(monitor_id = monitor.id, "Failed to look up the previous uptime event: {e:#}")
        })
    }

    async fn dispatch_down(
        &self,
        monitor: &Monitor,
        status: Option<u16>,
        error: CheckError,
    ) -> CheckResult {
        if let Ok(previous) = self.previous_event(monitor).await {
            self.dispatcher
                .dispatch(MonitorEvent::down(monitor.clone(), status, error, previous))
                .await;
        }
        CheckResult::Finished
    }

    async fn dispatch_up(&self, monitor: &Monitor, response: &HttpCheckResponse) -> CheckResult {
        if let Ok(previous) = self.previous_event(monitor).await {
            self.dispatcher
                .dispatch(MonitorEvent::up(
                    monitor.clone(),
                    response.status,
                    response.latency_ms,
                    previous,
                ))
                .await;
        }
        CheckResult::Finished
    }
}

/// Absolute when the header starts with `http`, otherwise relative to the monitor URL
fn resolve_location(original_url: &str, location: &str) -> Result<Url, url::ParseError> {
    if location.starts_with("http") {
        Url::parse(location)
    } else {
        Url::parse(original_url)?.join(location)
    }
}
