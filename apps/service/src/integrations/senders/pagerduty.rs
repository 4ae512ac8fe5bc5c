use reqwest::Client;
use serde::Serialize;

use super::{SenderError, ensure_success};

pub const PAGERDUTY_EVENTS_URL: &str = "https://events.pagerduty.com/v2/enqueue";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PagerdutySeverity {
    Critical,
    Warning,
}

#[derive(Debug, Serialize)]
struct TriggerPayload<'a> {
    summary: &'a str,
    source: &'a str,
    severity: PagerdutySeverity,
}

#[derive(Debug, Serialize)]
#[serde(tag = "event_action", rename_all = "lowercase")]
enum EventRequest<'a> {
    Trigger { routing_key: &'a str, dedup_key: &'a str, payload: TriggerPayload<'a> },
    Resolve { routing_key: &'a str, dedup_key: &'a str },
}

/// PagerDuty Events API v2 client
pub struct PagerdutySender {
    client: Client,
    events_url: String,
}

impl PagerdutySender {
    pub fn new(client: Client) -> Self {
        Self::with_events_url(client, PAGERDUTY_EVENTS_URL)
    }

    pub fn with_events_url(client: Client, events_url: impl Into<String>) -> Self {
        Self { client, events_url: events_url.into() }
    }

    pub async fn trigger(
        &self,
        routing_key: &str,
        dedup_key: &str,
        summary: &str,
        source: &str,
        severity: PagerdutySeverity,
    ) -> Result<(), SenderError> {
        self.enqueue(&EventRequest::Trigger {
            routing_key,
            dedup_key,
            payload: TriggerPayload { summary, source, severity },
        })
        .await
    }

    pub async fn resolve(&self, routing_key: &str, dedup_key: &str) -> Result<(), SenderError> {
        self.enqueue(&EventRequest::Resolve { routing_key, dedup_key }).await
    }

    async fn enqueue(&self, request: &EventRequest<'_>) -> Result<(), SenderError> {
        let response = self.client.post(&self.events_url).json(request).send().await?;
        ensure_success("PagerDuty", response).await
    }
}
