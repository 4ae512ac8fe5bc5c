use std::{panic::AssertUnwindSafe, sync::Arc};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::RwLock;
use tracing::{debug, error};

use super::{EventKind, MonitorEvent};

/// A subscriber reacting to monitor events
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &MonitorEvent) -> anyhow::Result<()>;
}

/// Which events a subscription receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    All,
    Uptime,
    Ssl,
    Only(EventKind),
}

impl EventFilter {
    pub fn matches(&self, event: &MonitorEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Uptime => matches!(event, MonitorEvent::Uptime(_)),
            EventFilter::Ssl => matches!(event, MonitorEvent::Ssl(_)),
            EventFilter::Only(kind) => event.kind() == *kind,
        }
    }
}

/// Fans each event out to the matching handlers, in subscription order.
///
/// A failing or panicking handler is logged and skipped; the rest still run.
#[derive(Default)]
pub struct EventDispatcher {
    subscribers: RwLock<Vec<(EventFilter, Arc<dyn EventHandler>)>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, filter: EventFilter, handler: Arc<dyn EventHandler>) {
        debug!(handler = handler.name(), ?filter, "Subscribing event handler");
        self.subscribers.write().await.push((filter, handler));
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn dispatch(&self, event: MonitorEvent) {
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .subscribers
            .read()
            .await
            .iter()
            .filter(|(filter, _)| filter.matches(&event))
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        let monitor_id = event.monitor().id;
        let kind = event.kind();

        for handler in handlers {
            match AssertUnwindSafe(handler.handle(&event)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(monitor_id, ?kind, handler = handler.name(), "Event handler failed: {e:#}")
                }
                Err(_) => {
                    error!(monitor_id, ?kind, handler = handler.name(), "Event handler panicked")
                }
            }
        }
    }
}
