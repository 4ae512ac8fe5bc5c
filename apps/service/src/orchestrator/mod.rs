/// Orchestrator module - wires and runs the monitoring engine
///
/// The orchestrator:
/// - Opens the database and validates the configured integrations
/// - Registers the event handlers on the dispatcher
/// - Owns the scheduler, the checkers and the monitor lifecycle service
/// - Runs the retention task and tears everything down on shutdown
pub mod monitors;
pub mod retention;


pub use monitors::{MonitorError, MonitorService, MonitorStats, NextChecks};
pub use retention::{RetentionCleanup, RetentionPolicy};

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::{Database, DatabaseImpl, initialize_database};
use crate::events::{EventDispatcher, EventFilter, EventHandler};
use crate::handlers::{
    DatabaseEventHandler, DiscordFormatter, LogEventHandler, MessageFormatter, PagerdutyEventHandler,
    PlainTextFormatter, SlackFormatter, TelegramFormatter, TextNotificationHandler,
};
use crate::integrations::senders::{
    DiscordSender, EmailSender, NotificationSender, PagerdutySender, SlackSender, TelegramSender, http_client,
};
use crate::integrations::{IntegrationRepository, IntegrationType};
use crate::monitoring::{
    CheckScheduler, HttpCheckResponseEvaluator, HttpTransport, ReqwestTransport, RustlsSslValidator, SslChecker,
    SslValidator, UptimeCheckLockRegistry, UptimeChecker,
};
use crate::pool::open_pool;

const SSL_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

pub type TextSender = (Arc<dyn NotificationSender>, Box<dyn MessageFormatter>);

fn text_sender(
    sender: impl NotificationSender + 'static,
    formatter: impl MessageFormatter + 'static,
) -> TextSender {
    (Arc::new(sender), Box::new(formatter))
}

/// The outbound collaborators of the engine
pub struct AppParts {
    pub transport: Arc<dyn HttpTransport>,
    pub ssl_validator: Arc<dyn SslValidator>,
    pub text_senders: Vec<TextSender>,
    pub pagerduty: Option<PagerdutySender>,
}

impl AppParts {
    /// Real network transports for everything the configuration asks for
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = http_client()?;
        let mut text_senders = vec![
            text_sender(SlackSender::new(client.clone()), SlackFormatter),
            text_sender(DiscordSender::new(client.clone()), DiscordFormatter),
            text_sender(TelegramSender::new(client.clone()), TelegramFormatter),
        ];
        if let Some(smtp) = &config.smtp {
            text_senders.push(text_sender(EmailSender::from_config(smtp)?, PlainTextFormatter));
        }

        Ok(Self {
            transport: Arc::new(ReqwestTransport::new(config.read_timeout())?),
            ssl_validator: Arc::new(RustlsSslValidator::new(SSL_HANDSHAKE_TIMEOUT)?),
            text_senders,
            pagerduty: Some(PagerdutySender::new(client)),
        })
    }
}

/// Main application for the vigil service
pub struct App {
    config: Config,
    database: Arc<dyn Database>,
    dispatcher: Arc<EventDispatcher>,
    integrations: Arc<IntegrationRepository>,
    uptime_checker: Arc<UptimeChecker>,
    ssl_checker: Arc<SslChecker>,
    scheduler: Arc<CheckScheduler>,
    monitors: MonitorService,
    retention_handle: Option<tokio::task::JoinHandle<()>>,
}

impl App {
    /// Open the database, build the engine and start scheduling
    pub async fn bootstrap(config: Config) -> Result<Self> {
        let database = Self::open_database(&config).await?;
        let parts = AppParts::from_config(&config)?;
        let mut app = Self::build(config, database, parts).await?;
        app.start().await?;
        Ok(app)
    }

    pub async fn open_database(config: &Config) -> Result<Arc<dyn Database>> {
        let pool = open_pool(&config.database.path).await?;
        {
            let conn = pool.get().await.map_err(|e| anyhow::anyhow!("Failed to get connection: {e}"))?;
            initialize_database(&*conn).await?;
        }
        info!(path = %config.database.path.display(), "Database ready");
        Ok(Arc::new(DatabaseImpl::new_from_pool(pool)))
    }

    /// Wire every component without starting any timer
    pub async fn build(config: Config, database: Arc<dyn Database>, parts: AppParts) -> Result<Self> {
        let integrations =
            Arc::new(IntegrationRepository::new(config.integrations.to_configs(), config.smtp.is_some())?);
        Self::sanitize_monitor_integrations(&database, &integrations).await?;

        let dispatcher = Arc::new(EventDispatcher::new());
        dispatcher.subscribe(EventFilter::All, Arc::new(DatabaseEventHandler::new(database.clone()))).await;
        if config.app.log_event_handler {
            dispatcher.subscribe(EventFilter::All, Arc::new(LogEventHandler::new())).await;
        }

        for (sender, formatter) in parts.text_senders {
            let integration_type = sender.integration_type();
            if !integrations.has_enabled(integration_type) {
                continue;
            }
            let handler: Arc<dyn EventHandler> =
                Arc::new(TextNotificationHandler::new(sender, formatter, integrations.clone()));
            Self::subscribe_status_events(&dispatcher, handler).await;
            info!(%integration_type, "Notification handler registered");
        }

        if let Some(pagerduty) = parts.pagerduty.filter(|_| integrations.has_enabled(IntegrationType::Pagerduty)) {
            let handler: Arc<dyn EventHandler> =
                Arc::new(PagerdutyEventHandler::new(pagerduty, integrations.clone()));
            Self::subscribe_status_events(&dispatcher, handler).await;
            info!(integration_type = %IntegrationType::Pagerduty, "Notification handler registered");
        }

        let evaluator = HttpCheckResponseEvaluator::new(dispatcher.clone(), database.clone());
        let uptime_checker =
            Arc::new(UptimeChecker::new(parts.transport, evaluator, database.clone(), config.retry_policy()));
        let ssl_checker = Arc::new(SslChecker::new(parts.ssl_validator, dispatcher.clone(), database.clone()));
        let locks = Arc::new(UptimeCheckLockRegistry::new(config.lock_timeout()));
        let scheduler = Arc::new(CheckScheduler::new(
            database.clone(),
            uptime_checker.clone(),
            ssl_checker.clone(),
            locks,
            config.scheduler_settings(),
        ));
        let monitors = MonitorService::new(database.clone(), scheduler.clone(), integrations.clone());

        Ok(Self {
            config,
            database,
            dispatcher,
            integrations,
            uptime_checker,
            ssl_checker,
            scheduler,
            monitors,
            retention_handle: None,
        })
    }

    async fn subscribe_status_events(dispatcher: &EventDispatcher, handler: Arc<dyn EventHandler>) {
        dispatcher.subscribe(EventFilter::Uptime, handler.clone()).await;
        dispatcher.subscribe(EventFilter::Ssl, handler).await;
    }

    /// Drop integration ids that are no longer configured from every monitor
    async fn sanitize_monitor_integrations(
        database: &Arc<dyn Database>,
        integrations: &IntegrationRepository,
    ) -> Result<()> {
        for monitor in database.fetch_all().await? {
            let retained = integrations.retain_configured(&monitor.integrations);
            if retained != monitor.integrations {
                let dropped: Vec<String> =
                    monitor.integrations.difference(&retained).map(ToString::to_string).collect();
                warn!(
                    monitor_id = monitor.id,
                    monitor = %monitor.name,
                    "Removing unknown integrations from monitor: [{}]",
                    dropped.join(", ")
                );
                database.update_integrations(monitor.id, &retained).await?;
            }
        }
        Ok(())
    }

    /// Schedule every enabled monitor and start the retention task
    pub async fn start(&mut self) -> Result<()> {
        self.scheduler.initialize().await?;

        let cleanup = RetentionCleanup::new(self.database.clone(), RetentionPolicy::from(&self.config.app));
        self.retention_handle = Some(cleanup.start_periodic_cleanup());
        info!("vigil started");
        Ok(())
    }

    /// Run until Ctrl-C, then shut down
    pub async fn run_until_shutdown(mut self) -> Result<()> {
        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");
        self.shutdown();
        Ok(())
    }

    pub fn shutdown(&mut self) {
        self.scheduler.remove_all_checks();
        if let Some(handle) = self.retention_handle.take() {
            handle.abort();
        }
        info!("vigil stopped");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.database
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn integrations(&self) -> &Arc<IntegrationRepository> {
        &self.integrations
    }

    pub fn uptime_checker(&self) -> &Arc<UptimeChecker> {
        &self.uptime_checker
    }

    pub fn ssl_checker(&self) -> &Arc<SslChecker> {
        &self.ssl_checker
    }

    pub fn scheduler(&self) -> &Arc<CheckScheduler> {
        &self.scheduler
    }

    pub fn monitors(&self) -> &MonitorService {
        &self.monitors
    }
}
