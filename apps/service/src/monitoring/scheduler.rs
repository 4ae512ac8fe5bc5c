use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info};

use super::checker::UptimeChecker;
use super::lock::{LeaseGuard, UptimeCheckLockRegistry};
use super::ssl::SslChecker;
use super::types::CheckType;
use crate::database::Database;
use crate::database::models::Monitor;

/// SSL cadence, independent of the monitor's uptime interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub ssl_check_interval: Duration,
    pub ssl_initial_delay: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            ssl_check_interval: Duration::from_secs(86_400),
            ssl_initial_delay: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulingError {
    #[error("Invalid {check_type} check interval for monitor {monitor_id}")]
    InvalidInterval { monitor_id: i64, check_type: CheckType },
    #[error("No async runtime available to schedule monitor {monitor_id}")]
    NoRuntime { monitor_id: i64 },
}

/// One pass of a check against a monitor, as fired by a timer
#[async_trait::async_trait]
pub trait MonitorCheck: Send + Sync {
    async fn run(&self, monitor: &Monitor);
}

#[async_trait::async_trait]
impl MonitorCheck for UptimeChecker {
    async fn run(&self, monitor: &Monitor) {
        self.check(monitor, None).await;
    }
}

#[async_trait::async_trait]
impl MonitorCheck for SslChecker {
    async fn run(&self, monitor: &Monitor) {
        self.check(monitor).await;
    }
}

/// A live timer, as exposed to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledCheck {
    pub monitor_id: i64,
    pub check_type: CheckType,
    pub next_run: DateTime<Utc>,
}

struct ScheduledTask {
    handle: JoinHandle<()>,
    next_run: watch::Receiver<DateTime<Utc>>,
}

/// Owns at most one uptime and one SSL timer per monitor
pub struct CheckScheduler {
    db: Arc<dyn Database>,
    uptime_checker: Arc<dyn MonitorCheck>,
    ssl_checker: Arc<dyn MonitorCheck>,
    locks: Arc<UptimeCheckLockRegistry>,
    settings: SchedulerSettings,
    uptime_tasks: DashMap<i64, ScheduledTask>,
    ssl_tasks: DashMap<i64, ScheduledTask>,
}

impl CheckScheduler {
    pub fn new(
        db: Arc<dyn Database>,
        uptime_checker: Arc<dyn MonitorCheck>,
        ssl_checker: Arc<dyn MonitorCheck>,
        locks: Arc<UptimeCheckLockRegistry>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            db,
            uptime_checker,
            ssl_checker,
            locks,
            settings,
            uptime_tasks: DashMap::new(),
            ssl_tasks: DashMap::new(),
        }
    }

    /// Schedule every enabled monitor. A monitor that cannot be scheduled is
    /// logged and skipped.
    pub async fn initialize(&self) -> Result<()> {
        let monitors = self.db.fetch_by_enabled(true).await?;
        let mut scheduled = 0;

        for monitor in &monitors {
            match self.create_checks_for_monitor(monitor) {
                Ok(()) => scheduled += 1,
                Err(e) => error!(monitor_id = monitor.id, "Failed to schedule checks: {e}"),
            }
        }

        info!("Scheduled checks for {scheduled} of {} enabled monitors", monitors.len());
        Ok(())
    }

    /// (Re)create the timers of `monitor`, replacing any existing ones
    pub fn create_checks_for_monitor(&self, monitor: &Monitor) -> Result<(), SchedulingError> {
        if monitor.uptime_check_interval == 0 {
            return Err(SchedulingError::InvalidInterval {
                monitor_id: monitor.id,
                check_type: CheckType::Uptime,
            });
        }
        if monitor.ssl_check_enabled && self.settings.ssl_check_interval.is_zero() {
            return Err(SchedulingError::InvalidInterval {
                monitor_id: monitor.id,
                check_type: CheckType::Ssl,
            });
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(SchedulingError::NoRuntime { monitor_id: monitor.id });
        }

        self.remove_checks_of_monitor(monitor.id);

        let uptime = self.spawn_timer(
            monitor.clone(),
            CheckType::Uptime,
            Duration::ZERO,
            Duration::from_secs(monitor.uptime_check_interval),
        );
        self.uptime_tasks.insert(monitor.id, uptime);

        if monitor.ssl_check_enabled {
            let ssl = self.spawn_timer(
                monitor.clone(),
                CheckType::Ssl,
                self.settings.ssl_initial_delay,
                self.settings.ssl_check_interval,
            );
            self.ssl_tasks.insert(monitor.id, ssl);
        }

        debug!(monitor_id = monitor.id, ssl = monitor.ssl_check_enabled, "Checks scheduled");
        Ok(())
    }

    pub fn remove_checks_of_monitor(&self, monitor_id: i64) {
        for tasks in [&self.uptime_tasks, &self.ssl_tasks] {
            if let Some((_, task)) = tasks.remove(&monitor_id) {
                task.handle.abort();
            }
        }
    }

    pub fn remove_all_checks(&self) {
        for tasks in [&self.uptime_tasks, &self.ssl_tasks] {
            tasks.iter().for_each(|entry| entry.value().handle.abort());
            tasks.clear();
        }
        debug!("All scheduled checks removed");
    }

    pub fn get_next_check(&self, check_type: CheckType, monitor_id: i64) -> Option<DateTime<Utc>> {
        self.tasks(check_type).get(&monitor_id).map(|task| *task.next_run.borrow())
    }

    pub fn scheduled_uptime_checks(&self) -> Vec<ScheduledCheck> {
        self.snapshot(CheckType::Uptime)
    }

    pub fn scheduled_ssl_checks(&self) -> Vec<ScheduledCheck> {
        self.snapshot(CheckType::Ssl)
    }

    fn tasks(&self, check_type: CheckType) -> &DashMap<i64, ScheduledTask> {
        match check_type {
            CheckType::Uptime => &self.uptime_tasks,
            CheckType::Ssl => &self.ssl_tasks,
        }
    }

    fn snapshot(&self, check_type: CheckType) -> Vec<ScheduledCheck> {
        let mut checks: Vec<ScheduledCheck> = self
            .tasks(check_type)
            .iter()
            .map(|entry| ScheduledCheck {
                monitor_id: *entry.key(),
                check_type,
                next_run: *entry.value().next_run.borrow(),
            })
            .collect();
        checks.sort_by_key(|check| check.monitor_id);
        checks
    }

    fn spawn_timer(
        &self,
        monitor: Monitor,
        check_type: CheckType,
        initial_delay: Duration,
        period: Duration,
    ) -> ScheduledTask {
        let (next_tx, next_rx) = watch::channel(Utc::now() + initial_delay);
        let locks = Arc::clone(&self.locks);
        let checker = match check_type {
            CheckType::Uptime => Arc::clone(&self.uptime_checker),
            CheckType::Ssl => Arc::clone(&self.ssl_checker),
        };

        let handle = tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + initial_delay, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                timer.tick().await;
                next_tx.send_replace(Utc::now() + period);

                let lease = match check_type {
                    CheckType::Uptime => match LeaseGuard::acquire(&locks, monitor.id) {
                        Some(lease) => Some(lease),
                        None => {
                            debug!(monitor_id = monitor.id, "Previous uptime check still running, skipping");
                            continue;
                        }
                    },
                    CheckType::Ssl => None,
                };

                let checker = Arc::clone(&checker);
                let monitor = monitor.clone();
                tokio::spawn(async move {
                    let _lease = lease;
                    checker.run(&monitor).await;
                });
            }
        });

        ScheduledTask { handle, next_run: next_rx }
    }
}

impl Drop for CheckScheduler {
    fn drop(&mut self) {
        self.remove_all_checks();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::database::MonitorRepository;
    use crate::database::memory::MemoryDatabase;
    use crate::database::models::NewMonitor;

    /// Counts runs; each run takes `duration` of (virtual) time
    struct CountingCheck {
        runs: AtomicUsize,
        duration: Duration,
    }

    impl CountingCheck {
        fn new(duration: Duration) -> Arc<Self> {
            Arc::new(Self { runs: AtomicUsize::new(0), duration })
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl MonitorCheck for CountingCheck {
        async fn run(&self, _: &Monitor) {
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.duration).await;
        }
    }

    struct Fixture {
        scheduler: CheckScheduler,
        uptime: Arc<CountingCheck>,
        ssl: Arc<CountingCheck>,
        db: Arc<MemoryDatabase>,
    }

    fn fixture(uptime_duration: Duration) -> Fixture {
        let db = Arc::new(MemoryDatabase::new());
        let uptime = CountingCheck::new(uptime_duration);
        let ssl = CountingCheck::new(Duration::ZERO);
        let settings = SchedulerSettings {
            ssl_check_interval: Duration::from_secs(3600),
            ssl_initial_delay: Duration::from_secs(10),
        };
        let scheduler = CheckScheduler::new(
            db.clone(),
            uptime.clone(),
            ssl.clone(),
            Arc::new(UptimeCheckLockRegistry::default()),
            settings,
        );
        Fixture { scheduler, uptime, ssl, db }
    }

    async fn monitor(db: &MemoryDatabase, name: &str, enabled: bool, ssl: bool) -> Monitor {
        let mut new_monitor = NewMonitor::new(name, format!("https://{name}.test"));
        new_monitor.enabled = enabled;
        new_monitor.ssl_check_enabled = ssl;
        db.insert_monitor(&new_monitor).await.unwrap()
    }

    /// Let spawned tasks observe the current virtual time
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_schedules_enabled_monitors() -> Result<()> {
        let f = fixture(Duration::ZERO);
        let with_ssl = monitor(&f.db, "with-ssl", true, true).await;
        let without_ssl = monitor(&f.db, "without-ssl", true, false).await;
        monitor(&f.db, "disabled", false, true).await;

        f.scheduler.initialize().await?;

        let uptime_ids: Vec<i64> = f.scheduler.scheduled_uptime_checks().iter().map(|c| c.monitor_id).collect();
        let ssl_ids: Vec<i64> = f.scheduler.scheduled_ssl_checks().iter().map(|c| c.monitor_id).collect();
        assert_eq!(uptime_ids, vec![with_ssl.id, without_ssl.id]);
        assert_eq!(ssl_ids, vec![with_ssl.id]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_uptime_checks_fire_on_interval() -> Result<()> {
        let f = fixture(Duration::ZERO);
        let monitor = monitor(&f.db, "ticking", true, false).await;
        f.scheduler.create_checks_for_monitor(&monitor)?;

        settle().await;
        assert_eq!(f.uptime.runs(), 1);

        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(f.uptime.runs(), 2);
        assert_eq!(f.ssl.runs(), 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_uptime_fire_is_skipped() -> Result<()> {
        // Each check outlives one interval, so the next fire finds the lease taken
        let f = fixture(Duration::from_secs(90));
        let monitor = monitor(&f.db, "slow", true, false).await;
        f.scheduler.create_checks_for_monitor(&monitor)?;

        settle().await;
        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(f.uptime.runs(), 1);

        // First check ends at 90s and releases its lease before the 120s fire
        tokio::time::advance(Duration::from_secs(40)).await;
        settle().await;
        tokio::time::advance(Duration::from_secs(20)).await;
        settle().await;
        assert_eq!(f.uptime.runs(), 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_ssl_check_waits_for_initial_delay() -> Result<()> {
        let f = fixture(Duration::ZERO);
        let monitor = monitor(&f.db, "secure", true, true).await;
        f.scheduler.create_checks_for_monitor(&monitor)?;

        settle().await;
        assert_eq!(f.ssl.runs(), 0);

        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(f.ssl.runs(), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_check_and_removal() -> Result<()> {
        let f = fixture(Duration::ZERO);
        let monitor = monitor(&f.db, "removable", true, true).await;

        assert!(f.scheduler.get_next_check(CheckType::Uptime, monitor.id).is_none());
        f.scheduler.create_checks_for_monitor(&monitor)?;
        assert!(f.scheduler.get_next_check(CheckType::Uptime, monitor.id).is_some());
        assert!(f.scheduler.get_next_check(CheckType::Ssl, monitor.id).is_some());

        f.scheduler.remove_checks_of_monitor(monitor.id);
        assert!(f.scheduler.get_next_check(CheckType::Uptime, monitor.id).is_none());
        assert!(f.scheduler.get_next_check(CheckType::Ssl, monitor.id).is_none());

        settle().await;
        tokio::time::advance(Duration::from_secs(120)).await;
        settle().await;
        assert_eq!(f.uptime.runs(), 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescheduling_replaces_timers() -> Result<()> {
        let f = fixture(Duration::ZERO);
        let mut monitor = monitor(&f.db, "toggled", true, true).await;
        f.scheduler.create_checks_for_monitor(&monitor)?;

        monitor.ssl_check_enabled = false;
        f.scheduler.create_checks_for_monitor(&monitor)?;

        assert_eq!(f.scheduler.scheduled_uptime_checks().len(), 1);
        assert!(f.scheduler.scheduled_ssl_checks().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_a_scheduling_error() -> Result<()> {
        let f = fixture(Duration::ZERO);
        let mut monitor = monitor(&f.db, "broken", true, false).await;
        monitor.uptime_check_interval = 0;

        let result = f.scheduler.create_checks_for_monitor(&monitor);
        assert_eq!(
            result,
            Err(SchedulingError::InvalidInterval { monitor_id: monitor.id, check_type: CheckType::Uptime })
        );
        assert!(f.scheduler.scheduled_uptime_checks().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_all_checks() -> Result<()> {
        let f = fixture(Duration::ZERO);
        monitor(&f.db, "one", true, true).await;
        monitor(&f.db, "two", true, false).await;
        f.scheduler.initialize().await?;

        f.scheduler.remove_all_checks();
        assert!(f.scheduler.scheduled_uptime_checks().is_empty());
        assert!(f.scheduler.scheduled_ssl_checks().is_empty());
        Ok(())
    }
}
