use std::{sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::time::Instant;
use tracing::debug;

/// Default lease length for an uptime check
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(300_000);

/// Per-monitor leases guarding against overlapping uptime checks.
///
/// A lease expires on its own after `timeout`, so a hung check cannot block
/// its monitor forever. Scoped to this process.
#[derive(Debug)]
pub struct UptimeCheckLockRegistry {
    active_checks: DashMap<i64, Instant>,
    timeout: Duration,
}

impl Default for UptimeCheckLockRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

impl UptimeCheckLockRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self { active_checks: DashMap::new(), timeout }
    }

    /// Take the lease unless a live one exists. Never blocks.
    pub fn try_acquire(&self, monitor_id: i64) -> bool {
        let now = Instant::now();
        let expires_at = now + self.timeout;

        // The entry guard holds the shard lock, check-and-set is atomic
        match self.active_checks.entry(monitor_id) {
            Entry::Occupied(mut entry) => {
                if *entry.get() > now {
                    debug!(monitor_id, "Uptime check is already running, failed to acquire lock");
                    false
                } else {
                    entry.insert(expires_at);
                    debug!(monitor_id, "Previous lease expired, acquired lock");
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(expires_at);
                debug!(monitor_id, "Uptime check is not running, acquired lock");
                true
            }
        }
    }

    pub fn release(&self, monitor_id: i64) {
        self.active_checks.remove(&monitor_id);
        debug!(monitor_id, "Uptime check is completed, released lock");
    }

    pub fn is_locked(&self, monitor_id: i64) -> bool {
        self.active_checks.get(&monitor_id).is_some_and(|expiry| *expiry > Instant::now())
    }
}

/// Releases a lease when dropped, including on panic or cancellation
pub struct LeaseGuard {
    registry: Arc<UptimeCheckLockRegistry>,
    monitor_id: i64,
}

impl LeaseGuard {
    /// `None` when the monitor is already being checked
    pub fn acquire(registry: &Arc<UptimeCheckLockRegistry>, monitor_id: i64) -> Option<Self> {
        registry
            .try_acquire(monitor_id)
            .then(|| Self { registry: Arc::clone(registry), monitor_id })
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.registry.release(self.monitor_id);
    }
}
