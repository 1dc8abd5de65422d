//! Time source for inode timestamps.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Host clock consulted whenever a timestamp is stamped.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time. Successive calls never go backwards.
    fn now(&self) -> SystemTime;
}

/// Wall clock clamped so that it never runs backwards.
///
/// If the system time steps back (NTP adjustment, manual change), the last
/// returned value is repeated until wall time catches up.
#[derive(Debug, Default)]
pub struct SystemClock {
    /// Last returned value, in nanoseconds since the Unix epoch.
    last_nanos: AtomicU64,
}

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        let wall: u64 = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        let previous: u64 = self.last_nanos.fetch_max(wall, Ordering::AcqRel);
        UNIX_EPOCH + Duration::from_nanos(previous.max(wall))
    }
}

/// Manually driven clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    /// Current time in nanoseconds since the Unix epoch.
    nanos: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at the given offset from the epoch.
    ///
    /// # Arguments
    /// * `since_epoch` - Initial time
    pub fn new(since_epoch: Duration) -> Self {
        Self {
            nanos: AtomicU64::new(u64::try_from(since_epoch.as_nanos()).unwrap_or(u64::MAX)),
        }
    }

    /// Move the clock forward.
    ///
    /// # Arguments
    /// * `by` - Amount to advance
    pub fn advance(&self, by: Duration) {
        let step: u64 = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        let _ = self
            .nanos
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_add(step))
            });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }
}
