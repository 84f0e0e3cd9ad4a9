//! Process-wide cached wall clock.
//!
//! Reading the wall clock once per readiness batch and once per timer
//! tick keeps every per-event and per-callback consumer off the
//! `gettimeofday` path; everything in the daemon that needs "now"
//! reads the cache instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Cached wall-clock time, atomically published as microseconds since
/// the epoch.
pub struct Clock {
    micros: AtomicU64,
}

impl Clock {
    pub(crate) fn new() -> Self {
        let clock = Self {
            micros: AtomicU64::new(0),
        };
        clock.refresh();
        clock
    }

    /// Re-read the wall clock into the cache.
    pub fn refresh(&self) {
        self.micros.store(wall_micros(), Ordering::Release);
    }

    /// The cached time.
    pub fn now(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_micros(self.micros.load(Ordering::Acquire))
    }

    /// The cached time, truncated to whole seconds since the epoch.
    pub fn now_secs(&self) -> u64 {
        self.micros.load(Ordering::Acquire) / 1_000_000
    }
}

pub(crate) fn wall_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_micros() as u64
}
