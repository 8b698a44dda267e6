//! Per-role queuing-delay accounting
//!
//! Counters live behind their own mutex, separate from the lock being
//! measured, so recording a sample never contends with resource access.

use parking_lot::Mutex;
use std::time::Duration;

use crate::error::LockError;
use crate::fair_lock::AccessMode;

/// Raw tallies for one role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RoleTally {
    attempts: u64,
    total_wait_ns: u128,
    max_wait_ns: u128,
    interrupted: u64,
    timed_out: u64,
}

impl RoleTally {
    fn record(&mut self, wait_ns: u128) {
        self.attempts += 1;
        self.total_wait_ns += wait_ns;
        self.max_wait_ns = self.max_wait_ns.max(wait_ns);
    }

    fn summary(&self) -> RoleSummary {
        RoleSummary {
            attempts: self.attempts,
            total_wait: nanos_to_duration(self.total_wait_ns),
            max_wait: nanos_to_duration(self.max_wait_ns),
            interrupted: self.interrupted,
            timed_out: self.timed_out,
        }
    }
}

fn nanos_to_duration(ns: u128) -> Duration {
    let secs = (ns / 1_000_000_000).min(u64::MAX as u128) as u64;
    Duration::new(secs, (ns % 1_000_000_000) as u32)
}

#[derive(Debug, Default)]
struct Tallies {
    read: RoleTally,
    write: RoleTally,
}

impl Tallies {
    fn role_mut(&mut self, mode: AccessMode) -> &mut RoleTally {
        match mode {
            AccessMode::Shared => &mut self.read,
            AccessMode::Exclusive => &mut self.write,
        }
    }
}

/// Thread-safe wait-time accumulator for readers and writers
#[derive(Debug, Default)]
pub struct WaitStats {
    tallies: Mutex<Tallies>,
}

impl WaitStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one successful acquisition in `mode` that waited `wait`
    pub fn record(&self, mode: AccessMode, wait: Duration) {
        self.tallies.lock().role_mut(mode).record(wait.as_nanos());
    }

    /// Count an acquisition that never got the lock
    ///
    /// Failed acquisitions are kept apart from `attempts` so averages only
    /// reflect waits that ended in a grant.
    pub fn record_failure(&self, mode: AccessMode, err: &LockError) {
        let mut tallies = self.tallies.lock();
        let tally = tallies.role_mut(mode);
        match err {
            LockError::Interrupted { .. } => tally.interrupted += 1,
            LockError::TimedOut { .. } => tally.timed_out += 1,
        }
    }

    /// Snapshot both roles
    pub fn report(&self) -> WaitReport {
        let tallies = self.tallies.lock();
        WaitReport {
            read: tallies.read.summary(),
            write: tallies.write.summary(),
        }
    }
}

/// Aggregated figures for one role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleSummary {
    /// Acquisitions that were granted
    pub attempts: u64,
    pub total_wait: Duration,
    pub max_wait: Duration,
    pub interrupted: u64,
    pub timed_out: u64,
}

impl RoleSummary {
    /// Mean wait per granted acquisition, `None` when there are no samples
    pub fn average(&self) -> Option<Duration> {
        if self.attempts == 0 {
            return None;
        }
        let avg_ns = self.total_wait.as_nanos() / self.attempts as u128;
        Some(nanos_to_duration(avg_ns))
    }

    pub fn average_ms(&self) -> Option<f64> {
        self.average().map(|d| d.as_nanos() as f64 / 1_000_000.0)
    }

    pub fn total_ms(&self) -> f64 {
        self.total_wait.as_nanos() as f64 / 1_000_000.0
    }

    pub fn max_ms(&self) -> f64 {
        self.max_wait.as_nanos() as f64 / 1_000_000.0
    }

    pub fn has_samples(&self) -> bool {
        self.attempts > 0
    }

    /// Some acquisitions of this role were lost to cancellation or timeout
    pub fn is_degraded(&self) -> bool {
        self.interrupted > 0 || self.timed_out > 0
    }
}

/// Snapshot of both roles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaitReport {
    pub read: RoleSummary,
    pub write: RoleSummary,
}

impl WaitReport {
    pub fn role(&self, mode: AccessMode) -> &RoleSummary {
        match mode {
            AccessMode::Shared => &self.read,
            AccessMode::Exclusive => &self.write,
        }
    }

    pub fn avg_read(&self) -> Option<Duration> {
        self.read.average()
    }

    pub fn avg_write(&self) -> Option<Duration> {
        self.write.average()
    }

    pub fn total_read(&self) -> Duration {
        self.read.total_wait
    }

    pub fn total_write(&self) -> Duration {
        self.write.total_wait
    }
}
