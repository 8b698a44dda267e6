//! Instrumented transaction ledger
//!
//! The ledger owns the append-only transaction log, the fair lock guarding
//! it and the wait-time accumulator. Every read and write times its own lock
//! acquisition, records the wait, then holds the lock for the configured
//! processing delay before releasing it.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::error::{LedgerError, LockError};
use crate::fair_lock::{AccessMode, ExclusiveGuard, FairSharedLock, LockState, SharedGuard};
use crate::narration::{Narration, NarrationHandle};
use crate::wait_stats::{WaitReport, WaitStats};

/// Opaque transaction descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Transaction(String);

impl Transaction {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Transaction {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Transaction {
    fn from(text: String) -> Self {
        Self(text)
    }
}

/// Immutable copy of the log taken under the lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LogSnapshot(Arc<[Transaction]>);

impl LogSnapshot {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entries(&self) -> &[Transaction] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Transaction> {
        self.0.iter()
    }
}

impl Default for LogSnapshot {
    fn default() -> Self {
        Self(Arc::from(Vec::new()))
    }
}

impl From<&[Transaction]> for LogSnapshot {
    fn from(entries: &[Transaction]) -> Self {
        Self(Arc::from(entries))
    }
}

impl From<Vec<Transaction>> for LogSnapshot {
    fn from(entries: Vec<Transaction>) -> Self {
        Self(Arc::from(entries))
    }
}

impl fmt::Display for LogSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, entry) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{entry}")?;
        }
        f.write_str("]")
    }
}

impl<'a> IntoIterator for &'a LogSnapshot {
    type Item = &'a Transaction;
    type IntoIter = std::slice::Iter<'a, Transaction>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// How a single ledger call should acquire the lock
///
/// The default blocks until granted and cannot fail.
#[derive(Debug, Clone, Default)]
pub struct AcquireOptions {
    pub cancel: Option<CancelToken>,
    pub timeout: Option<Duration>,
}

impl AcquireOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Shared transaction log with per-role wait instrumentation
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use turnstile::ledger::Ledger;
///
/// let ledger = Ledger::new(Duration::ZERO);
/// ledger.write("Payments 1", "Deposit 500 UAH #1");
/// let seen = ledger.read("Teller 1");
///
/// assert_eq!(seen.len(), 1);
/// let report = ledger.report();
/// assert_eq!(report.read.attempts, 1);
/// assert_eq!(report.write.attempts, 1);
/// ```
#[derive(Debug)]
pub struct Ledger {
    log: FairSharedLock<Vec<Transaction>>,
    stats: WaitStats,
    hold: Duration,
    narration: Option<NarrationHandle>,
}

impl Ledger {
    /// Empty ledger whose readers and writers hold the lock for `hold`
    pub fn new(hold: Duration) -> Self {
        Self {
            log: FairSharedLock::new(Vec::new()),
            stats: WaitStats::new(),
            hold,
            narration: None,
        }
    }

    /// Narrate every read and write through `handle`
    pub fn with_narration(mut self, handle: NarrationHandle) -> Self {
        self.narration = Some(handle);
        self
    }

    pub fn hold(&self) -> Duration {
        self.hold
    }

    /// Shared access: returns the log as it was while the lock was held
    pub fn read(&self, actor: &str) -> LogSnapshot {
        let started = Instant::now();
        let guard = self.log.acquire_shared();
        self.finish_read(actor, started, guard)
    }

    /// Exclusive access: appends `record` and returns the log after the append
    pub fn write(&self, actor: &str, record: impl Into<Transaction>) -> LogSnapshot {
        let started = Instant::now();
        let guard = self.log.acquire_exclusive();
        self.finish_write(actor, record.into(), started, guard)
    }

    /// [`read`](Self::read) with cancellation and/or a bounded wait
    pub fn read_with(
        &self,
        actor: &str,
        options: &AcquireOptions,
    ) -> Result<LogSnapshot, LedgerError> {
        let started = Instant::now();
        let guard = self
            .log
            .acquire_shared_with(options.cancel.as_ref(), options.timeout)
            .map_err(|source| self.acquisition_failed(actor, AccessMode::Shared, source))?;
        Ok(self.finish_read(actor, started, guard))
    }

    /// [`write`](Self::write) with cancellation and/or a bounded wait
    ///
    /// Nothing is appended when acquisition fails.
    pub fn write_with(
        &self,
        actor: &str,
        record: impl Into<Transaction>,
        options: &AcquireOptions,
    ) -> Result<LogSnapshot, LedgerError> {
        let started = Instant::now();
        let guard = self
            .log
            .acquire_exclusive_with(options.cancel.as_ref(), options.timeout)
            .map_err(|source| self.acquisition_failed(actor, AccessMode::Exclusive, source))?;
        Ok(self.finish_write(actor, record.into(), started, guard))
    }

    /// Current wait statistics
    pub fn report(&self) -> WaitReport {
        self.stats.report()
    }

    /// Who currently holds the log lock
    pub fn lock_state(&self) -> LockState {
        self.log.state()
    }

    /// Copy of the log without simulated work or stat recording
    pub fn entries(&self) -> LogSnapshot {
        LogSnapshot::from(self.log.acquire_shared().as_slice())
    }

    fn finish_read(
        &self,
        actor: &str,
        started: Instant,
        guard: SharedGuard<'_, Vec<Transaction>>,
    ) -> LogSnapshot {
        let waited = started.elapsed();
        self.stats.record(AccessMode::Shared, waited);
        tracing::debug!(
            actor,
            ticket = guard.ticket(),
            waited_ns = waited.as_nanos() as u64,
            "shared access granted"
        );

        let snapshot = LogSnapshot::from(guard.as_slice());
        self.narrate(|| Narration::ReadStarted {
            actor: actor.to_string(),
            entries: snapshot.clone(),
        });
        self.simulate_work();
        self.narrate(|| Narration::ReadFinished {
            actor: actor.to_string(),
        });
        drop(guard);
        snapshot
    }

    fn finish_write(
        &self,
        actor: &str,
        record: Transaction,
        started: Instant,
        mut guard: ExclusiveGuard<'_, Vec<Transaction>>,
    ) -> LogSnapshot {
        let waited = started.elapsed();
        self.stats.record(AccessMode::Exclusive, waited);
        tracing::debug!(
            actor,
            ticket = guard.ticket(),
            waited_ns = waited.as_nanos() as u64,
            "exclusive access granted"
        );

        self.narrate(|| Narration::WriteStarted {
            actor: actor.to_string(),
            record: record.clone(),
        });
        guard.push(record);
        self.simulate_work();

        let snapshot = LogSnapshot::from(guard.as_slice());
        self.narrate(|| Narration::WriteFinished {
            actor: actor.to_string(),
            entries: snapshot.clone(),
        });
        drop(guard);
        snapshot
    }

    fn acquisition_failed(&self, actor: &str, mode: AccessMode, source: LockError) -> LedgerError {
        self.stats.record_failure(mode, &source);
        tracing::warn!(actor, %mode, error = %source, "acquisition abandoned");
        self.narrate(|| Narration::Abandoned {
            actor: actor.to_string(),
            reason: source.to_string(),
        });
        LedgerError::Lock {
            actor: actor.to_string(),
            source,
        }
    }

    fn simulate_work(&self) {
        if !self.hold.is_zero() {
            thread::sleep(self.hold);
        }
    }

    fn narrate(&self, event: impl FnOnce() -> Narration) {
        if let Some(handle) = &self.narration {
            handle.emit(event());
        }
    }
}
