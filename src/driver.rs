//! Workload drivers and the roster runner
//!
//! Each driver runs on its own OS thread and makes a fixed number of
//! sequential ledger calls. The runner starts the whole roster, optionally
//! arms a deadline watchdog, and joins every driver before returning, so the
//! report is only produced once all of them are done.
//!
//! Failure handling:
//! - a timed-out acquisition fails that iteration only; the driver moves on
//! - an interrupted acquisition (deadline reached) ends the driver
//! - a panicking driver is logged and recorded; siblings keep running

use std::any::Any;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError};

use crate::cancel::CancelToken;
use crate::config::{DemoConfig, REFERENCE_TRANSACTIONS};
use crate::fair_lock::AccessMode;
use crate::ledger::{AcquireOptions, Ledger};

/// What a driver does on each iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverKind {
    Reader,
    /// Appends `"{payload} #{n}"` on iteration `n` (1-based)
    Writer { payload: String },
}

/// One roster entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverSpec {
    pub name: String,
    pub kind: DriverKind,
    pub iterations: usize,
}

impl DriverSpec {
    pub fn reader(name: impl Into<String>, iterations: usize) -> Self {
        Self {
            name: name.into(),
            kind: DriverKind::Reader,
            iterations,
        }
    }

    pub fn writer(name: impl Into<String>, payload: impl Into<String>, iterations: usize) -> Self {
        Self {
            name: name.into(),
            kind: DriverKind::Writer {
                payload: payload.into(),
            },
            iterations,
        }
    }

    pub fn mode(&self) -> AccessMode {
        match self.kind {
            DriverKind::Reader => AccessMode::Shared,
            DriverKind::Writer { .. } => AccessMode::Exclusive,
        }
    }

    /// Run every iteration against `ledger` on the calling thread
    pub fn run(&self, ledger: &Ledger, options: &AcquireOptions) -> DriverOutcome {
        let mut outcome = DriverOutcome::new(self);

        for n in 1..=self.iterations {
            let result = match &self.kind {
                DriverKind::Reader => ledger.read_with(&self.name, options).map(|_| ()),
                DriverKind::Writer { payload } => ledger
                    .write_with(&self.name, format!("{payload} #{n}"), options)
                    .map(|_| ()),
            };

            match result {
                Ok(()) => outcome.completed += 1,
                Err(e) if e.is_interrupted() => {
                    tracing::info!(driver = %self.name, iteration = n, "cancelled, stopping driver");
                    outcome.interrupted = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(driver = %self.name, iteration = n, error = %e, "iteration failed");
                    outcome.timed_out += 1;
                }
            }
        }
        outcome
    }
}

/// What happened to one driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverOutcome {
    pub name: String,
    pub mode: AccessMode,
    pub planned: usize,
    pub completed: usize,
    /// Iterations lost to a bounded wait
    pub timed_out: usize,
    /// Driver stopped early because of cancellation
    pub interrupted: bool,
    /// Panic message if the driver thread died
    pub panic: Option<String>,
}

impl DriverOutcome {
    fn new(spec: &DriverSpec) -> Self {
        Self {
            name: spec.name.clone(),
            mode: spec.mode(),
            planned: spec.iterations,
            completed: 0,
            timed_out: 0,
            interrupted: false,
            panic: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed == self.planned && self.panic.is_none()
    }

    pub fn panicked(&self) -> bool {
        self.panic.is_some()
    }
}

/// Ordered list of drivers to start
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    drivers: Vec<DriverSpec>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reference roster: bank employees read, payment systems write, started
    /// interleaved rather than all readers first
    pub fn from_config(config: &DemoConfig) -> Self {
        let readers: Vec<DriverSpec> = (1..=config.readers)
            .map(|i| DriverSpec::reader(format!("Bank employee {i}"), config.read_iterations))
            .collect();
        let writers: Vec<DriverSpec> = (1..=config.writers)
            .map(|i| {
                let payload = REFERENCE_TRANSACTIONS[(i - 1) % REFERENCE_TRANSACTIONS.len()];
                DriverSpec::writer(format!("Payment system {i}"), payload, config.write_iterations)
            })
            .collect();
        Self::interleave(readers, writers)
    }

    /// Merge two lists, keeping each kind spread evenly over the start order
    pub fn interleave(readers: Vec<DriverSpec>, writers: Vec<DriverSpec>) -> Self {
        let (r_total, w_total) = (readers.len(), writers.len());
        let mut readers = readers.into_iter();
        let mut writers = writers.into_iter();
        let (mut r_started, mut w_started) = (0usize, 0usize);
        let mut drivers = Vec::with_capacity(r_total + w_total);

        while r_started < r_total || w_started < w_total {
            // Compare r_started / r_total with w_started / w_total without floats
            let reader_next = w_started == w_total
                || (r_started < r_total && r_started * w_total <= w_started * r_total);
            let next = if reader_next {
                r_started += 1;
                readers.next()
            } else {
                w_started += 1;
                writers.next()
            };
            drivers.extend(next);
        }
        Self { drivers }
    }

    pub fn push(&mut self, spec: DriverSpec) {
        self.drivers.push(spec);
    }

    pub fn drivers(&self) -> &[DriverSpec] {
        &self.drivers
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

/// Result of a full roster run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// One entry per driver, in start order
    pub outcomes: Vec<DriverOutcome>,
    pub deadline_hit: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Granted calls across all drivers of `mode`
    pub fn completed(&self, mode: AccessMode) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.mode == mode)
            .map(|o| o.completed)
            .sum()
    }

    pub fn failed_drivers(&self) -> impl Iterator<Item = &DriverOutcome> {
        self.outcomes.iter().filter(|o| o.panicked())
    }

    /// Every driver finished every iteration
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(DriverOutcome::is_complete)
    }
}

/// Start every driver in `roster`, wait for all of them and summarize
pub fn run_roster(roster: &Roster, ledger: &Arc<Ledger>, config: &DemoConfig) -> RunSummary {
    let started = Instant::now();
    let cancel = CancelToken::new();
    let options = AcquireOptions {
        cancel: config.deadline.map(|_| cancel.clone()),
        timeout: config.acquire_timeout,
    };

    let (done_tx, watchdog) = match config.deadline {
        Some(deadline) => {
            let (tx, rx) = channel::bounded::<()>(1);
            let token = cancel.clone();
            let handle = thread::spawn(move || match rx.recv_timeout(deadline) {
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(?deadline, "deadline reached, cancelling remaining drivers");
                    token.cancel();
                    true
                }
                _ => false,
            });
            (Some(tx), Some(handle))
        }
        None => (None, None),
    };

    let handles: Vec<(DriverOutcome, Option<JoinHandle<DriverOutcome>>)> = roster
        .drivers()
        .iter()
        .map(|spec| {
            let spec_owned = spec.clone();
            let ledger = Arc::clone(ledger);
            let options = options.clone();
            let spawned = thread::Builder::new()
                .name(spec.name.clone())
                .spawn(move || spec_owned.run(&ledger, &options));
            match spawned {
                Ok(handle) => (DriverOutcome::new(spec), Some(handle)),
                Err(e) => {
                    tracing::error!(driver = %spec.name, error = %e, "failed to start driver");
                    let mut outcome = DriverOutcome::new(spec);
                    outcome.panic = Some(format!("failed to start: {e}"));
                    (outcome, None)
                }
            }
        })
        .collect();

    let outcomes = handles
        .into_iter()
        .map(|(placeholder, handle)| match handle {
            Some(handle) => collect_outcome(placeholder, handle.join()),
            None => placeholder,
        })
        .collect();

    drop(done_tx);
    let deadline_hit = watchdog
        .map(|handle| handle.join().unwrap_or(false))
        .unwrap_or(false);

    RunSummary {
        outcomes,
        deadline_hit,
        elapsed: started.elapsed(),
    }
}

/// Turn a joined thread result into an outcome, logging driver panics
pub fn collect_outcome(
    placeholder: DriverOutcome,
    joined: thread::Result<DriverOutcome>,
) -> DriverOutcome {
    match joined {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(driver = %placeholder.name, panic = %message, "driver thread panicked");
            DriverOutcome {
                panic: Some(message),
                ..placeholder
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fair_lock::LockState;

    fn quick(readers: usize, writers: usize) -> DemoConfig {
        DemoConfig::new()
            .with_readers(readers)
            .with_writers(writers)
            .with_read_iterations(3)
            .with_write_iterations(2)
            .with_hold(Duration::from_millis(1))
    }

    #[test]
    fn test_reference_roster_is_interleaved() {
        let roster = Roster::from_config(&DemoConfig::default());
        assert_eq!(roster.len(), 16);
        let kinds: Vec<AccessMode> = roster.drivers().iter().map(DriverSpec::mode).collect();
        assert_eq!(kinds[0], AccessMode::Shared);
        assert_eq!(kinds[1], AccessMode::Exclusive);
        assert_eq!(kinds[2], AccessMode::Shared);
        assert_eq!(
            kinds.iter().filter(|m| **m == AccessMode::Exclusive).count(),
            8
        );
    }

    #[test]
    fn test_interleave_uneven_counts() {
        let readers = (0..4).map(|i| DriverSpec::reader(format!("r{i}"), 1)).collect();
        let writers = vec![DriverSpec::writer("w0", "x", 1)];
        let roster = Roster::interleave(readers, writers);
        let names: Vec<&str> = roster.drivers().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["r0", "w0", "r1", "r2", "r3"]);
    }

    #[test]
    fn test_interleave_only_writers() {
        let writers = (0..3).map(|i| DriverSpec::writer(format!("w{i}"), "x", 1)).collect();
        let roster = Roster::interleave(Vec::new(), writers);
        assert_eq!(roster.len(), 3);
        assert!(roster.drivers().iter().all(|d| d.mode() == AccessMode::Exclusive));
    }

    #[test]
    fn test_writer_payloads_cycle_reference_transactions() {
        let roster = Roster::from_config(&DemoConfig::default());
        let payloads: Vec<&str> = roster
            .drivers()
            .iter()
            .filter_map(|d| match &d.kind {
                DriverKind::Writer { payload } => Some(payload.as_str()),
                DriverKind::Reader => None,
            })
            .collect();
        assert_eq!(payloads[0], REFERENCE_TRANSACTIONS[0]);
        assert_eq!(payloads[4], REFERENCE_TRANSACTIONS[0]);
        assert_eq!(payloads[7], REFERENCE_TRANSACTIONS[3]);
    }

    #[test]
    fn test_writer_numbers_payloads_from_one() {
        let ledger = Ledger::new(Duration::ZERO);
        let spec = DriverSpec::writer("Payment system 1", "Deposit", 3);
        let outcome = spec.run(&ledger, &AcquireOptions::default());
        assert!(outcome.is_complete());
        assert_eq!(ledger.entries().to_string(), "[Deposit #1, Deposit #2, Deposit #3]");
    }

    #[test]
    fn test_run_roster_small_scenario() {
        let config = quick(2, 2);
        let ledger = Arc::new(Ledger::new(config.hold));
        let summary = run_roster(&Roster::from_config(&config), &ledger, &config);

        assert!(summary.is_clean());
        assert_eq!(summary.completed(AccessMode::Shared), 6);
        assert_eq!(summary.completed(AccessMode::Exclusive), 4);
        assert_eq!(ledger.entries().len(), 4);
    }

    /// Parks a writer inside the ledger until its hold elapses
    fn occupy_exclusively(ledger: &Arc<Ledger>) -> thread::JoinHandle<()> {
        let holder = {
            let ledger = Arc::clone(ledger);
            thread::spawn(move || {
                ledger.write("holder", "Deposit 1 UAH #1");
            })
        };
        while ledger.lock_state() != LockState::ExclusiveBusy {
            thread::sleep(Duration::from_millis(1));
        }
        holder
    }

    #[test]
    fn test_deadline_interrupts_blocked_driver() {
        let ledger = Arc::new(Ledger::new(Duration::from_millis(300)));
        let holder = occupy_exclusively(&ledger);

        let mut roster = Roster::new();
        roster.push(DriverSpec::reader("Bank employee 1", 2));
        let config = quick(1, 0).with_deadline(Duration::from_millis(30));
        let summary = run_roster(&roster, &ledger, &config);
        holder.join().unwrap();

        assert!(summary.deadline_hit);
        let outcome = &summary.outcomes[0];
        assert!(outcome.interrupted);
        assert_eq!(outcome.completed, 0);
        assert_eq!(ledger.report().read.interrupted, 1);
    }

    #[test]
    fn test_deadline_stops_long_roster() {
        let config = DemoConfig::new()
            .with_readers(1)
            .with_read_iterations(1000)
            .with_writers(1)
            .with_write_iterations(1000)
            .with_hold(Duration::from_millis(2))
            .with_deadline(Duration::from_millis(40));
        let ledger = Arc::new(Ledger::new(config.hold));

        let summary = run_roster(&Roster::from_config(&config), &ledger, &config);

        assert!(summary.deadline_hit);
        assert!(!summary.is_clean());
        assert!(summary.outcomes.iter().all(|o| o.completed < o.planned));
        let report = ledger.report();
        assert_eq!(report.read.attempts as usize, summary.completed(AccessMode::Shared));
        assert_eq!(report.write.attempts as usize, summary.completed(AccessMode::Exclusive));
    }

    #[test]
    fn test_timeouts_are_iteration_local() {
        let ledger = Arc::new(Ledger::new(Duration::from_millis(300)));
        let holder = occupy_exclusively(&ledger);

        let options = AcquireOptions::new().with_timeout(Duration::from_millis(5));
        let outcome = DriverSpec::reader("Bank employee 1", 3).run(&ledger, &options);
        holder.join().unwrap();

        assert_eq!(outcome.timed_out, 3);
        assert_eq!(outcome.completed, 0);
        assert!(!outcome.interrupted);
        assert_eq!(ledger.report().read.timed_out, 3);
    }

    #[test]
    fn test_collect_outcome_records_panic() {
        let spec = DriverSpec::reader("Bank employee 9", 2);
        let joined = thread::spawn(|| -> DriverOutcome { panic!("ledger exploded") }).join();

        let outcome = collect_outcome(DriverOutcome::new(&spec), joined);
        assert_eq!(outcome.panic.as_deref(), Some("ledger exploded"));
        assert!(outcome.panicked());
        assert!(!outcome.is_complete());
    }

    #[test]
    fn test_summary_lists_failed_drivers() {
        let ok = DriverOutcome {
            completed: 1,
            ..DriverOutcome::new(&DriverSpec::reader("a", 1))
        };
        let bad = DriverOutcome {
            panic: Some("boom".into()),
            ..DriverOutcome::new(&DriverSpec::writer("b", "x", 1))
        };
        let summary = RunSummary {
            outcomes: vec![ok, bad],
            deadline_hit: false,
            elapsed: Duration::ZERO,
        };
        let failed: Vec<&str> = summary.failed_drivers().map(|o| o.name.as_str()).collect();
        assert_eq!(failed, vec!["b"]);
        assert!(!summary.is_clean());
    }
}
