//! Turnstile - fair readers-writers lock with queuing-delay instrumentation
//!
//! This library provides a FIFO-fair shared/exclusive lock, a transaction
//! ledger that times every acquisition per role, and the driver roster used
//! by the `turnstile` binary to show how readers and writers share the lock.

pub mod cancel;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod fair_lock;
pub mod ledger;
pub mod narration;
pub mod report;
pub mod wait_stats;
