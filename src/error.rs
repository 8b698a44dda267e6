//! Error types for lock acquisition and ledger access

use std::time::Duration;
use thiserror::Error;

use crate::fair_lock::AccessMode;

/// Errors returned by the fallible acquisition paths of [`FairSharedLock`]
///
/// The blocking `acquire_*` calls never fail; only the cancellable and
/// bounded variants produce these.
///
/// [`FairSharedLock`]: crate::fair_lock::FairSharedLock
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("{mode} acquisition (ticket {ticket}) interrupted while waiting")]
    Interrupted { ticket: u64, mode: AccessMode },

    #[error("{mode} acquisition (ticket {ticket}) timed out after {waited:?}")]
    TimedOut {
        ticket: u64,
        mode: AccessMode,
        waited: Duration,
    },
}

impl LockError {
    /// Ticket that was withdrawn from the queue
    pub fn ticket(&self) -> u64 {
        match self {
            LockError::Interrupted { ticket, .. } | LockError::TimedOut { ticket, .. } => *ticket,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, LockError::Interrupted { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, LockError::TimedOut { .. })
    }
}

/// Errors surfaced by [`Ledger`] entry points
///
/// [`Ledger`]: crate::ledger::Ledger
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("{actor}: {source}")]
    Lock {
        actor: String,
        #[source]
        source: LockError,
    },
}

impl LedgerError {
    pub fn lock_error(&self) -> &LockError {
        match self {
            LedgerError::Lock { source, .. } => source,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.lock_error().is_interrupted()
    }
}
