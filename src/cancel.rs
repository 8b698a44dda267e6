//! Cooperative cancellation for blocked lock acquisitions
//!
//! OS threads cannot be interrupted from the outside, so a waiter observes a
//! shared flag instead. Waiters that were handed a token re-check it at a
//! fixed polling interval while parked on the lock's condition variable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How often a cancellable waiter wakes up to look at its token
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Shared cancellation flag
///
/// Clones observe the same flag. Once cancelled a token stays cancelled.
///
/// # Example
///
/// ```
/// use turnstile::cancel::CancelToken;
///
/// let token = CancelToken::new();
/// let observer = token.clone();
/// assert!(!observer.is_cancelled());
///
/// token.cancel();
/// assert!(observer.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_new_token_not_cancelled() {
        assert!(!CancelToken::new().is_cancelled());
        assert!(!CancelToken::default().is_cancelled());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cancel_visible_across_threads() {
        let token = CancelToken::new();
        let remote = token.clone();

        let handle = thread::spawn(move || remote.cancel());
        handle.join().unwrap();

        assert!(token.is_cancelled());
    }
}
