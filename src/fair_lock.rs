//! Fair shared/exclusive lock built on a FIFO ticket queue
//!
//! Every acquisition takes a ticket on arrival and waits in one queue shared
//! by both modes. A request proceeds only when it reaches the head of the
//! queue, with one refinement: a contiguous run of shared requests at the head
//! is granted as a batch, because readers do not conflict with each other.
//!
//! # Design
//!
//! ```text
//!   arrival order ──────────────────────────────────────────────►
//!
//!   queue:  [R#4] [R#5] [W#6] [R#7] [R#8]
//!           └─── batch ──┘  │     └─ blocked behind W#6
//!                           └─ waits for R#4, R#5 to release
//!
//!   state:  Free ──grant R──► SharedBusy(n) ──last release──► Free
//!           Free ──grant W──► ExclusiveBusy ──release───────► Free
//! ```
//!
//! A writer that arrived before several readers is never bypassed by them,
//! and a reader that arrived before a writer is never bypassed either. This
//! rules out starvation of either role.
//!
//! Release happens in the guards' `Drop`, so the lock is freed on every exit
//! path including panics. A cancelled or timed-out waiter withdraws its ticket
//! before returning, leaving the queue as if the request had never been made.

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;
use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

use crate::cancel::{CancelToken, CANCEL_POLL_INTERVAL};
use crate::error::LockError;

/// Acquisition mode of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Read mode, any number of concurrent holders
    Shared,
    /// Write mode, exactly one holder
    Exclusive,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Shared => write!(f, "shared"),
            AccessMode::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// Observable state of a lock instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Free,
    /// Number of active readers (always > 0)
    SharedBusy(usize),
    ExclusiveBusy,
}

#[derive(Debug, Clone, Copy)]
struct Waiter {
    ticket: u64,
    mode: AccessMode,
}

/// Bookkeeping protected by the internal mutex
#[derive(Debug, Default)]
struct TicketQueue {
    active_readers: usize,
    writer_active: bool,
    next_ticket: u64,
    /// Pending requests, ordered by ticket
    waiters: VecDeque<Waiter>,
}

impl TicketQueue {
    fn enqueue(&mut self, mode: AccessMode) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.waiters.push_back(Waiter { ticket, mode });
        ticket
    }

    fn is_eligible(&self, ticket: u64, mode: AccessMode) -> bool {
        if self.writer_active {
            return false;
        }
        match mode {
            AccessMode::Exclusive => {
                self.active_readers == 0
                    && self.waiters.front().is_some_and(|w| w.ticket == ticket)
            }
            AccessMode::Shared => self
                .waiters
                .iter()
                .take_while(|w| w.mode == AccessMode::Shared)
                .any(|w| w.ticket == ticket),
        }
    }

    fn grant(&mut self, ticket: u64, mode: AccessMode) {
        self.withdraw(ticket);
        match mode {
            AccessMode::Shared => self.active_readers += 1,
            AccessMode::Exclusive => self.writer_active = true,
        }
    }

    fn withdraw(&mut self, ticket: u64) -> bool {
        match self.waiters.iter().position(|w| w.ticket == ticket) {
            Some(pos) => {
                self.waiters.remove(pos);
                true
            }
            None => false,
        }
    }

    fn state(&self) -> LockState {
        if self.writer_active {
            LockState::ExclusiveBusy
        } else if self.active_readers > 0 {
            LockState::SharedBusy(self.active_readers)
        } else {
            LockState::Free
        }
    }
}

/// Fair readers-writers lock protecting a value of type `T`
///
/// # Example
///
/// ```
/// use turnstile::fair_lock::{FairSharedLock, LockState};
///
/// let lock = FairSharedLock::new(vec![1, 2, 3]);
///
/// {
///     let r1 = lock.acquire_shared();
///     let r2 = lock.acquire_shared();
///     assert_eq!(lock.state(), LockState::SharedBusy(2));
///     assert_eq!(r1.len(), r2.len());
/// }
///
/// lock.acquire_exclusive().push(4);
/// assert_eq!(*lock.acquire_shared(), vec![1, 2, 3, 4]);
/// assert_eq!(lock.state(), LockState::Free);
/// ```
pub struct FairSharedLock<T: ?Sized> {
    queue: Mutex<TicketQueue>,
    turn: Condvar,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is mediated by the ticket queue, which hands out
// either one exclusive guard or any number of shared guards, never both.
unsafe impl<T: ?Sized + Send> Send for FairSharedLock<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for FairSharedLock<T> {}

impl<T> FairSharedLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            queue: Mutex::new(TicketQueue::default()),
            turn: Condvar::new(),
            data: UnsafeCell::new(value),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for FairSharedLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized> FairSharedLock<T> {
    /// Block until shared access is granted
    pub fn acquire_shared(&self) -> SharedGuard<'_, T> {
        let ticket = self.acquire_unbounded(AccessMode::Shared);
        SharedGuard { lock: self, ticket }
    }

    /// Block until exclusive access is granted
    pub fn acquire_exclusive(&self) -> ExclusiveGuard<'_, T> {
        let ticket = self.acquire_unbounded(AccessMode::Exclusive);
        ExclusiveGuard { lock: self, ticket }
    }

    /// Like [`acquire_shared`](Self::acquire_shared), but gives up with
    /// [`LockError::Interrupted`] once `cancel` fires
    pub fn acquire_shared_cancellable(
        &self,
        cancel: &CancelToken,
    ) -> Result<SharedGuard<'_, T>, LockError> {
        let ticket = self.acquire(AccessMode::Shared, Some(cancel), None)?;
        Ok(SharedGuard { lock: self, ticket })
    }

    /// Like [`acquire_exclusive`](Self::acquire_exclusive), but gives up with
    /// [`LockError::Interrupted`] once `cancel` fires
    pub fn acquire_exclusive_cancellable(
        &self,
        cancel: &CancelToken,
    ) -> Result<ExclusiveGuard<'_, T>, LockError> {
        let ticket = self.acquire(AccessMode::Exclusive, Some(cancel), None)?;
        Ok(ExclusiveGuard { lock: self, ticket })
    }

    /// Wait at most `timeout` for shared access
    pub fn try_acquire_shared_for(
        &self,
        timeout: Duration,
    ) -> Result<SharedGuard<'_, T>, LockError> {
        let ticket = self.acquire(AccessMode::Shared, None, Some(timeout))?;
        Ok(SharedGuard { lock: self, ticket })
    }

    /// Wait at most `timeout` for exclusive access
    pub fn try_acquire_exclusive_for(
        &self,
        timeout: Duration,
    ) -> Result<ExclusiveGuard<'_, T>, LockError> {
        let ticket = self.acquire(AccessMode::Exclusive, None, Some(timeout))?;
        Ok(ExclusiveGuard { lock: self, ticket })
    }

    /// Shared acquisition honoring an optional token and an optional bound
    ///
    /// With neither set this behaves like [`acquire_shared`](Self::acquire_shared)
    /// and cannot fail.
    pub fn acquire_shared_with(
        &self,
        cancel: Option<&CancelToken>,
        timeout: Option<Duration>,
    ) -> Result<SharedGuard<'_, T>, LockError> {
        let ticket = self.acquire(AccessMode::Shared, cancel, timeout)?;
        Ok(SharedGuard { lock: self, ticket })
    }

    /// Exclusive counterpart of [`acquire_shared_with`](Self::acquire_shared_with)
    pub fn acquire_exclusive_with(
        &self,
        cancel: Option<&CancelToken>,
        timeout: Option<Duration>,
    ) -> Result<ExclusiveGuard<'_, T>, LockError> {
        let ticket = self.acquire(AccessMode::Exclusive, cancel, timeout)?;
        Ok(ExclusiveGuard { lock: self, ticket })
    }

    pub fn state(&self) -> LockState {
        self.queue.lock().state()
    }

    /// Number of requests waiting for a grant
    pub fn queued(&self) -> usize {
        self.queue.lock().waiters.len()
    }

    /// Mutable access without locking; the borrow checker proves exclusivity
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    fn acquire_unbounded(&self, mode: AccessMode) -> u64 {
        let mut queue = self.queue.lock();
        let ticket = queue.enqueue(mode);
        tracing::trace!(ticket, %mode, "queued");

        while !queue.is_eligible(ticket, mode) {
            self.turn.wait(&mut queue);
        }
        queue.grant(ticket, mode);
        tracing::trace!(ticket, %mode, "granted");
        ticket
    }

    fn acquire(
        &self,
        mode: AccessMode,
        cancel: Option<&CancelToken>,
        timeout: Option<Duration>,
    ) -> Result<u64, LockError> {
        let started = Instant::now();
        let deadline = timeout.map(|t| started + t);
        let mut queue = self.queue.lock();
        let ticket = queue.enqueue(mode);
        tracing::trace!(ticket, %mode, "queued");

        loop {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                self.withdraw(&mut queue, ticket, mode);
                return Err(LockError::Interrupted { ticket, mode });
            }
            if queue.is_eligible(ticket, mode) {
                queue.grant(ticket, mode);
                tracing::trace!(ticket, %mode, "granted");
                return Ok(ticket);
            }

            let now = Instant::now();
            if deadline.is_some_and(|d| now >= d) {
                self.withdraw(&mut queue, ticket, mode);
                return Err(LockError::TimedOut {
                    ticket,
                    mode,
                    waited: now.duration_since(started),
                });
            }

            let poll = cancel.map(|_| now + CANCEL_POLL_INTERVAL);
            match (poll, deadline) {
                (Some(p), Some(d)) => {
                    self.turn.wait_until(&mut queue, p.min(d));
                }
                (Some(wake), None) | (None, Some(wake)) => {
                    self.turn.wait_until(&mut queue, wake);
                }
                (None, None) => self.turn.wait(&mut queue),
            }
        }
    }

    /// Remove a ticket that will never be granted and wake whoever it was blocking
    fn withdraw(&self, queue: &mut MutexGuard<'_, TicketQueue>, ticket: u64, mode: AccessMode) {
        if queue.withdraw(ticket) {
            tracing::debug!(ticket, %mode, "withdrawn from queue");
        }
        self.turn.notify_all();
    }

    fn release_shared(&self) {
        let mut queue = self.queue.lock();
        debug_assert!(queue.active_readers > 0, "shared release without holder");
        queue.active_readers -= 1;
        let last = queue.active_readers == 0;
        drop(queue);
        if last {
            self.turn.notify_all();
        }
    }

    fn release_exclusive(&self) {
        let mut queue = self.queue.lock();
        debug_assert!(queue.writer_active, "exclusive release without holder");
        queue.writer_active = false;
        drop(queue);
        self.turn.notify_all();
    }
}

impl<T: ?Sized> fmt::Debug for FairSharedLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.queue.lock();
        f.debug_struct("FairSharedLock")
            .field("state", &queue.state())
            .field("queued", &queue.waiters.len())
            .field("next_ticket", &queue.next_ticket)
            .finish_non_exhaustive()
    }
}

/// Shared access to the protected value; released on drop
#[must_use = "dropping the guard releases shared access immediately"]
pub struct SharedGuard<'a, T: ?Sized> {
    lock: &'a FairSharedLock<T>,
    ticket: u64,
}

impl<T: ?Sized> SharedGuard<'_, T> {
    /// Arrival ticket this grant was issued for
    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

impl<T: ?Sized> Deref for SharedGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: a live shared guard excludes every exclusive guard.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SharedGuard<'_, T> {
    fn drop(&mut self) {
        tracing::trace!(ticket = self.ticket, "shared released");
        self.lock.release_shared();
    }
}

/// Exclusive access to the protected value; released on drop
#[must_use = "dropping the guard releases exclusive access immediately"]
pub struct ExclusiveGuard<'a, T: ?Sized> {
    lock: &'a FairSharedLock<T>,
    ticket: u64,
}

impl<T: ?Sized> ExclusiveGuard<'_, T> {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

impl<T: ?Sized> Deref for ExclusiveGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the exclusive guard is the only live guard.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for ExclusiveGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the exclusive guard is the only live guard.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for ExclusiveGuard<'_, T> {
    fn drop(&mut self) {
        tracing::trace!(ticket = self.ticket, "exclusive released");
        self.lock.release_exclusive();
    }
}
