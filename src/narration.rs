//! Console narration via a sidecar printer thread
//!
//! Lock holders must not block on stdout, so narration lines are pushed onto a
//! channel and a dedicated thread does the writing. Events from one driver
//! arrive in the order that driver sent them.
//!
//! # Design
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ DRIVER THREADS (holding the ledger lock)      │
//! │   ledger.read() → handle.emit(ReadStarted)    │
//! └───────────────────────────────────────────────┘
//!                       │ crossbeam channel
//!                       ▼
//! ┌───────────────────────────────────────────────┐
//! │ SIDECAR THREAD                                │
//! │   for msg in rx { writeln!(out, "{msg}") }    │
//! └───────────────────────────────────────────────┘
//! ```

use crossbeam::channel::{self, Receiver, Sender};
use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::ledger::{LogSnapshot, Transaction};

/// One narrated event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Narration {
    ReadStarted { actor: String, entries: LogSnapshot },
    ReadFinished { actor: String },
    WriteStarted { actor: String, record: Transaction },
    WriteFinished { actor: String, entries: LogSnapshot },
    /// An iteration that never got the lock
    Abandoned { actor: String, reason: String },
}

impl fmt::Display for Narration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Narration::ReadStarted { actor, entries } => {
                write!(f, "{actor} checks accounts: {entries}")
            }
            Narration::ReadFinished { actor } => write!(f, "{actor} finished checking accounts."),
            Narration::WriteStarted { actor, record } => {
                write!(f, "{actor} performs transaction: {record}")
            }
            Narration::WriteFinished { actor, entries } => write!(
                f,
                "{actor} completed transaction. Current accounts: {entries}"
            ),
            Narration::Abandoned { actor, reason } => write!(f, "{actor} gave up: {reason}"),
        }
    }
}

enum Message {
    Event(Narration),
    Shutdown,
}

/// Cheap, cloneable sending side handed to the ledger
#[derive(Clone)]
pub struct NarrationHandle {
    tx: Sender<Message>,
    emitted: Arc<AtomicU64>,
}

impl NarrationHandle {
    /// Queue an event; never blocks
    pub fn emit(&self, event: Narration) {
        if self.tx.send(Message::Event(event)).is_ok() {
            self.emitted.fetch_add(1, Ordering::Relaxed);
        } else {
            tracing::warn!("narration sidecar gone, event dropped");
        }
    }
}

impl fmt::Debug for NarrationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NarrationHandle")
            .field("emitted", &self.emitted.load(Ordering::Relaxed))
            .finish()
    }
}

/// Owner of the sidecar thread writing to `W`
///
/// # Example
///
/// ```
/// use turnstile::narration::{Narration, Narrator};
///
/// let narrator = Narrator::spawn(Vec::new());
/// narrator.handle().emit(Narration::ReadFinished { actor: "Teller 1".into() });
///
/// let out = narrator.finish().unwrap();
/// assert_eq!(String::from_utf8(out).unwrap(), "Teller 1 finished checking accounts.\n");
/// ```
pub struct Narrator<W: Write + Send + 'static> {
    handle: NarrationHandle,
    sidecar: Option<JoinHandle<io::Result<W>>>,
}

impl Narrator<io::Stdout> {
    pub fn stdout() -> Self {
        Self::spawn(io::stdout())
    }
}

impl<W: Write + Send + 'static> Narrator<W> {
    pub fn spawn(out: W) -> Self {
        let (tx, rx) = channel::unbounded();
        let sidecar = thread::Builder::new()
            .name("narrator".to_string())
            .spawn(move || Self::sidecar_worker(rx, out));

        let sidecar = match sidecar {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(error = %e, "failed to spawn narration thread, narration disabled");
                None
            }
        };

        Self {
            handle: NarrationHandle {
                tx,
                emitted: Arc::new(AtomicU64::new(0)),
            },
            sidecar,
        }
    }

    pub fn handle(&self) -> NarrationHandle {
        self.handle.clone()
    }

    pub fn stats(&self) -> NarrationStats {
        NarrationStats {
            emitted: self.handle.emitted.load(Ordering::Relaxed),
            pending: self.handle.tx.len(),
        }
    }

    /// Drain every queued event, stop the sidecar and hand back the writer
    pub fn finish(mut self) -> io::Result<W> {
        let _ = self.handle.tx.send(Message::Shutdown);
        match self.sidecar.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| io::Error::other("narration thread panicked"))?,
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "narration thread never started",
            )),
        }
    }

    fn sidecar_worker(rx: Receiver<Message>, mut out: W) -> io::Result<W> {
        for message in rx.iter() {
            match message {
                Message::Event(event) => writeln!(out, "{event}")?,
                Message::Shutdown => break,
            }
        }
        out.flush()?;
        Ok(out)
    }
}

impl<W: Write + Send + 'static> Drop for Narrator<W> {
    fn drop(&mut self) {
        if let Some(handle) = self.sidecar.take() {
            let _ = self.handle.tx.send(Message::Shutdown);
            let _ = handle.join();
        }
    }
}

/// Narration counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NarrationStats {
    pub emitted: u64,
    /// Events queued but not yet written
    pub pending: usize,
}
