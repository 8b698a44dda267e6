// Demo tunables
//
// Builder pattern for the roster and timing knobs. There is no configuration
// file; defaults below reproduce the reference bank scenario and the CLI
// overrides them at startup.

use std::time::Duration;

/// Reader drivers in the reference roster
pub const DEFAULT_READERS: usize = 8;
/// `read` calls per reader driver
pub const DEFAULT_READ_ITERATIONS: usize = 6;
/// Writer drivers in the reference roster
pub const DEFAULT_WRITERS: usize = 8;
/// `write` calls per writer driver
pub const DEFAULT_WRITE_ITERATIONS: usize = 4;
/// Simulated processing time while holding the lock
pub const DEFAULT_HOLD: Duration = Duration::from_millis(1500);

/// Payloads cycled across writer drivers
pub const REFERENCE_TRANSACTIONS: [&str; 4] = [
    "Deposit 500 UAH to account",
    "Withdrawal 300 UAH from account",
    "Withdrawal 200 UAH from account",
    "Deposit 400 UAH to account",
];

/// Roster and timing configuration with builder pattern
///
/// # Example
/// ```
/// use turnstile::config::DemoConfig;
/// use std::time::Duration;
///
/// let config = DemoConfig::new()
///     .with_readers(2)
///     .with_read_iterations(3)
///     .with_writers(2)
///     .with_write_iterations(2)
///     .with_hold(Duration::from_millis(5))
///     .build();
///
/// assert_eq!(config.expected_reads(), 6);
/// assert_eq!(config.expected_writes(), 4);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DemoConfig {
    pub readers: usize,
    pub read_iterations: usize,
    pub writers: usize,
    pub write_iterations: usize,

    /// Time each driver holds the lock per call
    pub hold: Duration,

    /// Bound on each acquisition (None = wait forever)
    pub acquire_timeout: Option<Duration>,

    /// Cancel every unfinished driver after this long (None = run to completion)
    pub deadline: Option<Duration>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            readers: DEFAULT_READERS,
            read_iterations: DEFAULT_READ_ITERATIONS,
            writers: DEFAULT_WRITERS,
            write_iterations: DEFAULT_WRITE_ITERATIONS,
            hold: DEFAULT_HOLD,
            acquire_timeout: None,
            deadline: None,
        }
    }
}

impl DemoConfig {
    /// Create a configuration with the reference defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_readers(mut self, readers: usize) -> Self {
        self.readers = readers;
        self
    }

    pub fn with_read_iterations(mut self, iterations: usize) -> Self {
        self.read_iterations = iterations;
        self
    }

    pub fn with_writers(mut self, writers: usize) -> Self {
        self.writers = writers;
        self
    }

    pub fn with_write_iterations(mut self, iterations: usize) -> Self {
        self.write_iterations = iterations;
        self
    }

    /// Set the simulated processing delay
    ///
    /// # Example
    /// ```
    /// use turnstile::config::DemoConfig;
    /// use std::time::Duration;
    /// let config = DemoConfig::new().with_hold(Duration::ZERO);
    /// assert!(config.hold.is_zero());
    /// ```
    pub fn with_hold(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Build the final configuration
    pub fn build(self) -> Self {
        self
    }

    /// Total `read` calls the roster will make if nothing fails
    pub fn expected_reads(&self) -> usize {
        self.readers * self.read_iterations
    }

    /// Total `write` calls the roster will make if nothing fails
    pub fn expected_writes(&self) -> usize {
        self.writers * self.write_iterations
    }

    /// True when the roster would start no driver at all
    pub fn is_empty(&self) -> bool {
        self.readers == 0 && self.writers == 0
    }
}
