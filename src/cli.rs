//! CLI argument parsing for turnstile

use clap::{Parser, ValueEnum};
use std::time::Duration;

use crate::config::{
    DemoConfig, DEFAULT_READERS, DEFAULT_READ_ITERATIONS, DEFAULT_WRITERS,
    DEFAULT_WRITE_ITERATIONS,
};

/// Output format for the final report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "turnstile")]
#[command(version)]
#[command(
    about = "Fair readers-writers lock demo: bank employees read, payment systems write",
    long_about = None
)]
pub struct Cli {
    /// Number of reader drivers
    #[arg(long, value_name = "N", default_value_t = DEFAULT_READERS)]
    pub readers: usize,

    /// Number of writer drivers
    #[arg(long, value_name = "N", default_value_t = DEFAULT_WRITERS)]
    pub writers: usize,

    /// `read` calls per reader driver
    #[arg(long, value_name = "N", default_value_t = DEFAULT_READ_ITERATIONS)]
    pub read_iterations: usize,

    /// `write` calls per writer driver
    #[arg(long, value_name = "N", default_value_t = DEFAULT_WRITE_ITERATIONS)]
    pub write_iterations: usize,

    /// Simulated processing time while holding the lock, in milliseconds
    #[arg(long, value_name = "MS", default_value = "1500")]
    pub hold_ms: u64,

    /// Give up on a single acquisition after this many milliseconds
    #[arg(long, value_name = "MS")]
    pub acquire_timeout_ms: Option<u64>,

    /// Cancel every unfinished driver after this many milliseconds
    #[arg(long, value_name = "MS")]
    pub deadline_ms: Option<u64>,

    /// Report format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Suppress per-event narration, print only the report
    #[arg(short, long)]
    pub quiet: bool,

    /// Enable debug tracing output to stderr
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Demo configuration described by the flags
    pub fn demo_config(&self) -> DemoConfig {
        let mut config = DemoConfig::new()
            .with_readers(self.readers)
            .with_read_iterations(self.read_iterations)
            .with_writers(self.writers)
            .with_write_iterations(self.write_iterations)
            .with_hold(Duration::from_millis(self.hold_ms));
        if let Some(ms) = self.acquire_timeout_ms {
            config = config.with_acquire_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.deadline_ms {
            config = config.with_deadline(Duration::from_millis(ms));
        }
        config.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_are_reference_roster() {
        let cli = Cli::parse_from(["turnstile"]);
        assert_eq!(cli.demo_config(), DemoConfig::default());
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(!cli.quiet);
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_roster_flags() {
        let cli = Cli::parse_from([
            "turnstile",
            "--readers",
            "2",
            "--writers",
            "3",
            "--read-iterations",
            "1",
            "--write-iterations",
            "5",
        ]);
        let config = cli.demo_config();
        assert_eq!(config.readers, 2);
        assert_eq!(config.writers, 3);
        assert_eq!(config.expected_reads(), 2);
        assert_eq!(config.expected_writes(), 15);
    }

    #[test]
    fn test_cli_timing_flags() {
        let cli = Cli::parse_from([
            "turnstile",
            "--hold-ms",
            "0",
            "--acquire-timeout-ms",
            "25",
            "--deadline-ms",
            "1000",
        ]);
        let config = cli.demo_config();
        assert!(config.hold.is_zero());
        assert_eq!(config.acquire_timeout, Some(Duration::from_millis(25)));
        assert_eq!(config.deadline, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_cli_timeouts_default_unbounded() {
        let config = Cli::parse_from(["turnstile"]).demo_config();
        assert!(config.acquire_timeout.is_none());
        assert!(config.deadline.is_none());
    }

    #[test]
    fn test_cli_json_format() {
        let cli = Cli::parse_from(["turnstile", "--format", "json"]);
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn test_cli_quiet_short_flag() {
        let cli = Cli::parse_from(["turnstile", "-q"]);
        assert!(cli.quiet);
    }

    #[test]
    fn test_cli_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["turnstile", "--format", "csv"]).is_err());
    }

    #[test]
    fn test_cli_rejects_negative_count() {
        assert!(Cli::try_parse_from(["turnstile", "--readers", "-1"]).is_err());
    }
}
