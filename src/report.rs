//! Final wait-time report
//!
//! Text for the console, JSON for `--format json`.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::driver::RunSummary;
use crate::fair_lock::AccessMode;
use crate::wait_stats::{RoleSummary, WaitReport};

/// Closing line of a run where every driver finished every iteration
pub const COMPLETED_LINE: &str = "All operations completed.";
/// Closing line when some iteration or driver was lost
pub const DEGRADED_LINE: &str = "Operations finished with missing samples.";

fn role_label(mode: AccessMode) -> &'static str {
    match mode {
        AccessMode::Shared => "read",
        AccessMode::Exclusive => "write",
    }
}

fn ms_or_no_data(value: Option<f64>) -> String {
    match value {
        Some(ms) => format!("{ms:.3} ms"),
        None => "no data".to_string(),
    }
}

/// Render the human-readable report, one fact per line
pub fn render_text(report: &WaitReport, summary: &RunSummary) -> String {
    let mut out = String::new();
    let modes = [AccessMode::Shared, AccessMode::Exclusive];

    for mode in modes {
        let role = report.role(mode);
        let _ = writeln!(
            out,
            "Average {} wait time: {}",
            role_label(mode),
            ms_or_no_data(role.average_ms())
        );
    }
    for mode in modes {
        let role = report.role(mode);
        let total = role.has_samples().then(|| role.total_ms());
        let _ = writeln!(
            out,
            "Total {} wait time: {}",
            role_label(mode),
            ms_or_no_data(total)
        );
    }
    for mode in modes {
        let role = report.role(mode);
        if role.has_samples() {
            let _ = writeln!(
                out,
                "Longest {} wait: {:.3} ms",
                role_label(mode),
                role.max_ms()
            );
        }
    }

    for mode in modes {
        let role = report.role(mode);
        if role.is_degraded() {
            let _ = writeln!(
                out,
                "Degraded {} samples: {} interrupted, {} timed out",
                role_label(mode),
                role.interrupted,
                role.timed_out
            );
        }
    }

    if summary.deadline_hit {
        let stopped = summary.outcomes.iter().filter(|o| o.interrupted).count();
        let _ = writeln!(out, "Deadline reached: {stopped} driver(s) stopped early");
    }
    for failed in summary.failed_drivers() {
        let _ = writeln!(
            out,
            "Driver {} failed: {}",
            failed.name,
            failed.panic.as_deref().unwrap_or("unknown failure")
        );
    }

    out.push_str(if summary.is_clean() {
        COMPLETED_LINE
    } else {
        DEGRADED_LINE
    });
    out.push('\n');
    out
}

/// Per-role wait figures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRole {
    pub attempts: u64,
    /// Absent when the role has no samples
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_wait_ms: Option<f64>,
    pub total_wait_ms: f64,
    pub max_wait_ms: f64,
    pub interrupted: u64,
    pub timed_out: u64,
    pub degraded: bool,
}

impl From<&RoleSummary> for JsonRole {
    fn from(role: &RoleSummary) -> Self {
        Self {
            attempts: role.attempts,
            avg_wait_ms: role.average_ms(),
            total_wait_ms: role.total_ms(),
            max_wait_ms: role.max_ms(),
            interrupted: role.interrupted,
            timed_out: role.timed_out,
            degraded: role.is_degraded(),
        }
    }
}

/// One driver's outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonDriver {
    pub name: String,
    pub role: String,
    pub planned: usize,
    pub completed: usize,
    pub timed_out: usize,
    pub interrupted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panic: Option<String>,
}

/// Complete JSON report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonReport {
    /// Format version identifier
    pub version: String,
    /// Format name
    pub format: String,
    pub read: JsonRole,
    pub write: JsonRole,
    pub drivers: Vec<JsonDriver>,
    /// Entries in the log after the run
    pub entries: usize,
    pub deadline_hit: bool,
    pub elapsed_ms: f64,
    /// Every driver finished every iteration
    pub completed: bool,
}

impl JsonReport {
    pub fn new(report: &WaitReport, summary: &RunSummary, entries: usize) -> Self {
        let drivers = summary
            .outcomes
            .iter()
            .map(|o| JsonDriver {
                name: o.name.clone(),
                role: role_label(o.mode).to_string(),
                planned: o.planned,
                completed: o.completed,
                timed_out: o.timed_out,
                interrupted: o.interrupted,
                panic: o.panic.clone(),
            })
            .collect();

        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "turnstile-json-v1".to_string(),
            read: JsonRole::from(&report.read),
            write: JsonRole::from(&report.write),
            drivers,
            entries,
            deadline_hit: summary.deadline_hit,
            elapsed_ms: summary.elapsed.as_secs_f64() * 1000.0,
            completed: summary.is_clean(),
        }
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
