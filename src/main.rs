use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use turnstile::cli::{Cli, OutputFormat};
use turnstile::driver::{run_roster, Roster};
use turnstile::ledger::Ledger;
use turnstile::narration::Narrator;
use turnstile::report::{render_text, JsonReport};

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config = cli.demo_config();
    if config.is_empty() {
        anyhow::bail!("--readers and --writers cannot both be 0");
    }

    // JSON output must stay parseable, so narration is muted there too
    let narrate = !cli.quiet && cli.format == OutputFormat::Text;
    let out: Box<dyn Write + Send> = if narrate {
        Box::new(io::stdout())
    } else {
        Box::new(io::sink())
    };
    let narrator = Narrator::spawn(out);

    let ledger = Arc::new(Ledger::new(config.hold).with_narration(narrator.handle()));
    let roster = Roster::from_config(&config);
    tracing::info!(
        drivers = roster.len(),
        reads = config.expected_reads(),
        writes = config.expected_writes(),
        "starting roster"
    );

    let summary = run_roster(&roster, &ledger, &config);
    let report = ledger.report();
    let entries = ledger.entries().len();
    drop(ledger);

    narrator
        .finish()
        .context("failed to flush narration output")?;

    match cli.format {
        OutputFormat::Text => print!("{}", render_text(&report, &summary)),
        OutputFormat::Json => println!("{}", JsonReport::new(&report, &summary, entries).to_json()?),
    }

    let failed: Vec<&str> = summary
        .failed_drivers()
        .map(|outcome| outcome.name.as_str())
        .collect();
    if !failed.is_empty() {
        anyhow::bail!("{} driver(s) failed: {}", failed.len(), failed.join(", "));
    }

    Ok(())
}
