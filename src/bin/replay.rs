//! Replay tool - run a recorded quote capture through the detector
//!
//! Run with: cargo run --bin replay -- captures/session.bin
//!
//! The capture is a plain concatenation of 32-byte wire records. Records are
//! fed in batches; the clock used for staleness is the newest timestamp seen
//! so far, so a replay behaves like the live feed did.

use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use console::style;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use triangulator::feed::{decode_events, MAX_RECORDS_PER_DATAGRAM, RECORD_SIZE};
use triangulator::{ArbitrageSession, Config};

#[derive(Parser, Debug)]
#[command(name = "replay", about = "Replay a quote capture through the arbitrage detector")]
struct Cli {
    /// Capture file of concatenated 32-byte records
    capture: PathBuf,

    /// Records per batch (one detector run per batch)
    #[arg(long, default_value_t = MAX_RECORDS_PER_DATAGRAM)]
    batch: usize,

    /// TOML configuration file for the detector settings
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Byte length of a batch; a huge `--batch` means the whole capture at once
fn batch_bytes(batch: usize) -> usize {
    RECORD_SIZE.saturating_mul(batch)
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("triangulator=warn".parse()?),
        )
        .init();

    let cli = Cli::parse();
    if cli.batch == 0 {
        return Err(eyre!("--batch must be at least 1"));
    }

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.detector.validate()?;

    let data = fs::read(&cli.capture)?;
    if data.len() % RECORD_SIZE != 0 {
        println!(
            "{} capture has {} trailing bytes, ignoring them",
            style("⚠").yellow(),
            data.len() % RECORD_SIZE
        );
    }

    println!(
        "🔁 Replaying {} records from {} (batch {})",
        data.len() / RECORD_SIZE,
        cli.capture.display(),
        cli.batch
    );

    let mut session = ArbitrageSession::new(config.detector.clone());
    let mut clock = None;
    let mut found = 0usize;

    for chunk in data.chunks(batch_bytes(cli.batch)) {
        let events = decode_events(chunk);

        let Some(batch_latest) = events.iter().map(|e| e.observed_at).max() else {
            continue;
        };
        let now = match clock {
            Some(prev) if prev > batch_latest => prev,
            _ => batch_latest,
        };
        clock = Some(now);

        if let Some(opportunity) = session.process_batch(&events, now) {
            found += 1;
            let report = &opportunity.report;
            println!(
                "{} {} | {} | {} {:.2} -> {:.6} ({:+.6}%)",
                style("💰").green(),
                now.format("%H:%M:%S%.6f"),
                style(&opportunity.cycle).cyan(),
                report.start,
                report.initial_notional,
                report.final_notional,
                report.profit_percentage()
            );
        }
    }

    let stats = session.stats();
    println!();
    println!("Summary:");
    println!("  • Quotes applied: {}", stats.applied);
    println!("  • Out of sequence: {}", stats.out_of_sequence);
    println!("  • Rejected: {}", stats.rejected);
    println!("  • Stale edges evicted: {}", stats.evicted);
    println!("  • Evaluations: {} ({} skipped)", stats.evaluations, stats.skipped_evaluations);
    println!("  • Untraceable cycles: {}", stats.untraceable);
    println!("  • Opportunities: {}", found);

    Ok(())
}
