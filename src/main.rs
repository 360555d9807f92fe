//! The Triangulator - Currency Arbitrage Detector
//!
//! Run with: cargo run -- [--config triangulator.toml]
//!
//! Subscribes to the quote publisher, keeps a live rate graph per
//! subscription window and reports every profitable currency cycle.

use chrono::Utc;
use clap::Parser;
use color_eyre::eyre::Result;
use console::style;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use triangulator::brain::OpportunityLog;
use triangulator::cartographer::Currency;
use triangulator::feed::FeedSubscriber;
use triangulator::{ArbitrageSession, Config, Opportunity};

#[derive(Parser, Debug)]
#[command(name = "triangulator", about = "Currency arbitrage detector for a streaming quote feed")]
struct Cli {
    /// TOML configuration file (environment / .env is used otherwise)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Quote publisher address, e.g. 127.0.0.1:50411
    #[arg(long)]
    publisher: Option<std::net::SocketAddr>,

    /// Anchor currency for every shortest-path run
    #[arg(long)]
    anchor: Option<Currency>,

    /// Staleness threshold in seconds
    #[arg(long)]
    stale_secs: Option<f64>,

    /// Do not append opportunities to the log file
    #[arg(long)]
    no_log: bool,
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🔺 THE TRIANGULATOR - Currency Arbitrage Detector").cyan().bold()
    );
    println!(
        "{}",
        style("    Live Rate Graph | Bellman-Ford | Negative Cycles").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn print_opportunity(opportunity: &Opportunity) {
    let report = &opportunity.report;

    println!();
    println!(
        "{} {}",
        style("💰 ARBITRAGE:").green().bold(),
        style(&opportunity.cycle).cyan()
    );
    println!(
        "   Start with {} {:.2}",
        report.start, report.initial_notional
    );
    for leg in &report.legs {
        println!(
            "   Exchange {} for {} at {:.6} --> {} {:.6}",
            leg.from, leg.to, leg.rate, leg.to, leg.notional
        );
    }
    println!(
        "   Margin: {}",
        style(format!("{:+.6}%", report.profit_percentage())).green()
    );
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    if let Some(publisher) = cli.publisher {
        config.publisher_addr = publisher;
    }
    if let Some(anchor) = cli.anchor {
        config.detector.anchor = anchor;
    }
    if let Some(stale_secs) = cli.stale_secs {
        config.detector.stale_after_secs = stale_secs;
    }
    if cli.no_log {
        config.opportunity_log = false;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("triangulator=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    print_banner();

    // Load configuration
    let config = load_config(&cli)?;

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file or --config");
        return Err(e);
    }

    // Print configuration summary
    config.print_summary();
    println!();

    let mut subscriber = FeedSubscriber::bind(&config).await?;
    let mut session = ArbitrageSession::new(config.detector.clone());

    let log_path = config.opportunity_log.then(|| config.opportunity_log_path.clone());

    let on_opportunity = |opportunity: &Opportunity| {
        print_opportunity(opportunity);

        if let Some(path) = &log_path {
            let entry = OpportunityLog::new(Utc::now(), &opportunity.cycle, &opportunity.report);
            if let Err(e) = entry.append_to_file(path) {
                warn!("Failed to write opportunity log {}: {}", path, e);
            }
        }
    };

    tokio::select! {
        result = subscriber.run(&mut session, on_opportunity) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    let stats = session.stats();
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").green()
    );
    println!("Last session:");
    println!("  • Quotes applied: {}", stats.applied);
    println!("  • Out of sequence: {}", stats.out_of_sequence);
    println!("  • Rejected: {}", stats.rejected);
    println!("  • Stale edges evicted: {}", stats.evicted);
    println!("  • Evaluations: {} ({} skipped)", stats.evaluations, stats.skipped_evaluations);
    println!("  • Untraceable cycles: {}", stats.untraceable);
    println!("  • Opportunities: {}", stats.opportunities);
    println!();

    Ok(())
}
