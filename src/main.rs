//! Mini Maker - Main Entry Point
//!
//! Paper-trading front end for the strategy core: replays recorded event
//! captures through the mock gateway. Live order entry runs the same core
//! behind an external gateway adapter.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mini_maker::config::Config;
use mini_maker::replay::{load_events, ReplayEngine};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Mini Maker CLI
#[derive(Parser)]
#[command(name = "mini-maker")]
#[command(version, about = "Hedged market making on standard/mini futures pairs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded event capture through the mock gateway
    Replay {
        /// Path to a JSON-lines event capture
        #[arg(short, long)]
        events: PathBuf,

        /// Print the summary as JSON instead of log lines
        #[arg(long)]
        json: bool,
    },

    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load()?;
    config.validate()?;

    match cli.command {
        Commands::Replay { events, json } => run_replay(&config, &events, json),
        Commands::CheckConfig => {
            info!(
                account = %config.account,
                standard = %config.instruments.standard.symbol,
                mini = %config.instruments.mini.symbol,
                threshold = %config.hedging.threshold,
                "configuration OK"
            );
            Ok(())
        }
    }
}

fn run_replay(config: &Config, events_path: &std::path::Path, json: bool) -> Result<()> {
    let events = load_events(events_path)?;

    info!(
        events = events.len(),
        standard = %config.instruments.standard.symbol,
        mini = %config.instruments.mini.symbol,
        "starting replay"
    );

    let mut engine = ReplayEngine::new(config);
    let summary = engine.run(&events);

    if json {
        let rendered = serde_json::to_string_pretty(&summary)
            .context("Failed to serialize replay summary")?;
        println!("{rendered}");
    } else {
        info!(
            events_replayed = summary.events_replayed,
            gateway_events = summary.gateway_events,
            net_qty = %summary.final_position.net_qty,
            "replay finished"
        );
        for leg in &summary.legs {
            info!(
                leg = %leg.name,
                phase = %leg.phase,
                price = ?leg.resting_price,
                qty = ?leg.resting_qty,
                "final leg state"
            );
        }
    }

    Ok(())
}

fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // File appender for detailed logs
    let file_appender = tracing_appender::rolling::daily("logs", "mini-maker.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("mini_maker=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(true)
        .init();

    Ok(())
}
