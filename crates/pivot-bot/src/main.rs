//! Pivot-breakout trading core entry point.
//!
//! `run` paper-trades a JSON-lines tick feed from stdin; `replay` drives
//! the same engine deterministically from a recorded file of closed bars.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use pivot_bot::{run_replay, AppConfig, Application};

/// Pivot-breakout trading decision core
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Paper-trade a tick feed read from stdin (JSON lines).
    Run {
        /// Configuration file path (can also be set via PIVOT_CONFIG env var)
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Replay a recorded file of closed bars (JSON lines).
    Replay {
        /// Configuration file path (can also be set via PIVOT_CONFIG env var)
        #[arg(short, long)]
        config: Option<String>,
        /// Bars file, one JSON bar per line
        bars: String,
    },
}

fn config_path(cli_path: Option<&String>) -> String {
    cli_path
        .cloned()
        .or_else(|| std::env::var("PIVOT_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Configuration first: logging takes its default filter from it.
    let path = match &args.command {
        Command::Run { config } | Command::Replay { config, .. } => {
            config_path(config.as_ref())
        }
    };
    let config = AppConfig::from_file(&path)?;
    pivot_telemetry::init_logging(&config.telemetry.log_level)?;
    info!(config_path = %path, "Starting pivot-bot v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Run { .. } => {
            let mut app = Application::new(config)?;
            app.recover()?;
            app.run().await?;
        }
        Command::Replay { bars, .. } => {
            let report = run_replay(&config, &bars)?;
            info!(
                bars = report.bars,
                intents = report.intents,
                trades = report.trades.len(),
                total_pnl = %report.total_pnl(),
                "Replay complete"
            );
        }
    }

    Ok(())
}
