//! bread - session cache tooling
//!
//! Main entry point for the bread CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;

mod commands;

use bread_config::LoggingSection;
use commands::{config, simulate};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// bread - exercise and inspect the session cache
#[derive(Parser)]
#[command(name = "bread")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file (default: $BREAD_CONFIG, then ./bread.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Drive concurrent session traffic through the cache
    Simulate(simulate::SimulateArgs),

    /// Configuration inspection
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

const VERBOSE_FILTER: &str = "bread=debug,bread_cache=debug,bread_session=debug,bread_config=debug,info";
const FILE_FILTER: &str = "bread=trace,bread_cache=trace,bread_session=trace,bread_config=trace,info";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = bread_config::load_config(cli.config.as_deref())?;
    let _guard = init_tracing(cli.verbose, &loaded.config.logging);
    for warning in &loaded.warnings {
        warn!("{}", warning);
    }

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        config: loaded.config,
        config_source: loaded.source,
    };

    match cli.command {
        Commands::Simulate(args) => simulate::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}

/// Initialize tracing: console layer on stderr plus, when a log directory
/// is configured, a daily-rolling JSON file.
fn init_tracing(verbose: bool, logging: &LoggingSection) -> Option<WorkerGuard> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = if verbose {
        VERBOSE_FILTER
    } else {
        logging.level.as_str()
    };

    let console = if logging.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(EnvFilter::new(filter))
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(EnvFilter::new(filter))
            .boxed()
    };

    let (file, guard) = match &logging.directory {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "bread.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new(FILE_FILTER));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry().with(console).with(file).init();
    guard
}
