//! Transfer - ETL pipeline runner
//!
//! # Usage
//!
//! ```bash
//! # Run the pipelines (default)
//! transfer
//! transfer run --config configs/config.toml
//!
//! # Validate a configuration and build its pipelines without starting them
//! transfer check --config configs/config.toml
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use transfer_collector::{Collector, logging, shutdown_signal};
use transfer_config::Config;

/// Transfer - ETL pipeline runner
#[derive(Parser, Debug)]
#[command(name = "transfer")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file
    #[arg(short, long, default_value = "configs/config.toml", global = true)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every configured pipeline until shutdown
    Run,

    /// Validate the configuration and build the pipelines
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load(&cli.config)?;
    logging::init(&config.log, cli.log_level.as_deref())?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config, &cli.config).await,
        Command::Check => check(config),
    }
}

fn load(path: &Path) -> Result<Config> {
    if !path.exists() {
        anyhow::bail!("config file not found: {}", path.display());
    }
    Config::from_file(path).with_context(|| format!("failed to load {}", path.display()))
}

async fn run(config: Config, path: &Path) -> Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %path.display(),
        pipelines = config.pipelines.len(),
        "transfer starting"
    );

    let summary = Collector::new(config).run(shutdown_signal()).await?;
    if summary.failed > 0 {
        anyhow::bail!("{} pipeline(s) did not stop cleanly", summary.failed);
    }
    tracing::info!("transfer shutdown complete");
    Ok(())
}

fn check(config: Config) -> Result<()> {
    let collector = Collector::new(config);
    let pipelines = collector.build()?;
    for pipeline in &pipelines {
        println!("{}: {} nodes", pipeline.name(), pipeline.nodes().len());
        for node in pipeline.nodes() {
            println!("  {node}");
        }
    }
    println!(
        "configuration ok: {} of {} pipeline(s) built",
        pipelines.len(),
        collector.config().pipelines.len()
    );
    Ok(())
}
