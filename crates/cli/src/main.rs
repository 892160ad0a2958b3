//! abrbench CLI - Main Entry Point
//!
//! Runs the ABR evaluation catalog against a local player deployment:
//! one network profile and one fresh browser session per test, scored and
//! written to a JSON report.

use abrbench_harness::HarnessConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;

use commands::run;

/// abrbench - ABR streaming QoE evaluation harness
#[derive(Parser)]
#[command(name = "abrbench")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "abrbench.toml", env = "ABRBENCH_CONFIG", global = true)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole catalog, a single test, or `list` the catalog
    Run(run::RunArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => {
            let config = HarnessConfig::load(&cli.config)?;
            run::execute(args, config, cli.format).await?
        }
        Commands::Version => {
            println!("abrbench v{}", abrbench_common::VERSION);
            println!("Telemetry contract: v{}", abrbench_harness::telemetry::TELEMETRY_CONTRACT_VERSION);
        }
    }

    Ok(())
}
