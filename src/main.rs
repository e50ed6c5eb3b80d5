use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use call_chain_tagger::commands;
use call_chain_tagger::config;
use call_chain_tagger::logging;

#[derive(Parser, Debug)]
#[command(name = "call-chain-tagger")]
#[command(about = "Tags persistence diagnostics with the call chain that caused them", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (YAML/JSON/TOML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Replay the reference call chains and print the tagged lines (default)
    Demo,
    /// Validate the configuration and print the effective settings
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration first; logging settings come from it
    let mut config = match &args.config {
        Some(path) => config::load_from_path(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => config::load_from_env_or_file().context("Failed to load configuration")?,
    };

    if args.json {
        config.logging.format = config::LogFormat::Json;
    }
    logging::init(&config.logging, args.debug)?;

    match &args.config {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => info!("Configuration loaded from default locations"),
    }

    match args.command.unwrap_or(Command::Demo) {
        Command::Check => {
            commands::run_config_check(&config)?;
        }
        Command::Demo => {
            info!("Replaying reference call chains");
            let report = commands::run_demo(config).await?;
            if !report.all_passed() {
                error!("Some scenarios did not resolve the expected tags");
                anyhow::bail!(
                    "{} of {} scenarios failed",
                    report.scenarios.iter().filter(|s| !s.passed).count(),
                    report.scenarios.len()
                );
            }
            info!("All {} scenarios passed", report.scenarios.len());
        }
    }

    Ok(())
}
