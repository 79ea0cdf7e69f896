//! Intent relay binary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relay_node::{server, ConfigLoader, RelayConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "intent-relay")]
#[command(about = "Relays dApp intents to solvers and solutions back", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(short, long, value_name = "FILE", default_value = "config/relay.toml")]
    config: PathBuf,

    /// Overrides `log_level` from the config file.
    #[arg(long, env = "RELAY_LOG_LEVEL")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay
    Start,
    /// Validate the configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .with_file(&cli.config)
        .load()
        .await
        .with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;

    let log_level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    setup_tracing(log_level)?;

    match cli.command {
        Some(Commands::Start) | None => start(config).await,
        Some(Commands::Validate) => validate(&cli, &config),
    }
}

async fn start(config: RelayConfig) -> Result<()> {
    info!("Starting intent relay");
    info!("HTTP port: {}", config.http_port);
    info!("Solution cache TTL: {}s", config.cache_ttl_secs);

    server::run(config).await
}

fn validate(cli: &Cli, config: &RelayConfig) -> Result<()> {
    info!("Configuration {:?} is valid", cli.config);
    info!("dApp role: {}", config.dapp.is_some());
    info!("Solver role: {}", config.solver.is_some());

    if config.upstream.ws_url.as_deref().map_or(true, str::is_empty) {
        info!("Only a gRPC upstream is configured; `start` will refuse it");
    }

    Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to initialize tracing")?;

    Ok(())
}
