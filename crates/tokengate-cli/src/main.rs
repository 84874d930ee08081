use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod proxy;
mod server;

use config::TokengateConfig;
use proxy::Upstream;
use server::GateServer;
use tokengate_core::Gate;

#[derive(Parser)]
#[command(name = "tokengate")]
#[command(version)]
#[command(about = "tokengate: shared-secret gate in front of an HTTP service")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gate in front of the configured upstream
    Serve,

    /// Write a default config file
    Init,

    /// Show current configuration (tokens masked)
    Config,

    /// Check whether the configured gate accepts a token
    Check {
        /// Raw token, without any "Bearer " prefix
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Init => cmd_init(&cli.config).await,
        Commands::Config => cmd_config(&cli.config),
        Commands::Serve => cmd_serve(&cli.config).await,
        Commands::Check { token } => cmd_check(&cli.config, &token),
    }
}

async fn cmd_init(config_path: &Option<PathBuf>) -> Result<()> {
    let path = config_path
        .clone()
        .unwrap_or_else(config::default_config_path);

    if path.exists() {
        warn!("Config already exists at {}", path.display());
        return Ok(());
    }

    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create config dir: {}", dir.display()))?;
    }

    let default_config = include_str!("../../../config/default.toml");
    tokio::fs::write(&path, default_config)
        .await
        .with_context(|| format!("Failed to write config: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    info!("Created default config at {}", path.display());
    println!("Edit {} and set TOKENGATE_TOKEN to configure the gate.", path.display());
    Ok(())
}

fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = TokengateConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.masked())?);
    Ok(())
}

fn build_gate(cfg: &TokengateConfig) -> Result<Gate> {
    Gate::from_settings(cfg.gate.clone()).context("Invalid [gate] configuration")
}

fn cmd_check(config_path: &Option<PathBuf>, token: &str) -> Result<()> {
    let cfg = TokengateConfig::load(config_path)?;
    let gate = build_gate(&cfg)?;
    let candidate = gate.config().carrier_form(token);
    if gate.validate(&candidate) {
        println!("accepted");
        Ok(())
    } else {
        anyhow::bail!("token rejected by the configured gate")
    }
}

async fn cmd_serve(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = TokengateConfig::load(config_path)?;
    info!("Starting tokengate...");

    let gate = build_gate(&cfg)?;
    let upstream_url = cfg.server.upstream_url()?;
    info!("Protecting upstream {}", upstream_url);

    let upstream = Upstream::new(
        upstream_url,
        cfg.server.timeout(),
        cfg.server.max_body_bytes,
    )?;

    GateServer::new(cfg.server.bind, gate, upstream).run().await
}
