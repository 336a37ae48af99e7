//! CloudVault Relay Server
//!
//! A self-hostable relay for encrypted vault sync, multipart snapshot
//! backups and device pairing. The relay stores only opaque envelopes and
//! object bytes; it never holds a passphrase or plaintext.

mod auth;
mod cleanup;
mod config;
mod error;
mod handlers;
mod server;
mod state;
#[cfg(test)]
mod tests;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cloudvault-relay", about = "CloudVault sync and backup relay server")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "relay.toml")]
    config: PathBuf,

    /// Listen address override
    #[arg(short, long)]
    listen: Option<String>,

    /// Database path override
    #[arg(short, long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    let mut cfg = if cli.config.exists() {
        config::RelayConfig::load(&cli.config)?
    } else {
        tracing::info!("No config file found, using defaults");
        config::RelayConfig::default()
    };

    if let Some(listen) = cli.listen {
        cfg.listen_addr = listen;
    }
    if let Some(database) = cli.database {
        cfg.storage_path = database;
    }
    cfg.apply_env();
    cfg.validate()?;

    tracing::info!("Starting CloudVault relay on {}", cfg.listen_addr);

    let state = state::AppState::open(&cfg)?;
    cleanup::spawn_cleanup_task(state.store.clone(), cfg.pairing_retention_hours);
    let app = server::build_router(state, &cfg);

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
