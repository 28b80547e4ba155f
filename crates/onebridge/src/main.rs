//! # onebridge
//!
//! Gateway binary: loads settings, installs logging and metrics, and serves
//! the OneBot reverse WebSocket endpoint until Ctrl-C.

#![deny(unsafe_code)]

mod handlers;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use onebridge_core::logging::init_subscriber;
use onebridge_settings::{GatewaySettings, load_settings_from_path, settings_path};
use onebridge_server::{GatewayServer, ServerConfig};
use tracing::{info, warn};

/// OneBot v11 reverse WebSocket gateway.
#[derive(Parser, Debug)]
#[command(name = "onebridge", about = "OneBot v11 reverse WebSocket gateway")]
struct Cli {
    /// Settings file (defaults to `~/.onebridge/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Log level or `RUST_LOG`-style filter.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Overlay command-line flags on loaded settings.
    fn apply(&self, settings: &mut GatewaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

fn load(cli: &Cli) -> Result<GatewaySettings> {
    let path = cli.config.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("invalid settings after CLI overrides")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;
    init_subscriber(&settings.logging.level, settings.logging.format);

    let metrics = onebridge_server::metrics::install_recorder().context("failed to install metrics recorder")?;
    let config = ServerConfig::from(&settings);
    let server = GatewayServer::new(config, handlers::default_table(), Some(metrics));

    let (addr, serve) = server
        .listen()
        .await
        .with_context(|| format!("failed to bind {}:{}", settings.server.host, settings.server.port))?;
    info!(%addr, ws_path = %settings.server.ws_path, "onebridge ready");

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("ctrl-c received, shutting down");
    if !server.stop(serve, None).await {
        warn!("some tasks did not stop in time");
    }
    Ok(())
}
