//! Waypoint - caching, concurrent HTTP/1.x forward proxy.
//!
//! # Usage
//! ```bash
//! waypoint --config waypoint.toml
//! waypoint --config waypoint.toml --check    # Validate config only
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use waypoint_config::ConfigLoader;
use waypoint_server::Server;

/// Waypoint - caching HTTP/1.x forward proxy written in Rust
#[derive(Parser, Debug)]
#[command(name = "waypoint")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "waypoint.toml")]
    config: PathBuf,

    /// Validate configuration and exit
    #[arg(long)]
    check: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    tracing::info!("Waypoint v{}", env!("CARGO_PKG_VERSION"));

    let loader = ConfigLoader::load_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    let config = loader.get();

    if args.check {
        tracing::info!("Configuration is valid");
        return Ok(());
    }

    tracing::info!(listen_port = config.listen_port, proxy_id = %config.proxy_id, "Starting Waypoint proxy server...");
    let server = Server::bind((*config).clone())
        .with_context(|| format!("failed to bind listen_port {}", config.listen_port))?;

    server.run().context("server loop exited with an error")?;

    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}
