//! labwire bridge host
//!
//! Serves every built-in model over localhost TCP until interrupted.
//! Dialogs are answered headlessly.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use lw_core::config;
use lw_models::{BridgeHost, HeadlessDialogs};

#[derive(Parser)]
#[command(name = "labwire-host")]
#[command(about = "Serve labwire GUI models to kernels over localhost TCP")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address; must be a loopback address
    #[arg(short, long, default_value = "127.0.0.1:7821")]
    bind: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    lw_core::logging::init(&args.log_level);

    let config = config::load_or_default(args.config.as_deref())
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    tracing::info!("labwire host starting on {}", args.bind);

    let host = Arc::new(BridgeHost::with_app(config, Arc::new(HeadlessDialogs::new())));

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Received Ctrl+C, shutting down");
        on_signal.cancel();
    });

    host.serve_tcp(&args.bind, shutdown).await
}
