//! pran-mirror - mirror device runtime
//!
//! Follows the session over the Dispatch Bus, derives the mirror's visual
//! state and releases the table's image-reveal pauses.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pran_common::client::{BusClient, ClientOptions};
use pran_common::config::{bus_url, load_config};
use pran_mirror::MirrorRuntime;

/// Command-line arguments for pran-mirror
#[derive(Parser, Debug)]
#[command(name = "pran-mirror")]
#[command(about = "Mirror device runtime for the Pran installation")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "PRAN_CONFIG")]
    config: Option<PathBuf>,

    /// Server base URL
    #[arg(short, long, env = "PRAN_SERVER_URL")]
    server_url: Option<String>,

    /// How long revealed images stay up, in milliseconds
    #[arg(long, env = "PRAN_IMAGE_DISPLAY_MS")]
    image_display_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    let default_filter = config
        .log_level
        .clone()
        .unwrap_or_else(|| "pran_mirror=info,pran_common=info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Pran Mirror (pran-mirror) v{}", env!("CARGO_PKG_VERSION"));

    let server_url = args.server_url.unwrap_or(config.mirror.server_url.clone());
    let image_display =
        Duration::from_millis(args.image_display_ms.unwrap_or(config.mirror.image_display_ms));

    let url = bus_url(&server_url, "mirror");
    info!("Dispatch Bus: {}", url);
    let (client, inbound) = BusClient::connect(url, ClientOptions::default());

    MirrorRuntime::new(image_display, client)
        .run(inbound, shutdown_signal())
        .await;

    info!("Mirror shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
