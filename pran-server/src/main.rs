//! pran-server - session authority and Dispatch Bus hub
//!
//! Owns the live session, relays bus events between the table, mirror and
//! admin devices, and serves the catalog and admin APIs.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pran_common::api::load_or_init_admin_digest;
use pran_common::config::{ensure_root_folder, load_config, resolve_root_folder};
use pran_common::db::init_database;
use pran_server::{build_router, seed_catalog, AppState};

/// Command-line arguments for pran-server
#[derive(Parser, Debug)]
#[command(name = "pran-server")]
#[command(about = "Session authority and Dispatch Bus hub for the Pran installation")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "PRAN_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the database
    #[arg(short, long, env = "PRAN_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "PRAN_BIND")]
    bind: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PRAN_PORT")]
    port: Option<u16>,

    /// Admin bearer token; generated and logged once when never configured
    #[arg(long, env = "PRAN_ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,

    /// Catalog manifest to load before serving (replaces existing catalog rows)
    #[arg(long)]
    seed: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    let default_filter = config
        .log_level
        .clone()
        .unwrap_or_else(|| "pran_server=info,pran_common=info,tower_http=info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Pran Server (pran-server) v{}", env!("CARGO_PKG_VERSION"));

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    let db_path = ensure_root_folder(&root_folder).context("Failed to create root folder")?;
    info!("Database path: {}", db_path.display());

    let db = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    if let Some(manifest) = &args.seed {
        seed_catalog(&db, manifest)
            .await
            .with_context(|| format!("Failed to seed catalog from {}", manifest.display()))?;
    }

    let configured_token = args.admin_token.or(config.server.admin_token.clone());
    let (admin_digest, generated) = load_or_init_admin_digest(&db, configured_token.as_deref())
        .await
        .context("Failed to load admin token")?;
    if let Some(token) = generated {
        warn!("Generated admin token (shown once): {}", token);
    }

    let state = AppState::new(db, admin_digest, config.server.event_capacity)
        .await
        .context("Failed to restore session")?;
    let app = build_router(state);

    let bind = args.bind.unwrap_or(config.server.bind);
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", bind, port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("pran-server listening on http://{}", addr);
    info!("Dispatch Bus: ws://{}/bus", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
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
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
