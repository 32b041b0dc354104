//! pran-table - table device runtime
//!
//! Connects to the Dispatch Bus, joins the master election with sibling
//! instances, and plays the clip queue for the current session phase.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pran_common::client::{BusClient, ClientOptions};
use pran_common::config::{bus_url, load_config, resolve_root_folder, MASTER_SLOT_FILE};
use pran_common::election::{FileSlot, MasterElection};
use pran_common::BusEvent;
use pran_table::catalog_client::HttpCatalog;
#[cfg(feature = "device")]
use pran_table::output::DeviceOutput;
use pran_table::output::{AudioOutput, OutputEvent, TimedOutput};
use pran_table::scheduler::GapPolicy;
use pran_table::{AmbiencePaths, SchedulerConfig, TableRuntime};

/// How long to wait for the bus before claiming anyway
const CONNECT_GRACE: Duration = Duration::from_secs(5);

/// Command-line arguments for pran-table
#[derive(Parser, Debug)]
#[command(name = "pran-table")]
#[command(about = "Table device runtime for the Pran installation")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "PRAN_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the election slot
    #[arg(short, long, env = "PRAN_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Server base URL
    #[arg(short, long, env = "PRAN_SERVER_URL")]
    server_url: Option<String>,

    /// Media folder that clip paths are relative to
    #[arg(long, env = "PRAN_MEDIA_ROOT")]
    media_root: Option<PathBuf>,

    /// Time clips from catalog durations instead of playing them
    #[arg(long, env = "PRAN_TIMED_OUTPUT")]
    timed_output: bool,
}

/// Everything the runtime needs besides its output
struct Wiring {
    config: SchedulerConfig,
    ambience: AmbiencePaths,
    catalog: HttpCatalog,
    client: BusClient,
    master: watch::Receiver<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    let default_filter = config
        .log_level
        .clone()
        .unwrap_or_else(|| "pran_table=info,pran_common=info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Pran Table (pran-table) v{}", env!("CARGO_PKG_VERSION"));

    let table = config.table.clone();
    let server_url = args.server_url.unwrap_or(table.server_url.clone());
    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create {}", root_folder.display()))?;
    let media_root = args
        .media_root
        .unwrap_or_else(|| PathBuf::from(&table.media_root));

    let url = bus_url(&server_url, "table");
    info!("Dispatch Bus: {}", url);
    let (client, inbound) = BusClient::connect(url, ClientOptions::default());

    let mut link = client.connectivity();
    if tokio::time::timeout(CONNECT_GRACE, link.wait_for(|up| *up))
        .await
        .is_err()
    {
        warn!("Bus not reachable yet; claim will be announced once connected");
    }

    let slot = Arc::new(FileSlot::new(root_folder.join(MASTER_SLOT_FILE)));
    let election = MasterElection::start(
        slot,
        Arc::new(client.siblings()),
        Duration::from_millis(table.ping_timeout_ms),
    );
    // The newest instance takes over audio
    election
        .force_claim()
        .context("Failed to claim the master slot")?;
    info!("Tab {} claimed master", election.tab_id());

    let wiring = Wiring {
        config: SchedulerConfig {
            gaps: GapPolicy {
                clip_gap: Duration::from_millis(table.clip_gap_ms),
                pre_choice_gap: Duration::from_millis(table.pre_choice_gap_ms),
            },
            auto_reset: Duration::from_millis(table.auto_reset_ms),
        },
        ambience: AmbiencePaths {
            intro: table.intro_ambience.clone(),
            closing: table.closing_ambience.clone(),
        },
        catalog: HttpCatalog::new(&server_url).context("Failed to build catalog client")?,
        client,
        master: election.subscribe(),
    };

    if args.timed_output {
        info!("Timed output selected; no sound device will be opened");
    } else {
        #[cfg(feature = "device")]
        match DeviceOutput::open(media_root.clone(), table.ambience_volume) {
            Ok((output, events)) => {
                run(wiring, output, events, inbound).await;
                return finish(election);
            }
            Err(e) => warn!("Sound device unavailable ({}), using timed output", e),
        }
    }

    let (output, events) = TimedOutput::new(Duration::from_millis(table.default_clip_ms));
    run(wiring, output.with_media_root(media_root), events, inbound).await;
    finish(election)
}

async fn run<O: AudioOutput>(
    wiring: Wiring,
    output: O,
    events: mpsc::UnboundedReceiver<OutputEvent>,
    inbound: broadcast::Receiver<BusEvent>,
) {
    let runtime = TableRuntime::new(
        wiring.config,
        wiring.ambience,
        wiring.catalog,
        output,
        events,
        wiring.client,
        wiring.master,
    );
    runtime.run(inbound, shutdown_signal()).await;
}

fn finish(election: MasterElection) -> Result<()> {
    if let Err(e) = election.release() {
        warn!("Failed to release master slot: {}", e);
    }
    info!("Table shutdown complete");
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
