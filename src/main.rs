//! ==============================================================================
//! main.rs - plant buddy node entry point
//! ==============================================================================
//!
//! purpose:
//!     a single unattended node watching one plant. every cycle it samples
//!     soil, light, temperature and humidity, decides how the plant is
//!     feeling, streams that live to websocket listeners and, every 15
//!     minutes, posts it to a remote log.
//!
//! responsibilities:
//!     - load configuration and start logging
//!     - bring up the hal, uplink and both transports
//!     - serve the live websocket + status api
//!     - run the sampling loop until ctrl-c
//!     - `summarize`: offline report over an exported log
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │            current-thread tokio runtime (this file)          │
//!     │  ┌──────────────────────────┐     ┌──────────────────────┐  │
//!     │  │ sampling loop (node.rs)  │     │ web server           │  │
//!     │  │ 1s cycle                 │────▶│ /ws  /api/status  /  │  │
//!     │  └───┬──────────┬───────┬───┘     └──────────────────────┘  │
//!     │      │          │       │     WsBroadcaster / SharedStatus  │
//!     │      ▼          ▼       ▼                                   │
//!     │   hal.rs     link.rs  transport.rs ──▶ remote log (POST)    │
//!     └─────────────────────────────────────────────────────────────┘
//!
//!     nothing after startup is fatal: sensor, link, log and display
//!     failures are logged and the loop carries on.
//!
//! ==============================================================================

mod clock;
mod conditioner;
mod config;
mod display;
mod domain;
mod error;
mod hal;
mod link;
mod mood;
mod node;
mod presentation;
mod scheduler;
mod server;
mod stats;
mod transport;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "plant-buddy-node", version, about = "Smart Plant Buddy sensor node")]
struct Cli {
    /// config file (default: config/node.toml, then ../config/node.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// run the node (default)
    Run,
    /// print statistics for an exported remote log
    Summarize { export: PathBuf },
}

// ==============================================================================
// main entry point
// ==============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // an explicit --config must load; the search path may fall back
    let config = match &cli.config {
        Some(path) => config::NodeConfig::load(path)?,
        None => config::NodeConfig::load_or_default(),
    };
    init_tracing(&config.logging.level);

    match cli.command.unwrap_or(Command::Run) {
        Command::Summarize { export } => {
            let (entries, skipped) = stats::load_entries(&export)?;
            print!("{}", stats::render(&stats::summarize(&entries, skipped)));
            Ok(())
        }
        Command::Run => run(config).await,
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config: config::NodeConfig) -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  Smart Plant Buddy - Sensor Node");
    println!("===========================================================");
    config.print_summary();

    // step 1: shared state between the loop and the web server
    let status: node::SharedStatus = Arc::new(RwLock::new(node::NodeStatus::default()));
    let broadcaster = transport::WsBroadcaster::new(config.broadcast.channel_capacity);

    // step 2: start the web server in background
    let listener = match server::bind(&config.broadcast).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Fatal: {}", e);
            return Err(e);
        }
    };
    tracing::info!("✓ Live stream at ws://{}/ws", listener.local_addr()?);
    let web_state =
        server::ServerState { status: status.clone(), broadcaster: broadcaster.clone() };
    tokio::spawn(async move {
        if let Err(e) = server::serve(listener, web_state).await {
            tracing::error!("Web server error: {}", e);
        }
    });

    // step 3: collaborators
    let hal = hal::Hal::new(config.sensors.adc_i2c_address);
    let link = link::HttpLink::new(&config.link)?;
    if config.link.watch_interval_ms > 0 {
        link.spawn_watch(std::time::Duration::from_millis(config.link.watch_interval_ms));
    }
    let sink = transport::HttpLogSink::new(&config.remote)?;

    // step 4: sampling loop
    let mut node = node::Node::new(config, hal, link, broadcaster, sink, status);
    tokio::select! {
        _ = node.run() => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("ctrl-c received, shutting down"),
    }
    Ok(())
}
