//! parkgate: run the gate controller on the simulation bench.
//!
//! Reads bench commands from stdin (see `parkgate::console`) and serves the
//! status API until SIGINT, SIGTERM or `quit`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use parkgate::GateConfig;
use parkgate::console::{SimBench, run_console};
use parkgate::devices::sim::{ChannelTokenReader, LogActuator, LogDisplay};
use parkgate::event_loop::EventLoops;
use parkgate::service::{Devices, GateService};
use parkgate::state::{ParkingState, SharedState};
use parkgate::store::TokenStore;
use parkgate::transport::{serve, shutdown_signal};

#[derive(Debug, Parser)]
#[command(name = "parkgate", version, about = "RFID parking gate controller")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "PARKGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Address for the status API
    #[arg(long, env = "PARKGATE_HOST")]
    host: Option<String>,

    /// Port for the status API
    #[arg(long, env = "PARKGATE_PORT")]
    port: Option<u16>,

    /// Number of parking slots
    #[arg(long, env = "PARKGATE_CAPACITY")]
    capacity: Option<usize>,

    /// Directory holding rfid_data.json and reserved_data.json
    #[arg(long, env = "PARKGATE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Do not read bench commands from stdin
    #[arg(long)]
    no_console: bool,
}

impl Cli {
    /// Defaults, then the config file, then flags and environment.
    fn resolve(&self) -> anyhow::Result<GateConfig> {
        let mut config = match &self.config {
            Some(path) => GateConfig::load(path)?,
            None => GateConfig::default(),
        };
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(capacity) = self.capacity {
            config.parking.capacity = capacity;
        }
        if let Some(dir) = &self.data_dir {
            config.parking.data_dir = dir.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

/// Initialize tracing with PARKGATE_LOG / RUST_LOG and LOG_FORMAT=json.
fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("PARKGATE_LOG").as_deref() {
            Ok("debug") => "debug",
            Ok("trace") => "trace",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("parkgate={level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = cli.resolve()?;

    let storage = config.parking.storage();
    tracing::info!(
        registry = %storage.registry_path().display(),
        reserved = %storage.reserved_path().display(),
        "Loading card registry"
    );
    let tokens = TokenStore::load(Box::new(storage)).context("failed to load card registry")?;
    let state = SharedState::new(ParkingState::new(tokens, config.parking.capacity));

    let shutdown = CancellationToken::new();
    let (cards, reader) = ChannelTokenReader::new(8);
    let devices = Devices {
        reader: Arc::new(reader),
        actuator: Arc::new(LogActuator),
        display: Arc::new(LogDisplay),
    };
    let service = Arc::new(GateService::from_config(
        &config,
        state,
        devices,
        shutdown.clone(),
    ));
    let occupancy = service.occupancy();
    tracing::info!(
        capacity = occupancy.capacity,
        registered = occupancy.registered,
        reserved = occupancy.reserved,
        "Gate controller ready"
    );

    let bench = SimBench::new(cards, &config.inputs);
    let loops = EventLoops::spawn(
        Arc::clone(&service),
        bench.triggers(&config.inputs),
        &config.inputs,
    );
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let idle_bench = if cli.no_console {
        Some(bench)
    } else {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        tokio::spawn(run_console(stdin, bench, Arc::clone(&service)));
        None
    };

    let served = serve(config.server.clone(), Arc::clone(&service)).await;
    if let Err(e) = &served {
        tracing::error!(error = %e, "Status API failed");
        service.trigger_shutdown();
    }

    loops.join().await;
    drop(idle_bench);
    tracing::info!("Gate controller stopped");
    served
}
