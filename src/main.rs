use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use netcoord::api::{run_api, ApiState};
use netcoord::config::{CoordinatorConfig, DEFAULT_WORKER_SERVICE_BASE};
use netcoord::coordinator::{supervise, Coordinator};
use netcoord::rpc::HttpWorkerClient;
use netcoord::shutdown::install_shutdown_handler;
use netcoord::storage::SnapshotStore;

#[derive(Parser, Debug)]
#[command(name = "netcoord")]
#[command(version)]
#[command(about = "Job queue and worker-pool coordinator for network configuration analysis")]
struct Args {
    /// Address to bind the client API to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port for the client API
    #[arg(long, default_value = "9996")]
    port: u16,

    /// Worker addresses registered at startup (comma-separated host:port)
    #[arg(long, default_value = "")]
    workers: String,

    /// Delay between assignment cycles in milliseconds
    #[arg(long, default_value = "1000")]
    assign_interval_ms: u64,

    /// Delay between status-check cycles in milliseconds
    #[arg(long, default_value = "1000")]
    check_interval_ms: u64,

    /// Timeout for a single worker RPC in milliseconds
    #[arg(long, default_value = "5000")]
    rpc_timeout_ms: u64,

    /// Assignments attempted per cycle (1 = one job per tick)
    #[arg(long, default_value = "8")]
    max_assignments_per_tick: usize,

    /// Status checks performed per cycle
    #[arg(long, default_value = "8")]
    max_checks_per_tick: usize,

    /// Directory for uploaded snapshots, passed to workers as their data dir
    #[arg(long, default_value = "testrigs")]
    storage: PathBuf,

    /// Path prefix of the worker service endpoints
    #[arg(long, default_value = DEFAULT_WORKER_SERVICE_BASE)]
    worker_service_base: String,
}

fn parse_workers(workers: &str) -> Vec<String> {
    workers
        .split(',')
        .map(str::trim)
        .filter(|w| {
            if w.is_empty() {
                return false;
            }
            if !w.contains(':') {
                tracing::warn!(worker = w, "Invalid worker address, expected host:port");
                return false;
            }
            true
        })
        .map(str::to_string)
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let listen_addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    let config = CoordinatorConfig {
        listen_addr,
        assign_interval_ms: args.assign_interval_ms,
        check_interval_ms: args.check_interval_ms,
        rpc_timeout_ms: args.rpc_timeout_ms,
        max_assignments_per_tick: args.max_assignments_per_tick,
        max_checks_per_tick: args.max_checks_per_tick,
        storage_location: args.storage,
        worker_service_base: args.worker_service_base,
        workers: parse_workers(&args.workers),
    };
    config.validate()?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        storage = %config.storage_location.display(),
        workers = ?config.workers,
        "Starting coordinator"
    );

    tokio::fs::create_dir_all(&config.storage_location).await?;

    let client = HttpWorkerClient::new(config.worker_service_base.clone(), config.rpc_timeout())?;
    let store = Arc::new(SnapshotStore::new(config.storage_location.clone()));
    let (coordinator, eager) = Coordinator::new(config.clone(), Arc::new(client));

    let shutdown = install_shutdown_handler();
    // A dead cycle cancels the token, which also stops the API.
    let cycles = tokio::spawn(supervise(
        coordinator.start(eager, shutdown.clone()),
        shutdown.clone(),
    ));

    let state = ApiState { coordinator, store };
    let served = run_api(config.listen_addr, state, shutdown.clone()).await;

    shutdown.cancel();
    let supervised = cycles.await?;

    served?;
    supervised?;
    tracing::info!("Coordinator stopped");
    Ok(())
}
