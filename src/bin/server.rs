//! EmberKV Server Binary
//!
//! Starts the TCP server for EmberKV.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use emberkv::{Config, Engine, StoreKind};
use tracing_subscriber::{fmt, EnvFilter};

/// EmberKV Server
#[derive(Parser, Debug)]
#[command(name = "emberkv-server")]
#[command(about = "Durable networked key-value store")]
#[command(version)]
struct Args {
    /// Store implementation: simple (single lock) or sharded
    #[arg(short = 's', long, default_value = "simple")]
    store: StoreKind,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Connections served at the same time
    #[arg(short, long, default_value = "1000")]
    workers: usize,

    /// Accepted connections allowed to wait for a worker
    #[arg(short, long, default_value = "10000")]
    queue: usize,

    /// Seconds a queued connection waits for a worker before being dropped
    #[arg(short = 't', long, default_value = "5")]
    acquire_timeout_secs: u64,

    /// Seconds between background snapshots
    #[arg(short = 'i', long, default_value = "300")]
    snapshot_interval_secs: u64,

    /// Snapshot file
    #[arg(long, default_value = "./emberkv_data/snapshot.bin")]
    snapshot_path: PathBuf,

    /// Write-ahead log file
    #[arg(long, default_value = "./emberkv_data/wal.log")]
    wal_path: PathBuf,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,emberkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("EmberKV Server v{}", emberkv::VERSION);
    tracing::info!("Store: {}", args.store);
    tracing::info!("Snapshot: {:?}, WAL: {:?}", args.snapshot_path, args.wal_path);

    let config = Config::builder()
        .store_kind(args.store)
        .listen_addr(&args.listen)
        .worker_pool_size(args.workers)
        .queue_capacity(args.queue)
        .worker_acquire_timeout(Duration::from_secs(args.acquire_timeout_secs))
        .snapshot_interval(Duration::from_secs(args.snapshot_interval_secs))
        .snapshot_path(args.snapshot_path)
        .wal_path(args.wal_path)
        .build();

    let engine = match Engine::open(config) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    let handler_engine = Arc::clone(&engine);
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, initiating shutdown...");
        if let Err(e) = handler_engine.close() {
            tracing::error!("Shutdown failed: {}", e);
        }
    }) {
        tracing::error!("Failed to install Ctrl+C handler: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = engine.serve() {
        tracing::error!("Server error: {}", e);
        let _ = engine.close();
        std::process::exit(1);
    }

    // Returns once the handler has finished the final snapshot.
    if let Err(e) = engine.close() {
        tracing::error!("Shutdown failed: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
