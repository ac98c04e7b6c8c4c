//! Engine Module
//!
//! Wires the components of one EmberKV instance together.
//!
//! ## Responsibilities
//! - Open the WAL and build the configured store on top of it
//! - Recover state from the latest snapshot plus the WAL
//! - Run periodic snapshots and the TCP server
//! - Shut down cleanly: final snapshot, then close the WAL

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{Config, StoreKind};
use crate::error::Result;
use crate::network::{Server, ShutdownHandle};
use crate::persistence::{PeriodicSnapshots, RecoveryReport, SnapshotInfo, SnapshotPersister};
use crate::store::{KeyValueStore, LockedStore, ShardedStore};
use crate::wal::WriteAheadLog;

/// A running EmberKV instance
///
/// ## Lifecycle
/// `open` recovers and starts background snapshots, `serve` blocks on the
/// accept loop, and `close` (from any thread) stops the server, writes a
/// final snapshot and closes the WAL. After `close`, writes fail with
/// `WalClosed` and are not applied.
pub struct Engine {
    config: Config,

    /// Shared with the store, which appends through it
    wal: Arc<WriteAheadLog>,

    store: Arc<dyn KeyValueStore>,

    persister: Arc<SnapshotPersister<dyn KeyValueStore>>,

    periodic: Mutex<Option<PeriodicSnapshots>>,

    /// Set while `serve` is running
    server: Mutex<Option<ShutdownHandle>>,

    recovery: RecoveryReport,

    /// Held for the whole of `close`
    closed: Mutex<bool>,
}

impl Engine {
    /// Open or create an instance with the given config
    ///
    /// On startup:
    /// 1. Open the WAL, moving a torn tail aside
    /// 2. Build the configured store, durable from the first write
    /// 3. Load the snapshot and replay newer WAL entries
    /// 4. Start periodic snapshots
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let wal = Arc::new(WriteAheadLog::open(&config.wal_path)?);

        let store: Arc<dyn KeyValueStore> = match config.store_kind {
            StoreKind::Locked => Arc::new(LockedStore::new().attach_log(Arc::clone(&wal))),
            StoreKind::Sharded => Arc::new(ShardedStore::new().attach_log(Arc::clone(&wal))),
        };

        let persister = Arc::new(SnapshotPersister::new(
            Arc::clone(&store),
            config.snapshot_path.clone(),
        ));
        let recovery = persister.load_from_disk(&wal)?;
        tracing::info!(
            "Recovered {} keys ({} from snapshot at {}, {} WAL entries applied{})",
            store.len(),
            recovery.snapshot_entries,
            recovery.snapshot_timestamp,
            recovery.wal.entries_applied,
            if recovery.wal.truncated_tail { ", torn tail dropped" } else { "" }
        );

        let periodic = persister.start_periodic(config.snapshot_interval)?;

        Ok(Self {
            config,
            wal,
            store,
            persister,
            periodic: Mutex::new(Some(periodic)),
            server: Mutex::new(None),
            recovery,
            closed: Mutex::new(false),
        })
    }

    /// Bind the configured address and serve until `close` (blocking)
    pub fn serve(&self) -> Result<()> {
        let server = Server::bind(&self.config, Arc::clone(&self.store))?;
        self.serve_on(server)
    }

    /// Serve on an already bound server until `close` (blocking)
    pub fn serve_on(&self, server: Server) -> Result<()> {
        {
            let closed = self.closed.lock();
            if *closed {
                return Ok(());
            }
            *self.server.lock() = Some(server.shutdown_handle());
        }
        let result = server.run();
        *self.server.lock() = None;
        result
    }

    /// Bind a server for this engine's store without running it
    pub fn bind(&self) -> Result<Server> {
        Server::bind(&self.config, Arc::clone(&self.store))
    }

    /// Save a snapshot now
    pub fn snapshot_now(&self) -> Result<SnapshotInfo> {
        self.persister.save_to_disk()
    }

    /// Stop serving, write a final snapshot and close the WAL
    ///
    /// Safe to call more than once and from any thread. Only the first call
    /// does the work; later calls wait for it to finish.
    pub fn close(&self) -> Result<()> {
        let mut closed = self.closed.lock();
        if *closed {
            return Ok(());
        }
        *closed = true;
        tracing::info!("Shutting down");

        if let Some(server) = self.server.lock().take() {
            server.shutdown();
        }
        if let Some(mut periodic) = self.periodic.lock().take() {
            periodic.stop();
        }

        let snapshot = self.persister.save_to_disk();
        let wal = self.wal.close();
        snapshot?;
        wal?;

        tracing::info!("Shutdown complete");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn wal(&self) -> &WriteAheadLog {
        &self.wal
    }

    /// What startup recovery found
    pub fn recovery(&self) -> &RecoveryReport {
        &self.recovery
    }

    pub fn last_snapshot(&self) -> Option<SnapshotInfo> {
        self.persister.last_snapshot()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
