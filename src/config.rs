//! Configuration for EmberKV
//!
//! Centralized configuration with sensible defaults.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{EmberError, Result};

/// Main configuration for an EmberKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Store Configuration
    // -------------------------------------------------------------------------
    /// Which store implementation backs the server
    pub store_kind: StoreKind,

    // -------------------------------------------------------------------------
    // Persistence Configuration
    // -------------------------------------------------------------------------
    /// Canonical snapshot file; `<path>.tmp` is used while saving
    pub snapshot_path: PathBuf,

    /// Write-ahead log file
    pub wal_path: PathBuf,

    /// Cadence of background snapshots
    pub snapshot_interval: Duration,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Connections that may be served at the same time
    pub worker_pool_size: usize,

    /// Accepted connections that may wait for a worker
    pub queue_capacity: usize,

    /// How long a queued connection waits for a worker before it is dropped
    pub worker_acquire_timeout: Duration,
}

/// Store implementation selected at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    /// One reader-writer lock over the whole map
    #[default]
    Locked,

    /// 1024 independently locked shards with per-key write serialization
    Sharded,
}

impl FromStr for StoreKind {
    type Err = EmberError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "simple" | "locked" => Ok(StoreKind::Locked),
            "sharded" => Ok(StoreKind::Sharded),
            other => Err(EmberError::Config(format!(
                "unknown store kind '{}' (expected 'simple' or 'sharded')",
                other
            ))),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Locked => write!(f, "simple"),
            StoreKind::Sharded => write!(f, "sharded"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_kind: StoreKind::Locked,
            snapshot_path: PathBuf::from("./emberkv_data/snapshot.bin"),
            wal_path: PathBuf::from("./emberkv_data/wal.log"),
            snapshot_interval: Duration::from_secs(5 * 60),
            listen_addr: "127.0.0.1:8080".to_string(),
            worker_pool_size: 1000,
            queue_capacity: 10_000,
            worker_acquire_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            return Err(EmberError::Config("worker_pool_size must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(EmberError::Config("queue_capacity must be at least 1".into()));
        }
        if self.snapshot_interval.is_zero() {
            return Err(EmberError::Config("snapshot_interval must be non-zero".into()));
        }
        if self.snapshot_path == self.wal_path {
            return Err(EmberError::Config(
                "snapshot_path and wal_path must be different files".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the store implementation
    pub fn store_kind(mut self, kind: StoreKind) -> Self {
        self.config.store_kind = kind;
        self
    }

    /// Set the canonical snapshot path
    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.snapshot_path = path.into();
        self
    }

    /// Set the WAL path
    pub fn wal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.wal_path = path.into();
        self
    }

    /// Place both the snapshot and the WAL inside one directory
    pub fn data_dir(self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.snapshot_path(dir.join("snapshot.bin"))
            .wal_path(dir.join("wal.log"))
    }

    /// Set the background snapshot cadence
    pub fn snapshot_interval(mut self, interval: Duration) -> Self {
        self.config.snapshot_interval = interval;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the number of connections served concurrently
    pub fn worker_pool_size(mut self, size: usize) -> Self {
        self.config.worker_pool_size = size;
        self
    }

    /// Set the capacity of the pending-connection queue
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Set how long a queued connection may wait for a worker
    pub fn worker_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config.worker_acquire_timeout = timeout;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
