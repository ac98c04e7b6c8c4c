//! Snapshot Persister
//!
//! Saves point-in-time copies of a store and rebuilds a store at startup
//! from the latest snapshot plus the WAL entries stamped after it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::clock::{self, Timestamp};
use crate::error::Result;
use crate::store::KeyValueStore;
use crate::wal::{ReplayStats, WriteAheadLog};

use super::snapshot::{self, Snapshot};

/// What a completed save wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub timestamp: Timestamp,
    pub entries: usize,
    pub bytes: u64,
}

/// What startup recovery found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// `Timestamp::ZERO` when there was no snapshot
    pub snapshot_timestamp: Timestamp,

    pub snapshot_entries: usize,

    pub wal: ReplayStats,
}

/// Periodic and on-demand snapshots of one store
pub struct SnapshotPersister<S: ?Sized> {
    store: Arc<S>,
    path: PathBuf,

    /// Held for the duration of a save; remembers the last one
    save_guard: Mutex<Option<SnapshotInfo>>,
}

impl<S: KeyValueStore + ?Sized + 'static> SnapshotPersister<S> {
    pub fn new(store: Arc<S>, path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            path: path.into(),
            save_guard: Mutex::new(None),
        }
    }

    /// Write a snapshot of the store and publish it atomically
    ///
    /// Saves never overlap: a second caller waits for the first to finish.
    pub fn save_to_disk(&self) -> Result<SnapshotInfo> {
        let mut last = self.save_guard.lock();

        // Stamp before reading, so every mutation missed by the copy is
        // stamped after it and gets replayed.
        let timestamp = clock::now();
        let entries = self.store.get_all();
        let snapshot = Snapshot { timestamp, entries };

        let bytes = snapshot::write(&self.path, &snapshot).inspect_err(|e| {
            tracing::error!("Snapshot to {:?} failed: {}", self.path, e);
        })?;

        let info = SnapshotInfo {
            timestamp,
            entries: snapshot.entries.len(),
            bytes,
        };
        tracing::info!(
            "Snapshot saved to {:?}: {} entries, {} bytes, at {}",
            self.path,
            info.entries,
            info.bytes,
            info.timestamp
        );
        *last = Some(info);
        Ok(info)
    }

    /// Rebuild the store: latest snapshot, then WAL entries newer than it
    ///
    /// Run once, before serving. A missing snapshot means an empty store at
    /// the beginning of time; a damaged snapshot or a WAL with interior
    /// corruption is an error.
    pub fn load_from_disk(&self, wal: &WriteAheadLog) -> Result<RecoveryReport> {
        let tmp = snapshot::temp_path(&self.path);
        if tmp.exists() {
            tracing::warn!("Removing unfinished snapshot {:?}", tmp);
            fs::remove_file(&tmp)?;
        }

        let (snapshot_timestamp, snapshot_entries) = match snapshot::read(&self.path)? {
            Some(snapshot) => {
                for (key, value) in &snapshot.entries {
                    self.store.apply_set(key, value);
                }
                tracing::info!(
                    "Loaded snapshot {:?}: {} entries at {}",
                    self.path,
                    snapshot.entries.len(),
                    snapshot.timestamp
                );
                (snapshot.timestamp, snapshot.entries.len())
            }
            None => {
                tracing::info!("No snapshot at {:?}, starting empty", self.path);
                (Timestamp::ZERO, 0)
            }
        };
        clock::observe(snapshot_timestamp);

        let replayed = wal.replay_after(snapshot_timestamp, &*self.store)?;
        clock::observe(replayed.last_timestamp);

        Ok(RecoveryReport {
            snapshot_timestamp,
            snapshot_entries,
            wal: replayed,
        })
    }

    /// Save every `interval` on a background thread until the handle is stopped
    pub fn start_periodic(self: &Arc<Self>, interval: Duration) -> Result<PeriodicSnapshots> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let persister = Arc::clone(self);

        let handle = thread::Builder::new()
            .name("snapshot".to_string())
            .spawn(move || {
                tracing::debug!("Periodic snapshots every {:?}", interval);
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            // Already logged; the next tick retries.
                            let _ = persister.save_to_disk();
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::debug!("Periodic snapshots stopped");
            })?;

        Ok(PeriodicSnapshots {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// The most recent successful save made through this persister
    pub fn last_snapshot(&self) -> Option<SnapshotInfo> {
        *self.save_guard.lock()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

/// Handle to the background snapshot thread; stopping it joins the thread
pub struct PeriodicSnapshots {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicSnapshots {
    /// Stop ticking; a save already in progress finishes first
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Snapshot thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for PeriodicSnapshots {
    fn drop(&mut self) {
        self.stop();
    }
}
