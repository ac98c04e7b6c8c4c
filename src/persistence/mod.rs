//! Persistence Module
//!
//! Snapshots plus WAL replay.
//!
//! ## Recovery
//! ```text
//! state = snapshot.entries
//! for entry in wal (file order):
//!     if entry.timestamp > snapshot.timestamp: apply(entry)
//! ```
//!
//! Replaying the same segment twice gives the same map: SET and DELETE are
//! idempotent per key.

pub mod snapshot;
mod persister;

pub use persister::{PeriodicSnapshots, RecoveryReport, SnapshotInfo, SnapshotPersister};
pub use snapshot::Snapshot;
