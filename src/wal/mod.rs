//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Append a record of every mutation before it becomes visible
//! - fsync every append (no batching window)
//! - CRC32 checksums for corruption detection
//! - Replay of entries newer than a snapshot timestamp
//!
//! ## File Format
//! ```text
//! ┌───────────────────────────────────────────┐
//! │ Entry 1                                   │
//! │ ┌─────────┬─────────┬───────────────────┐ │
//! │ │ Len (4) │ CRC (4) │ bincode(LogEntry) │ │
//! │ └─────────┴─────────┴───────────────────┘ │
//! ├───────────────────────────────────────────┤
//! │ Entry 2                                   │
//! │ ┌─────────┬─────────┬───────────────────┐ │
//! │ │ Len (4) │ CRC (4) │ bincode(LogEntry) │ │
//! │ └─────────┴─────────┴───────────────────┘ │
//! └───────────────────────────────────────────┘
//! ```
//!
//! The log is never compacted or rotated; it grows for the life of the data
//! directory.

mod entry;
mod writer;
mod reader;
mod recovery;

pub use entry::{LogEntry, Operation, HEADER_SIZE, MAX_ENTRY_SIZE};
pub use writer::WriteAheadLog;
pub use reader::{WalIterator, WalReader};
pub use recovery::{ReplaySink, ReplayStats};
