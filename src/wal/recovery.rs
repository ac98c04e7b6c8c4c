//! WAL Recovery
//!
//! Replays logged mutations into a sink after a crash.

use std::io::Read;

use crate::clock::Timestamp;
use crate::error::Result;

use super::{LogEntry, Operation, WalReader};

/// The narrow capability replay needs: apply a mutation, nothing else
///
/// Implementations must not log what they apply; replay runs against a
/// store whose log is the very file being read.
pub trait ReplaySink {
    fn apply_set(&self, key: &[u8], value: &[u8]);

    fn apply_delete(&self, key: &[u8]);
}

/// Outcome of reading a WAL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Well-formed entries read
    pub entries_read: u64,

    /// Entries newer than the threshold, handed to the sink
    pub entries_applied: u64,

    /// Newest timestamp seen, or `Timestamp::ZERO` for an empty log
    pub last_timestamp: Timestamp,

    /// Length of the well-formed prefix of the log
    pub valid_len: u64,

    /// Whether a torn tail was found past `valid_len`
    pub truncated_tail: bool,
}

/// Read every frame and apply those strictly newer than `after`, in file order
pub(crate) fn replay<R, S>(mut reader: WalReader<R>, after: Timestamp, sink: &S) -> Result<ReplayStats>
where
    R: Read,
    S: ReplaySink + ?Sized,
{
    let mut stats = ReplayStats::default();

    while let Some(entry) = reader.next_entry()? {
        stats.entries_read += 1;
        stats.last_timestamp = stats.last_timestamp.max(entry.timestamp);

        if entry.timestamp > after {
            apply(sink, &entry);
            stats.entries_applied += 1;
        }
    }

    stats.valid_len = reader.position();
    stats.truncated_tail = reader.torn_at().is_some();
    Ok(stats)
}

fn apply<S: ReplaySink + ?Sized>(sink: &S, entry: &LogEntry) {
    match entry.operation {
        Operation::Set => sink.apply_set(&entry.key, &entry.value),
        Operation::Delete => sink.apply_delete(&entry.key),
    }
}

/// A sink that ignores everything; used when only statistics are wanted
pub(crate) struct Discard;

impl ReplaySink for Discard {
    fn apply_set(&self, _key: &[u8], _value: &[u8]) {}

    fn apply_delete(&self, _key: &[u8]) {}
}
