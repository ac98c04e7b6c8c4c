//! Store Module
//!
//! In-memory key-value stores with an optional durability log.
//!
//! ## Responsibilities
//! - Read-after-write visibility for every key
//! - Log each mutation before it becomes visible, and skip the mutation if
//!   the log refuses it
//! - Coherent full-map copies for snapshots
//!
//! ## Variants
//! - [`LockedStore`]: one `RwLock` over one `HashMap`; linearizable, but all
//!   writers (and their fsyncs) are serialized.
//! - [`ShardedStore`]: 1024 shards, each with its own lock, and a per-key
//!   lock that orders log-then-apply for that key. Different keys proceed
//!   in parallel.
//!
//! Both start volatile ([`Volatile`] log) and become durable through
//! `with_log` or `attach_log`, which consumes the volatile store. A store is
//! never half-initialized: its log type is part of its type.

mod locked;
mod sharded;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::wal::{Operation, WriteAheadLog};

pub use crate::wal::ReplaySink;
pub use locked::LockedStore;
pub use sharded::{shard_index, ShardedStore, SHARD_COUNT};

/// Operations the server and the persister need from a store
///
/// `set` and `delete` only fail when the attached log cannot record the
/// mutation; in that case the in-memory map is left untouched.
pub trait KeyValueStore: ReplaySink + Send + Sync {
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Copy of every live entry
    ///
    /// Each key appears with a value it actually held; across keys the copy
    /// need not correspond to a single instant.
    fn get_all(&self) -> HashMap<Vec<u8>, Vec<u8>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where a store records mutations before applying them
pub trait WriteLog: Send + Sync {
    /// `Ok` means the record is durable
    fn append(&self, operation: Operation, key: &[u8], value: &[u8]) -> Result<()>;
}

/// No log at all: mutations are lost on restart
#[derive(Debug, Clone, Copy, Default)]
pub struct Volatile;

impl WriteLog for Volatile {
    fn append(&self, _operation: Operation, _key: &[u8], _value: &[u8]) -> Result<()> {
        Ok(())
    }
}

impl WriteLog for WriteAheadLog {
    fn append(&self, operation: Operation, key: &[u8], value: &[u8]) -> Result<()> {
        WriteAheadLog::append(self, operation, key, value).map(|_| ())
    }
}

impl<L: WriteLog + ?Sized> WriteLog for Arc<L> {
    fn append(&self, operation: Operation, key: &[u8], value: &[u8]) -> Result<()> {
        (**self).append(operation, key, value)
    }
}
