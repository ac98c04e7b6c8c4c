//! Single-lock store
//!
//! HashMap behind one RwLock. The log append happens while the write lock is
//! held, so log order and memory order are the same total order.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::Result;
use crate::wal::Operation;

use super::{KeyValueStore, ReplaySink, Volatile, WriteLog};

/// Store with one lock over the whole map
pub struct LockedStore<L = Volatile> {
    data: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    log: L,
}

impl LockedStore {
    /// Create an empty store with no log
    pub fn new() -> Self {
        Self::with_log(Volatile)
    }

    /// Turn this store into a durable one; existing entries are kept but not logged
    pub fn attach_log<L: WriteLog>(self, log: L) -> LockedStore<L> {
        LockedStore {
            data: self.data,
            log,
        }
    }
}

impl Default for LockedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: WriteLog> LockedStore<L> {
    /// Create an empty store that logs every mutation to `log`
    pub fn with_log(log: L) -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            log,
        }
    }

    pub fn log(&self) -> &L {
        &self.log
    }
}

impl<L: WriteLog> KeyValueStore for LockedStore<L> {
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut data = self.data.write();
        self.log.append(Operation::Set, key, value)?;
        data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.read().get(key).cloned()
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        let mut data = self.data.write();
        // Nothing to record for an absent key
        if data.contains_key(key) {
            self.log.append(Operation::Delete, key, &[])?;
            data.remove(key);
        }
        Ok(())
    }

    fn get_all(&self) -> HashMap<Vec<u8>, Vec<u8>> {
        self.data.read().clone()
    }

    fn len(&self) -> usize {
        self.data.read().len()
    }
}

impl<L: WriteLog> ReplaySink for LockedStore<L> {
    fn apply_set(&self, key: &[u8], value: &[u8]) {
        self.data.write().insert(key.to_vec(), value.to_vec());
    }

    fn apply_delete(&self, key: &[u8]) {
        self.data.write().remove(key);
    }
}
