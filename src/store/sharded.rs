//! Sharded store
//!
//! ## Layout
//! ```text
//! key ──fnv1a──► shard (1 of 1024) ──► RwLock<HashMap<key, Arc<Slot>>>
//!                                                          │
//!                                        RwLock<SlotState {value, retired}>
//! ```
//!
//! ## Locking
//! - Shard lock: guards which keys exist. Held only to look up, insert or
//!   unlink a slot, never across a WAL append.
//! - Slot lock: held for the whole log-then-apply of one key, so two writers
//!   of the same key cannot interleave their log records and memory effects.
//! - Order is slot → shard (delete unlinks while holding its slot). Lookups
//!   drop the shard lock before taking a slot lock.
//!
//! A deleted slot is marked retired before it is unlinked. A writer that
//! locked a slot which got retired in the meantime starts over with a fresh
//! lookup.
//!
//! ## Snapshot safety
//! `get_all` waits on each slot's lock, so a copy taken after timestamp `T`
//! includes every mutation whose log record is stamped at or before `T`;
//! anything stamped later is replayed from the WAL.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::wal::Operation;

use super::{KeyValueStore, ReplaySink, Volatile, WriteLog};

/// Fixed number of shards; changing it remaps every key
pub const SHARD_COUNT: usize = 1024;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Shard that owns `key` (32-bit FNV-1a modulo `SHARD_COUNT`)
pub fn shard_index(key: &[u8]) -> usize {
    let hash = key.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
        (hash ^ byte as u32).wrapping_mul(FNV_PRIME)
    });
    hash as usize % SHARD_COUNT
}

#[derive(Default)]
struct Shard {
    slots: RwLock<HashMap<Vec<u8>, Arc<Slot>>>,
}

#[derive(Default)]
struct Slot {
    state: RwLock<SlotState>,
}

#[derive(Default)]
struct SlotState {
    /// `None` while a first write is in flight
    value: Option<Vec<u8>>,

    /// Unlinked from its shard; must not be written again
    retired: bool,
}

/// Store split into independently locked shards
pub struct ShardedStore<L = Volatile> {
    shards: Box<[Shard]>,
    log: L,
}

impl ShardedStore {
    /// Create an empty store with no log
    pub fn new() -> Self {
        Self::with_log(Volatile)
    }

    /// Turn this store into a durable one; existing entries are kept but not logged
    pub fn attach_log<L: WriteLog>(self, log: L) -> ShardedStore<L> {
        ShardedStore {
            shards: self.shards,
            log,
        }
    }
}

impl Default for ShardedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: WriteLog> ShardedStore<L> {
    /// Create an empty store that logs every mutation to `log`
    pub fn with_log(log: L) -> Self {
        let shards = (0..SHARD_COUNT).map(|_| Shard::default()).collect();
        Self { shards, log }
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    fn shard(&self, key: &[u8]) -> &Shard {
        &self.shards[shard_index(key)]
    }

    fn lookup(shard: &Shard, key: &[u8]) -> Option<Arc<Slot>> {
        shard.slots.read().get(key).cloned()
    }

    fn lookup_or_insert(shard: &Shard, key: &[u8]) -> Arc<Slot> {
        if let Some(slot) = Self::lookup(shard, key) {
            return slot;
        }
        shard.slots.write().entry(key.to_vec()).or_default().clone()
    }

    /// Remove `slot` from its shard; caller holds the slot's write lock
    fn unlink(shard: &Shard, key: &[u8], slot: &Arc<Slot>) {
        let mut slots = shard.slots.write();
        if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(key);
        }
    }

    fn store_value(&self, key: &[u8], value: &[u8], logged: bool) -> Result<()> {
        let shard = self.shard(key);
        loop {
            let slot = Self::lookup_or_insert(shard, key);
            let mut state = slot.state.write();
            if state.retired {
                continue;
            }

            if logged {
                if let Err(e) = self.log.append(Operation::Set, key, value) {
                    if state.value.is_none() {
                        state.retired = true;
                        Self::unlink(shard, key, &slot);
                    }
                    return Err(e);
                }
            }

            state.value = Some(value.to_vec());
            return Ok(());
        }
    }

    fn remove_value(&self, key: &[u8], logged: bool) -> Result<()> {
        let shard = self.shard(key);
        loop {
            let slot = match Self::lookup(shard, key) {
                Some(slot) => slot,
                None => return Ok(()),
            };
            let mut state = slot.state.write();
            if state.retired {
                continue;
            }

            if logged && state.value.is_some() {
                self.log.append(Operation::Delete, key, &[])?;
            }

            state.value = None;
            state.retired = true;
            Self::unlink(shard, key, &slot);
            return Ok(());
        }
    }
}

impl<L: WriteLog> KeyValueStore for ShardedStore<L> {
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.store_value(key, value, true)
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let slot = Self::lookup(self.shard(key), key)?;
        let state = slot.state.read();
        state.value.clone()
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.remove_value(key, true)
    }

    fn get_all(&self) -> HashMap<Vec<u8>, Vec<u8>> {
        let mut all = HashMap::new();
        for shard in self.shards.iter() {
            let slots: Vec<(Vec<u8>, Arc<Slot>)> = shard
                .slots
                .read()
                .iter()
                .map(|(key, slot)| (key.clone(), Arc::clone(slot)))
                .collect();

            for (key, slot) in slots {
                if let Some(value) = &slot.state.read().value {
                    all.insert(key, value.clone());
                }
            }
        }
        all
    }

    fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                // Slot locks are never taken under a shard lock.
                let slots: Vec<Arc<Slot>> = shard.slots.read().values().cloned().collect();
                slots
                    .iter()
                    .filter(|slot| slot.state.read().value.is_some())
                    .count()
            })
            .sum()
    }
}

impl<L: WriteLog> ReplaySink for ShardedStore<L> {
    fn apply_set(&self, key: &[u8], value: &[u8]) {
        // Unlogged writes cannot fail
        let _ = self.store_value(key, value, false);
    }

    fn apply_delete(&self, key: &[u8]) {
        let _ = self.remove_value(key, false);
    }
}
