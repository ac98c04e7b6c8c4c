//! Tests for WAL replay
//!
//! These tests verify:
//! - Only entries newer than the given timestamp are applied
//! - Replay applies sets and deletes in file order
//! - Replaying the same log twice gives the same state
//! - Replay statistics

use std::path::PathBuf;

use emberkv::wal::{Operation, WriteAheadLog};
use emberkv::{KeyValueStore, LockedStore, Timestamp};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

// =============================================================================
// Replay Tests
// =============================================================================

#[test]
fn test_replay_empty_log() {
    let (_temp, wal_path) = setup_temp_wal();
    let wal = WriteAheadLog::open(&wal_path).unwrap();
    let store = LockedStore::new();

    let stats = wal.replay_after(Timestamp::ZERO, &store).unwrap();
    assert_eq!(stats.entries_read, 0);
    assert_eq!(stats.entries_applied, 0);
    assert!(!stats.truncated_tail);
    assert!(store.is_empty());
}

#[test]
fn test_replay_applies_in_file_order() {
    let (_temp, wal_path) = setup_temp_wal();
    let wal = WriteAheadLog::open(&wal_path).unwrap();
    wal.append(Operation::Set, b"a", b"1").unwrap();
    wal.append(Operation::Set, b"a", b"2").unwrap();
    wal.append(Operation::Set, b"b", b"3").unwrap();
    wal.append(Operation::Delete, b"b", b"").unwrap();

    let store = LockedStore::new();
    let stats = wal.replay_after(Timestamp::ZERO, &store).unwrap();

    assert_eq!(stats.entries_applied, 4);
    assert_eq!(store.get(b"a"), Some(b"2".to_vec()));
    assert_eq!(store.get(b"b"), None);
}

#[test]
fn test_replay_skips_entries_at_or_before_timestamp() {
    let (_temp, wal_path) = setup_temp_wal();
    let wal = WriteAheadLog::open(&wal_path).unwrap();
    wal.append(Operation::Set, b"old", b"1").unwrap();
    let cutoff = wal.append(Operation::Set, b"edge", b"2").unwrap();
    let last = wal.append(Operation::Set, b"new", b"3").unwrap();

    let store = LockedStore::new();
    let stats = wal.replay_after(cutoff, &store).unwrap();

    assert_eq!(stats.entries_read, 3);
    assert_eq!(stats.entries_applied, 1);
    assert_eq!(stats.last_timestamp, last);
    assert_eq!(store.get(b"old"), None);
    assert_eq!(store.get(b"edge"), None);
    assert_eq!(store.get(b"new"), Some(b"3".to_vec()));
}

#[test]
fn test_replay_twice_is_idempotent() {
    let (_temp, wal_path) = setup_temp_wal();
    let wal = WriteAheadLog::open(&wal_path).unwrap();
    wal.append(Operation::Set, b"a", b"1").unwrap();
    wal.append(Operation::Delete, b"a", b"").unwrap();
    wal.append(Operation::Set, b"b", b"2").unwrap();
    wal.append(Operation::Set, b"a", b"3").unwrap();

    let store = LockedStore::new();
    wal.replay_after(Timestamp::ZERO, &store).unwrap();
    let once = store.get_all();
    wal.replay_after(Timestamp::ZERO, &store).unwrap();

    assert_eq!(store.get_all(), once);
    assert_eq!(once.len(), 2);
}

#[test]
fn test_replay_does_not_log() {
    let (_temp, wal_path) = setup_temp_wal();
    let wal = std::sync::Arc::new(WriteAheadLog::open(&wal_path).unwrap());
    wal.append(Operation::Set, b"a", b"1").unwrap();
    let before = wal.size_bytes();

    // A store logging into the same WAL must not re-append replayed entries.
    let store = LockedStore::with_log(std::sync::Arc::clone(&wal));
    wal.replay_after(Timestamp::ZERO, &store).unwrap();

    assert_eq!(store.get(b"a"), Some(b"1".to_vec()));
    assert_eq!(wal.size_bytes(), before);
}

#[test]
fn test_verify_reports_valid_length() {
    let (_temp, wal_path) = setup_temp_wal();
    let len = {
        let wal = WriteAheadLog::open(&wal_path).unwrap();
        wal.append(Operation::Set, b"a", b"1").unwrap();
        wal.append(Operation::Set, b"b", b"2").unwrap();
        wal.size_bytes()
    };

    let stats = WriteAheadLog::verify(&wal_path).unwrap();
    assert_eq!(stats.entries_read, 2);
    assert_eq!(stats.valid_len, len);
    assert!(!stats.truncated_tail);
}
