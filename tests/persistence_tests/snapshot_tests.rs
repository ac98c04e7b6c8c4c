//! Tests for the snapshot file format
//!
//! These tests verify:
//! - Snapshots read back exactly as written
//! - Publishing replaces the previous snapshot
//! - Damaged files are reported, never half-loaded

use std::collections::HashMap;
use std::path::PathBuf;

use emberkv::persistence::snapshot::{self, Snapshot, HEADER_SIZE, MAGIC};
use emberkv::{EmberError, Timestamp};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_snapshot() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("snapshot.bin");
    (temp_dir, path)
}

fn snapshot_with(timestamp: u64, pairs: &[(&str, &str)]) -> Snapshot {
    Snapshot {
        timestamp: Timestamp(timestamp),
        entries: pairs
            .iter()
            .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
            .collect(),
    }
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_write_then_read() {
    let (_temp, path) = setup_temp_snapshot();
    let written = snapshot_with(1234, &[("a", "1"), ("b", "2")]);

    let size = snapshot::write(&path, &written).unwrap();
    assert_eq!(size, std::fs::metadata(&path).unwrap().len());
    assert_eq!(snapshot::read(&path).unwrap(), Some(written));
}

#[test]
fn test_empty_snapshot() {
    let (_temp, path) = setup_temp_snapshot();
    let written = Snapshot {
        timestamp: Timestamp(5),
        entries: HashMap::new(),
    };

    snapshot::write(&path, &written).unwrap();
    let read = snapshot::read(&path).unwrap().unwrap();
    assert!(read.entries.is_empty());
    assert_eq!(read.timestamp, Timestamp(5));
}

#[test]
fn test_rewrite_replaces_previous() {
    let (_temp, path) = setup_temp_snapshot();
    snapshot::write(&path, &snapshot_with(1, &[("old", "x")])).unwrap();
    snapshot::write(&path, &snapshot_with(2, &[("new", "y")])).unwrap();

    let read = snapshot::read(&path).unwrap().unwrap();
    assert_eq!(read, snapshot_with(2, &[("new", "y")]));
    assert!(!snapshot::temp_path(&path).exists());
}

#[test]
fn test_temp_path_is_sibling() {
    let path = PathBuf::from("/data/snapshot.bin");
    assert_eq!(snapshot::temp_path(&path), PathBuf::from("/data/snapshot.bin.tmp"));
}

// =============================================================================
// Damage Tests
// =============================================================================

#[test]
fn test_bad_magic_is_corruption() {
    let (_temp, path) = setup_temp_snapshot();
    snapshot::write(&path, &snapshot_with(1, &[("a", "1")])).unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..4], MAGIC);
    bytes[0] = b'X';
    std::fs::write(&path, &bytes).unwrap();

    assert!(matches!(snapshot::read(&path), Err(EmberError::SnapshotCorruption(_))));
}

#[test]
fn test_truncated_payload_is_corruption() {
    let (_temp, path) = setup_temp_snapshot();
    snapshot::write(&path, &snapshot_with(1, &[("a", "1"), ("b", "2")])).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
    assert!(matches!(snapshot::read(&path), Err(EmberError::SnapshotCorruption(_))));

    std::fs::write(&path, &bytes[..HEADER_SIZE - 1]).unwrap();
    assert!(matches!(snapshot::read(&path), Err(EmberError::SnapshotCorruption(_))));
}

#[test]
fn test_payload_bit_flip_is_corruption() {
    let (_temp, path) = setup_temp_snapshot();
    snapshot::write(&path, &snapshot_with(1, &[("key", "value")])).unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    std::fs::write(&path, &bytes).unwrap();

    match snapshot::read(&path) {
        Err(EmberError::SnapshotCorruption(reason)) => assert!(reason.contains("checksum")),
        other => panic!("expected checksum failure, got {:?}", other),
    }
}
