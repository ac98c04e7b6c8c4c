//! Tests for WAL Entry
//!
//! These tests verify:
//! - Frame layout (length, checksum, payload)
//! - Corruption detection on deserialize
//! - Binary keys and values, including empty ones

use emberkv::wal::{LogEntry, Operation, HEADER_SIZE};
use emberkv::{EmberError, Timestamp};

// =============================================================================
// Serialization Tests
// =============================================================================

#[test]
fn test_serialize_deserialize_set() {
    let entry = LogEntry::new(Timestamp(1_000), Operation::Set, b"key".to_vec(), b"value".to_vec());
    let bytes = entry.serialize().unwrap();

    let decoded = LogEntry::deserialize(&bytes).unwrap();
    assert_eq!(decoded, entry);
}

#[test]
fn test_serialize_deserialize_delete() {
    let entry = LogEntry::new(Timestamp(2_000), Operation::Delete, b"key".to_vec(), Vec::new());
    let decoded = LogEntry::deserialize(&entry.serialize().unwrap()).unwrap();

    assert_eq!(decoded.operation, Operation::Delete);
    assert!(decoded.value.is_empty());
}

#[test]
fn test_binary_key_and_value() {
    let key: Vec<u8> = (0..=255).collect();
    let value = vec![0u8, b'\r', b'\n', 0xFF];
    let entry = LogEntry::new(Timestamp(3), Operation::Set, key.clone(), value.clone());

    let decoded = LogEntry::deserialize(&entry.serialize().unwrap()).unwrap();
    assert_eq!(decoded.key, key);
    assert_eq!(decoded.value, value);
}

#[test]
fn test_header_declares_payload_length() {
    let entry = LogEntry::new(Timestamp(4), Operation::Set, b"k".to_vec(), b"v".to_vec());
    let bytes = entry.serialize().unwrap();

    let declared = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    assert_eq!(declared, bytes.len() - HEADER_SIZE);

    let crc = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    assert_eq!(crc, crc32fast::hash(&bytes[HEADER_SIZE..]));
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_crc_corruption_detected() {
    let entry = LogEntry::new(Timestamp(5), Operation::Set, b"key".to_vec(), b"value".to_vec());
    let mut bytes = entry.serialize().unwrap();
    bytes[HEADER_SIZE + 2] ^= 0x01;

    assert!(matches!(
        LogEntry::deserialize(&bytes),
        Err(EmberError::WalCorruption { .. })
    ));
}

#[test]
fn test_crc_field_corruption_detected() {
    let entry = LogEntry::new(Timestamp(6), Operation::Set, b"key".to_vec(), b"value".to_vec());
    let mut bytes = entry.serialize().unwrap();
    bytes[5] ^= 0xFF;

    assert!(LogEntry::deserialize(&bytes).is_err());
}

#[test]
fn test_truncated_entry() {
    let entry = LogEntry::new(Timestamp(7), Operation::Set, b"key".to_vec(), b"value".to_vec());
    let bytes = entry.serialize().unwrap();

    assert!(LogEntry::deserialize(&bytes[..bytes.len() - 1]).is_err());
}

#[test]
fn test_header_too_small() {
    assert!(LogEntry::deserialize(&[0u8; HEADER_SIZE - 1]).is_err());
    assert!(LogEntry::deserialize(&[]).is_err());
}
