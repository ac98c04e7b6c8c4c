//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their on-disk frame.

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::error::{EmberError, Result};

/// Frame header: payload length (4) + CRC32 of payload (4)
pub const HEADER_SIZE: usize = 8;

/// Largest payload a frame may declare (1 GiB)
pub const MAX_ENTRY_SIZE: u32 = 1024 * 1024 * 1024;

/// Mutations that can be logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Set,
    Delete,
}

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was committed to the log
    pub timestamp: Timestamp,

    /// The operation to perform
    pub operation: Operation,

    pub key: Vec<u8>,

    /// Empty for deletes
    pub value: Vec<u8>,
}

/// Borrowed twin of `LogEntry`; bincode encodes both identically
#[derive(Serialize)]
struct LogEntryRef<'a> {
    timestamp: Timestamp,
    operation: Operation,
    key: &'a [u8],
    value: &'a [u8],
}

impl LogEntry {
    pub fn new(timestamp: Timestamp, operation: Operation, key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            timestamp,
            operation,
            key,
            value,
        }
    }

    /// Encode as a complete frame: `[len][crc][payload]`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        encode_frame(self.timestamp, self.operation, &self.key, &self.value)
    }

    /// Decode a complete frame produced by `serialize`
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(corruption(0, format!(
                "frame too short: {} bytes, header needs {}",
                bytes.len(),
                HEADER_SIZE
            )));
        }

        let (len, crc) = parse_header(&bytes[..HEADER_SIZE]);
        let payload = &bytes[HEADER_SIZE..];
        if payload.len() != len as usize {
            return Err(corruption(0, format!(
                "frame declares {} payload bytes but holds {}",
                len,
                payload.len()
            )));
        }

        decode_payload(payload, crc).map_err(|reason| corruption(0, reason))
    }
}

/// Build a frame without first copying key and value into a `LogEntry`
pub(crate) fn encode_frame(
    timestamp: Timestamp,
    operation: Operation,
    key: &[u8],
    value: &[u8],
) -> Result<Vec<u8>> {
    let payload = bincode::serialize(&LogEntryRef {
        timestamp,
        operation,
        key,
        value,
    })?;

    if payload.len() > MAX_ENTRY_SIZE as usize {
        return Err(EmberError::Protocol(format!(
            "log entry of {} bytes exceeds the {} byte limit",
            payload.len(),
            MAX_ENTRY_SIZE
        )));
    }

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Split a header into (payload length, crc)
pub(crate) fn parse_header(header: &[u8]) -> (u32, u32) {
    let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    (len, crc)
}

/// Smallest bincode payload: timestamp (8), operation (4), two length prefixes (8 + 8)
const MIN_PAYLOAD_SIZE: usize = 28;

/// Whether `bytes` starts with a complete frame that checks out
///
/// The payload layout is checked before the CRC so arbitrary bytes are
/// rejected without hashing.
pub(crate) fn is_frame(bytes: &[u8]) -> bool {
    if bytes.len() < HEADER_SIZE + MIN_PAYLOAD_SIZE {
        return false;
    }
    let (len, crc) = parse_header(&bytes[..HEADER_SIZE]);
    let len = len as usize;
    if len < MIN_PAYLOAD_SIZE || len > bytes.len() - HEADER_SIZE {
        return false;
    }

    let payload = &bytes[HEADER_SIZE..HEADER_SIZE + len];
    let read_u64 = |at: usize| {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&payload[at..at + 8]);
        u64::from_le_bytes(raw)
    };
    let operation = u32::from_le_bytes([payload[8], payload[9], payload[10], payload[11]]);
    if operation > 1 {
        return false;
    }
    let key_len = read_u64(12);
    if key_len > (len - MIN_PAYLOAD_SIZE) as u64 {
        return false;
    }
    let value_len = read_u64(20 + key_len as usize);
    if value_len != (len - MIN_PAYLOAD_SIZE) as u64 - key_len {
        return false;
    }

    decode_payload(payload, crc).is_ok()
}

/// Check the CRC and decode; the error string says what was wrong
pub(crate) fn decode_payload(payload: &[u8], expected_crc: u32) -> std::result::Result<LogEntry, String> {
    let actual = crc32fast::hash(payload);
    if actual != expected_crc {
        return Err(format!(
            "checksum mismatch (expected {:08x}, computed {:08x})",
            expected_crc, actual
        ));
    }
    bincode::deserialize(payload).map_err(|e| format!("undecodable entry: {}", e))
}

pub(crate) fn corruption(offset: u64, reason: String) -> EmberError {
    EmberError::WalCorruption { offset, reason }
}
