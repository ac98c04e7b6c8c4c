//! Snapshot file format
//!
//! ```text
//! ┌──────────┬─────────────┬─────────┬─────────┬──────────────────────┐
//! │ "EMBS"(4)│ Version (2) │ CRC (4) │ Len (8) │ bincode(Snapshot)    │
//! └──────────┴─────────────┴─────────┴─────────┴──────────────────────┘
//! ```
//!
//! Written to `<path>.tmp`, fsynced, then renamed over `<path>`, so a reader
//! of `<path>` sees the old snapshot or the new one, never a mix.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::error::{EmberError, Result};

pub const MAGIC: &[u8; 4] = b"EMBS";
pub const VERSION: u16 = 1;

/// magic (4) + version (2) + crc (4) + payload length (8)
pub const HEADER_SIZE: usize = 18;

/// Point-in-time copy of a store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Taken before the store was read; WAL entries after it are replayed
    pub timestamp: Timestamp,

    pub entries: HashMap<Vec<u8>, Vec<u8>>,
}

/// `<path>.tmp`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write and publish a snapshot; returns the file size
pub fn write(path: &Path, snapshot: &Snapshot) -> Result<u64> {
    let (tmp, size) = write_temp(path, snapshot)?;
    publish(&tmp, path)?;
    Ok(size)
}

/// Write the snapshot to `<path>.tmp` and fsync it
pub(crate) fn write_temp(path: &Path, snapshot: &Snapshot) -> Result<(PathBuf, u64)> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    match write_file(&tmp, snapshot) {
        Ok(size) => Ok((tmp, size)),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

fn write_file(tmp: &Path, snapshot: &Snapshot) -> Result<u64> {
    let payload = bincode::serialize(snapshot)?;

    let mut writer = BufWriter::new(File::create(tmp)?);
    writer.write_all(MAGIC)?;
    writer.write_all(&VERSION.to_le_bytes())?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    writer.write_all(&(payload.len() as u64).to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;

    let file = writer
        .into_inner()
        .map_err(|e| EmberError::Io(e.into_error()))?;
    file.sync_all()?;

    Ok((HEADER_SIZE + payload.len()) as u64)
}

/// Atomically replace `path` with `tmp`
pub(crate) fn publish(tmp: &Path, path: &Path) -> Result<()> {
    fs::rename(tmp, path)?;
    sync_parent_dir(path)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    File::open(parent)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}

/// Read the snapshot at `path`; `Ok(None)` if there is none
pub fn read(path: &Path) -> Result<Option<Snapshot>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    decode(&bytes).map(Some)
}

fn decode(bytes: &[u8]) -> Result<Snapshot> {
    if bytes.len() < HEADER_SIZE {
        return Err(EmberError::SnapshotCorruption(format!(
            "file is {} bytes, header needs {}",
            bytes.len(),
            HEADER_SIZE
        )));
    }
    if &bytes[0..4] != MAGIC {
        return Err(EmberError::SnapshotCorruption("bad magic".to_string()));
    }

    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(EmberError::SnapshotCorruption(format!(
            "unsupported version {} (expected {})",
            version, VERSION
        )));
    }

    let crc = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[10..18]);
    let len = u64::from_le_bytes(len_bytes);

    let payload = &bytes[HEADER_SIZE..];
    if payload.len() as u64 != len {
        return Err(EmberError::SnapshotCorruption(format!(
            "header declares {} payload bytes, file holds {}",
            len,
            payload.len()
        )));
    }
    if crc32fast::hash(payload) != crc {
        return Err(EmberError::SnapshotCorruption("checksum mismatch".to_string()));
    }

    bincode::deserialize(payload)
        .map_err(|e| EmberError::SnapshotCorruption(format!("undecodable payload: {}", e)))
}
