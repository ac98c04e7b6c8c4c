//! WAL Writer
//!
//! The shared append target. Every append is one `write_all` of a complete
//! frame followed by `sync_data`, all under one mutex, so records never
//! interleave and an acknowledged append is on stable storage.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::clock::{self, Timestamp};
use crate::error::{EmberError, Result};

use super::entry::encode_frame;
use super::recovery::{replay, Discard, ReplaySink, ReplayStats};
use super::{Operation, WalReader};

/// Append-only durability log
pub struct WriteAheadLog {
    path: PathBuf,
    inner: Mutex<WalInner>,
}

struct WalInner {
    /// `None` once closed
    file: Option<File>,

    /// Bytes of well-formed frames in the file
    len: u64,

    /// Set when a failed write could not be rolled back
    failed: Option<String>,
}

impl WriteAheadLog {
    /// Open or create a WAL file
    ///
    /// The existing log is scanned first: a torn tail from a crash is copied
    /// to `<path>.torn` and cut off so new frames follow the last good one,
    /// and interior corruption refuses to open.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        let file_len = file.metadata()?.len();

        let stats = replay(WalReader::open_prefix(&path, file_len)?, Timestamp::ZERO, &Discard)?;
        if stats.truncated_tail {
            let side = Self::torn_path(&path);
            preserve_tail(&path, stats.valid_len, &side)?;
            tracing::warn!(
                "WAL {:?}: moved {} bytes of torn tail after {} entries to {:?}",
                path,
                file_len - stats.valid_len,
                stats.entries_read,
                side
            );
            file.set_len(stats.valid_len)?;
            file.sync_all()?;
        }
        clock::observe(stats.last_timestamp);

        tracing::info!(
            "WAL opened at {:?}: {} entries, {} bytes",
            path,
            stats.entries_read,
            stats.valid_len
        );

        Ok(Self {
            path,
            inner: Mutex::new(WalInner {
                file: Some(file),
                len: stats.valid_len,
                failed: None,
            }),
        })
    }

    /// Append an entry and force it to stable storage
    ///
    /// Returns the entry's timestamp. The timestamp is taken under the log
    /// lock, so file order and timestamp order agree.
    pub fn append(&self, operation: Operation, key: &[u8], value: &[u8]) -> Result<Timestamp> {
        let mut inner = self.inner.lock();
        if let Some(reason) = &inner.failed {
            return Err(EmberError::WalFailed(reason.clone()));
        }
        let committed_len = inner.len;
        let file = inner.file.as_mut().ok_or(EmberError::WalClosed)?;

        let timestamp = clock::now();
        let frame = encode_frame(timestamp, operation, key, value)?;

        let written = file.write_all(&frame).and_then(|_| file.sync_data());
        if let Err(e) = written {
            tracing::error!("WAL append to {:?} failed: {}", self.path, e);
            // Cut the partial frame off; later frames must not follow garbage.
            let rollback = file.set_len(committed_len).and_then(|_| file.sync_data());
            if let Err(rollback_err) = rollback {
                tracing::error!("WAL rollback failed, refusing further appends: {}", rollback_err);
                inner.failed = Some(format!("append failed ({}), rollback failed ({})", e, rollback_err));
            }
            return Err(e.into());
        }

        inner.len += frame.len() as u64;
        tracing::trace!("WAL append {:?} at {} ({} bytes)", operation, timestamp, frame.len());
        Ok(timestamp)
    }

    /// Apply every entry newer than `after` to `sink`, in file order
    ///
    /// A torn final frame ends the replay quietly; a damaged frame with
    /// data after it is reported as `WalCorruption`.
    pub fn replay_after<S: ReplaySink + ?Sized>(&self, after: Timestamp, sink: &S) -> Result<ReplayStats> {
        let inner = self.inner.lock();
        let reader = WalReader::open_prefix(&self.path, inner.len)?;
        let stats = replay(reader, after, sink)?;
        tracing::info!(
            "WAL replay after {}: {} of {} entries applied",
            after,
            stats.entries_applied,
            stats.entries_read
        );
        Ok(stats)
    }

    /// Inspect a log file without opening it for writing
    pub fn verify(path: impl AsRef<Path>) -> Result<ReplayStats> {
        replay(WalReader::open(path.as_ref())?, Timestamp::ZERO, &Discard)
    }

    /// Flush and release the file; later appends fail with `WalClosed`
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(mut file) = inner.file.take() {
            file.flush()?;
            file.sync_all()?;
            tracing::info!("WAL {:?} closed at {} bytes", self.path, inner.len);
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().file.is_none()
    }

    /// Current length of the log; it only grows
    pub fn size_bytes(&self) -> u64 {
        self.inner.lock().len
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where `open` keeps torn tails cut from the log at `path`
    pub fn torn_path(path: &Path) -> PathBuf {
        let mut name = OsString::from(path.as_os_str());
        name.push(".torn");
        PathBuf::from(name)
    }
}

/// Append the bytes of `path` from `from` onwards to `side` and sync it
fn preserve_tail(path: &Path, from: u64, side: &Path) -> Result<()> {
    let mut source = File::open(path)?;
    source.seek(SeekFrom::Start(from))?;
    let mut target = OpenOptions::new().create(true).append(true).open(side)?;
    io::copy(&mut source, &mut target)?;
    target.sync_all()?;
    Ok(())
}

impl Drop for WriteAheadLog {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!("Failed to close WAL {:?}: {}", self.path, e);
        }
    }
}
