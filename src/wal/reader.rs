//! WAL Reader
//!
//! Reads frames sequentially and classifies damage:
//! - a frame cut short by end-of-file is a torn tail (a crash mid-append)
//!   and simply ends the log;
//! - a bad frame followed only by zero bytes is also a torn tail
//!   (space the filesystem extended but never filled);
//! - a frame whose declared length runs past end-of-file is torn only if no
//!   whole, checksummed frame can be found in the bytes after its header;
//! - a bad frame followed by real data is interior corruption and is an error.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::Result;

use super::entry::{corruption, decode_payload, is_frame, parse_header, HEADER_SIZE, MAX_ENTRY_SIZE};
use super::LogEntry;

/// Reads entries from a WAL file
pub struct WalReader<R: Read = BufReader<File>> {
    reader: R,

    /// Byte offset of the next frame
    position: u64,

    /// Bytes of log to consider; anything past this is ignored
    len: u64,

    /// Offset where a torn tail begins, once one is found
    torn_at: Option<u64>,

    finished: bool,
}

impl WalReader {
    /// Open a WAL file for reading the whole file
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self::new(BufReader::new(file), len))
    }

    /// Open a WAL file but stop after `len` bytes
    pub fn open_prefix(path: &Path, len: u64) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file), len))
    }
}

impl<R: Read> WalReader<R> {
    /// Read frames from any source of `len` bytes
    pub fn new(reader: R, len: u64) -> Self {
        Self {
            reader,
            position: 0,
            len,
            torn_at: None,
            finished: false,
        }
    }

    /// Read the next entry from the WAL
    ///
    /// Returns `Ok(None)` at the end of the log, including a torn tail.
    pub fn next_entry(&mut self) -> Result<Option<LogEntry>> {
        if self.finished {
            return Ok(None);
        }

        let start = self.position;
        let remaining = self.len - start;
        if remaining == 0 {
            self.finished = true;
            return Ok(None);
        }
        if remaining < HEADER_SIZE as u64 {
            return self.torn(start);
        }

        let mut header = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header)?;
        let (payload_len, crc) = parse_header(&header);

        if payload_len > MAX_ENTRY_SIZE {
            let reason = format!(
                "frame declares {} payload bytes (max {})",
                payload_len, MAX_ENTRY_SIZE
            );
            return self.bad_frame(start, start + HEADER_SIZE as u64, reason);
        }
        if payload_len as u64 > remaining - HEADER_SIZE as u64 {
            return self.overlong_frame(start, payload_len, remaining - HEADER_SIZE as u64);
        }

        let mut payload = vec![0u8; payload_len as usize];
        self.reader.read_exact(&mut payload)?;
        self.position = start + HEADER_SIZE as u64 + payload_len as u64;

        match decode_payload(&payload, crc) {
            Ok(entry) => Ok(Some(entry)),
            Err(reason) if self.position == self.len => {
                tracing::debug!("Final WAL frame at byte {} unreadable ({}), treating as torn", start, reason);
                self.torn(start)
            }
            Err(reason) => self.bad_frame(start, self.position, reason),
        }
    }

    /// Iterate over all entries; stops after the first error
    pub fn entries(self) -> WalIterator<R> {
        WalIterator { reader: self }
    }

    /// Offset just past the last good frame read so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Where a torn tail starts, if one was found
    pub fn torn_at(&self) -> Option<u64> {
        self.torn_at
    }

    fn torn(&mut self, start: u64) -> Result<Option<LogEntry>> {
        self.torn_at = Some(start);
        self.position = start;
        self.finished = true;
        Ok(None)
    }

    /// A frame that cannot be decoded: torn if only zeros follow, corrupt otherwise
    fn bad_frame(&mut self, start: u64, consumed: u64, reason: String) -> Result<Option<LogEntry>> {
        if self.rest_is_zero(self.len.saturating_sub(consumed))? {
            tracing::debug!("Zero-filled WAL tail from byte {}", start);
            return self.torn(start);
        }
        self.finished = true;
        Err(corruption(start, reason))
    }

    /// A length running past end-of-file: a crash mid-append, unless a damaged
    /// length is hiding acknowledged frames behind it
    ///
    /// `rest` is smaller than the declared length, so it is bounded by
    /// `MAX_ENTRY_SIZE`.
    fn overlong_frame(&mut self, start: u64, payload_len: u32, rest: u64) -> Result<Option<LogEntry>> {
        let mut bytes = Vec::with_capacity(rest as usize);
        (&mut self.reader).take(rest).read_to_end(&mut bytes)?;

        let body = start + HEADER_SIZE as u64;
        match (0..bytes.len()).find(|&at| is_frame(&bytes[at..])) {
            Some(at) => {
                self.finished = true;
                Err(corruption(
                    start,
                    format!(
                        "frame declares {} payload bytes past end of log, but a valid frame follows at byte {}",
                        payload_len,
                        body + at as u64
                    ),
                ))
            }
            None => self.torn(start),
        }
    }

    fn rest_is_zero(&mut self, rest: u64) -> Result<bool> {
        let mut buf = [0u8; 4096];
        let mut rest = (&mut self.reader).take(rest);
        loop {
            match rest.read(&mut buf) {
                Ok(0) => return Ok(true),
                Ok(n) => {
                    if buf[..n].iter().any(|&b| b != 0) {
                        return Ok(false);
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Iterator over WAL entries
pub struct WalIterator<R: Read = BufReader<File>> {
    reader: WalReader<R>,
}

impl<R: Read> WalIterator<R> {
    /// The underlying reader, for inspecting where iteration stopped
    pub fn reader(&self) -> &WalReader<R> {
        &self.reader
    }
}

impl<R: Read> Iterator for WalIterator<R> {
    type Item = Result<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_entry().transpose()
    }
}
