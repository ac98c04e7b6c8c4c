//! Protocol codec
//!
//! Reading requests and writing replies over buffered streams.
//!
//! ## Request framing
//! The first byte picks the framing:
//! ```text
//! *<count>\r\n                 array of length-prefixed (binary-safe) strings
//!   $<len>\r\n<bytes>\r\n      ... repeated <count> times
//!
//! GET foo\r\n                  anything else: one whitespace-separated line
//! ```
//!
//! ## Malformed input
//! A malformed frame yields one `Request::Malformed` and the next read starts
//! after the whole frame: a broken array element does not stop the read, the
//! remaining declared elements are still consumed. Frames whose end cannot be
//! found come back with `recoverable: false` and the connection should be
//! closed. That covers an unreadable element count and lengths beyond the
//! limits below, since skipping the payload could mean swallowing gigabytes.

use std::io::{self, BufRead, Read, Write};

use crate::error::{EmberError, Result};

use super::{Command, Reply};

/// Longest inline request or header line (64 KiB)
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Largest bulk string accepted in a request (512 MiB)
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Most elements accepted in one array request
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// One request read off the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Argument list, command name first
    Args(Vec<Vec<u8>>),

    /// A frame that could not be parsed
    Malformed { reason: String, recoverable: bool },
}

impl Request {
    fn malformed(reason: impl Into<String>) -> Self {
        Request::Malformed {
            reason: reason.into(),
            recoverable: true,
        }
    }

    fn fatal(reason: impl Into<String>) -> Self {
        Request::Malformed {
            reason: reason.into(),
            recoverable: false,
        }
    }
}

// =============================================================================
// Request Decoding
// =============================================================================

/// Read one request
///
/// `Ok(None)` is a clean end of stream between requests. End of stream in
/// the middle of a request is an `UnexpectedEof` I/O error.
pub fn read_request<R: BufRead>(reader: &mut R) -> Result<Option<Request>> {
    let first = match reader.fill_buf()?.first() {
        Some(&byte) => byte,
        None => return Ok(None),
    };

    let request = if first == b'*' {
        read_array(reader)?
    } else {
        read_inline(reader)?
    };
    Ok(Some(request))
}

fn read_inline<R: BufRead>(reader: &mut R) -> Result<Request> {
    let line = match read_line(reader, MAX_LINE_LEN)? {
        Some(line) => line,
        None => return Ok(Request::malformed("Protocol error: too big inline request")),
    };

    let args = line
        .split(|b| b.is_ascii_whitespace())
        .filter(|token| !token.is_empty())
        .map(<[u8]>::to_vec)
        .collect();
    Ok(Request::Args(args))
}

fn read_array<R: BufRead>(reader: &mut R) -> Result<Request> {
    let header = match read_line(reader, MAX_LINE_LEN)? {
        Some(line) => line,
        None => return Ok(Request::fatal("Protocol error: too big multibulk header")),
    };

    let count = match parse_length(&header[1..]) {
        Some(count) => count,
        None => return Ok(Request::fatal("Protocol error: invalid multibulk length")),
    };
    if count <= 0 {
        return Ok(Request::Args(Vec::new()));
    }
    if count as u64 > MAX_ARRAY_LEN as u64 {
        return Ok(Request::fatal("Protocol error: invalid multibulk length"));
    }

    let mut args = Vec::with_capacity((count as usize).min(16));
    let mut broken: Option<String> = None;
    for _ in 0..count {
        match read_element(reader)? {
            Element::Data(data) if broken.is_none() => args.push(data),
            Element::Data(_) => {}
            Element::Skipped(reason) => {
                broken.get_or_insert(reason);
            }
            Element::Lost(reason) => return Ok(Request::fatal(reason)),
        }
    }

    Ok(match broken {
        Some(reason) => Request::malformed(reason),
        None => Request::Args(args),
    })
}

/// One array element
enum Element {
    Data(Vec<u8>),

    /// Unusable, but the stream is past it
    Skipped(String),

    /// Its end cannot be found
    Lost(String),
}

fn read_element<R: BufRead>(reader: &mut R) -> io::Result<Element> {
    let line = match read_line(reader, MAX_LINE_LEN)? {
        Some(line) => line,
        None => return Ok(Element::Skipped("Protocol error: too big bulk header".to_string())),
    };

    match line.first() {
        Some(b'$') => {}
        Some(&other) => {
            return Ok(Element::Skipped(format!(
                "Protocol error: expected '$', got '{}'",
                other.escape_ascii()
            )))
        }
        None => {
            return Ok(Element::Skipped(
                "Protocol error: expected '$', got end of line".to_string(),
            ))
        }
    }

    let len = match parse_length(&line[1..]) {
        Some(len) if len >= 0 => len as u64,
        _ => return Ok(Element::Skipped("Protocol error: invalid bulk length".to_string())),
    };
    if len > MAX_BULK_LEN as u64 {
        return Ok(Element::Lost("Protocol error: invalid bulk length".to_string()));
    }

    let data = read_exact_vec(reader, len)?;

    let mut terminator = [0u8; 2];
    reader.read_exact(&mut terminator)?;
    if &terminator != b"\r\n" {
        // The payload ran long; resume after the line it was sent on.
        if !terminator.contains(&b'\n') {
            read_line(reader, MAX_LINE_LEN)?;
        }
        return Ok(Element::Skipped(
            "Protocol error: bulk string not terminated by CRLF".to_string(),
        ));
    }

    Ok(Element::Data(data))
}

/// Read through the next `\n`; `Ok(None)` if the line exceeded `max` bytes
///
/// The terminator (and a preceding `\r`) is stripped. An overlong line is
/// still consumed in full so the stream stays aligned.
fn read_line<R: BufRead>(reader: &mut R, max: usize) -> io::Result<Option<Vec<u8>>> {
    let mut line = Vec::new();
    let mut overflow = false;

    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed mid-line",
            ));
        }

        let (chunk, found) = match buf.iter().position(|&b| b == b'\n') {
            Some(i) => (&buf[..i], Some(i + 1)),
            None => (buf, None),
        };
        if !overflow {
            line.extend_from_slice(chunk);
            if line.len() > max {
                overflow = true;
                line = Vec::new();
            }
        }

        let consumed = found.unwrap_or(buf.len());
        reader.consume(consumed);
        if found.is_some() {
            break;
        }
    }

    if overflow {
        return Ok(None);
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(Some(line))
}

fn parse_length(digits: &[u8]) -> Option<i64> {
    std::str::from_utf8(digits).ok()?.trim().parse().ok()
}

/// Read exactly `len` bytes without trusting `len` for the allocation
fn read_exact_vec<R: Read>(reader: &mut R, len: u64) -> io::Result<Vec<u8>> {
    let mut data = Vec::with_capacity(len.min(64 * 1024) as usize);
    reader.take(len).read_to_end(&mut data)?;
    if (data.len() as u64) < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed mid-bulk",
        ));
    }
    Ok(data)
}

// =============================================================================
// Request Encoding (client side)
// =============================================================================

/// Encode arguments as an array request
pub fn encode_args(args: &[&[u8]]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Encode a command as an array request
pub fn encode_command(command: &Command) -> Vec<u8> {
    encode_args(&command.to_args())
}

/// Write a command to a stream
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<()> {
    writer.write_all(&encode_command(command))?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Reply Encoding/Decoding
// =============================================================================

/// Write a reply to a stream
pub fn write_reply<W: Write>(writer: &mut W, reply: &Reply) -> Result<()> {
    writer.write_all(&reply.encode())?;
    writer.flush()?;
    Ok(())
}

/// Read one reply (client side)
pub fn read_reply<R: BufRead>(reader: &mut R) -> Result<Reply> {
    let line = read_line(reader, MAX_LINE_LEN)?
        .ok_or_else(|| EmberError::Protocol("reply line too long".to_string()))?;

    let (&kind, body) = line
        .split_first()
        .ok_or_else(|| EmberError::Protocol("empty reply line".to_string()))?;
    let text = || String::from_utf8_lossy(body).into_owned();

    match kind {
        b'+' => Ok(Reply::Status(text())),
        b'-' => Ok(Reply::Error(text())),
        b':' => parse_length(body)
            .map(Reply::Integer)
            .ok_or_else(|| EmberError::Protocol(format!("invalid integer reply '{}'", text()))),
        b'$' => match parse_length(body) {
            Some(-1) => Ok(Reply::Bulk(None)),
            Some(len) if len >= 0 => {
                let data = read_exact_vec(reader, len as u64)?;
                let mut terminator = [0u8; 2];
                reader.read_exact(&mut terminator)?;
                if &terminator != b"\r\n" {
                    return Err(EmberError::Protocol("bulk reply not terminated by CRLF".to_string()));
                }
                Ok(Reply::Bulk(Some(data)))
            }
            _ => Err(EmberError::Protocol(format!("invalid bulk length '{}'", text()))),
        },
        other => Err(EmberError::Protocol(format!(
            "unknown reply type '{}'",
            other.escape_ascii()
        ))),
    }
}
