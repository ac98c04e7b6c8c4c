//! Connection Handler
//!
//! Handles individual client connections.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::Arc;

use crate::error::Result;
use crate::protocol::{read_request, write_reply, Command, Reply, Request};
use crate::store::KeyValueStore;

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    store: Arc<dyn KeyValueStore>,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    pub fn new(stream: TcpStream, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            store,
            peer_addr,
        })
    }

    /// Serve requests until the client disconnects
    ///
    /// Disconnects (clean or not) end the loop with `Ok`. Other I/O errors
    /// are returned. A malformed frame gets an error reply; the connection
    /// is only closed afterwards if the frame cannot be skipped.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            let request = match read_request(&mut self.reader) {
                Ok(Some(request)) => request,
                Ok(None) => {
                    tracing::debug!("Client {} disconnected", self.peer_addr);
                    return Ok(());
                }
                Err(e) if e.is_disconnect() => {
                    tracing::debug!("Client {} went away mid-request: {}", self.peer_addr, e);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    return Err(e);
                }
            };

            let (reply, keep_open) = match request {
                Request::Args(args) => (self.execute(args), true),
                Request::Malformed {
                    reason,
                    recoverable,
                } => {
                    tracing::debug!("Malformed request from {}: {}", self.peer_addr, reason);
                    (Reply::error(format!("ERR {}", reason)), recoverable)
                }
            };

            if let Err(e) = write_reply(&mut self.writer, &reply) {
                if e.is_disconnect() {
                    tracing::debug!(
                        "Client {} disconnected before reply could be sent: {}",
                        self.peer_addr,
                        e
                    );
                    return Ok(());
                }
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                return Err(e);
            }

            if !keep_open {
                tracing::debug!("Closing {} after unrecoverable frame", self.peer_addr);
                return Ok(());
            }
        }
    }

    fn execute(&self, args: Vec<Vec<u8>>) -> Reply {
        let command = match Command::parse(args) {
            Ok(command) => command,
            Err(e) => return Reply::error(e.to_string()),
        };
        tracing::trace!("{} from {}", command.name(), self.peer_addr);
        execute_command(&*self.store, command)
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

/// Run one command against a store and build its reply
pub fn execute_command(store: &dyn KeyValueStore, command: Command) -> Reply {
    match command {
        Command::Get { key } => Reply::Bulk(store.get(&key)),
        Command::Set { key, value } => match store.set(&key, &value) {
            Ok(()) => Reply::ok(),
            Err(e) => not_persisted(e),
        },
        Command::Del { key } => match store.delete(&key) {
            Ok(()) => Reply::Integer(1),
            Err(e) => not_persisted(e),
        },
        Command::Ping => Reply::Status("PONG".to_string()),
    }
}

fn not_persisted(e: crate::error::EmberError) -> Reply {
    tracing::error!("Write rejected: {}", e);
    Reply::error(format!("ERR write not persisted: {}", e))
}
