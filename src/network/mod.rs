//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single acceptor thread feeding a bounded connection queue
//! - One dispatcher thread admitting queued connections into a fixed-size
//!   worker pool, waiting at most the configured timeout
//! - One thread per admitted connection, running commands against the store

mod admission;
mod server;
mod connection;

pub use admission::{WorkerPermit, WorkerPool};
pub use server::{Server, ServerStats, ShutdownHandle};
pub use connection::{execute_command, Connection};
