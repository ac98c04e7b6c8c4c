//! # EmberKV
//!
//! A networked key-value store with:
//! - Write-Ahead Logging (WAL) with an fsync on every mutation
//! - Periodic snapshots plus WAL replay for crash recovery
//! - Two interchangeable stores: a single-lock map and a 1024-way sharded map
//! - A RESP-style TCP protocol behind a bounded accept queue and worker pool
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Listener                            │
//! │              (accept → bounded queue, try_send)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     Dispatcher                               │
//! │         (worker pool permit, bounded wait → reject)          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ one thread per admitted connection
//!                       ▼
//!               ┌──────────────┐
//!               │ KeyValueStore│ (locked or sharded)
//!               └──────┬───────┘
//!          log first   │   then apply
//!          ┌───────────┴─────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │          │  In-memory  │
//!   │ (fsync/op)  │          │     map     │
//!   └──────┬──────┘          └──────┬──────┘
//!          │    replay after        │ get_all
//!          └──────────┐   ┌─────────┘
//!                     ▼   ▼
//!               ┌─────────────┐
//!               │  Snapshot   │
//!               │  Persister  │
//!               └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod clock;

pub mod wal;
pub mod store;
pub mod persistence;
pub mod protocol;
pub mod network;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{EmberError, Result};
pub use config::{Config, StoreKind};
pub use clock::Timestamp;
pub use engine::Engine;
pub use store::{KeyValueStore, LockedStore, ReplaySink, ShardedStore, WriteLog};
pub use wal::WriteAheadLog;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of EmberKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
