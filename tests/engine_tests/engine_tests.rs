//! Tests for Engine
//!
//! These tests verify:
//! - Open builds the configured store on a fresh data directory
//! - Data survives close and reopen, for both store kinds
//! - Data survives a crash (no final snapshot) through WAL replay
//! - close is idempotent and refuses later writes
//! - serve answers clients until close

use std::io::{BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use emberkv::protocol::{encode_command, read_reply, Command, Reply};
use emberkv::{Config, EmberError, Engine, KeyValueStore, StoreKind};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn config_in(dir: &TempDir, kind: StoreKind) -> Config {
    Config::builder()
        .data_dir(dir.path().join("data"))
        .store_kind(kind)
        .listen_addr("127.0.0.1:0")
        .snapshot_interval(Duration::from_secs(3600))
        .worker_pool_size(4)
        .queue_capacity(8)
        .build()
}

fn setup_temp_engine(kind: StoreKind) -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(config_in(&temp_dir, kind)).unwrap();
    (temp_dir, engine)
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_engine_open_creates_files() {
    let (temp, engine) = setup_temp_engine(StoreKind::Locked);

    assert!(temp.path().join("data").join("wal.log").exists());
    assert!(engine.store().is_empty());
    assert_eq!(engine.recovery().snapshot_entries, 0);
    assert_eq!(engine.config().store_kind, StoreKind::Locked);
}

#[test]
fn test_engine_rejects_invalid_config() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .worker_pool_size(0)
        .build();

    assert!(matches!(Engine::open(config), Err(EmberError::Config(_))));
}

#[test]
fn test_close_then_reopen_both_kinds() {
    for kind in [StoreKind::Locked, StoreKind::Sharded] {
        let temp = TempDir::new().unwrap();
        {
            let engine = Engine::open(config_in(&temp, kind)).unwrap();
            engine.store().set(b"a", b"1").unwrap();
            engine.store().set(b"b", b"2").unwrap();
            engine.store().delete(b"a").unwrap();
            engine.close().unwrap();
            assert!(engine.last_snapshot().is_some());
        }

        let engine = Engine::open(config_in(&temp, kind)).unwrap();
        assert_eq!(engine.store().get(b"a"), None, "{}", kind);
        assert_eq!(engine.store().get(b"b"), Some(b"2".to_vec()), "{}", kind);
        assert_eq!(engine.recovery().snapshot_entries, 1, "{}", kind);
        assert_eq!(engine.recovery().wal.entries_applied, 0, "{}", kind);
    }
}

#[test]
fn test_crash_without_close_recovers_from_wal() {
    let temp = TempDir::new().unwrap();
    {
        let engine = Engine::open(config_in(&temp, StoreKind::Sharded)).unwrap();
        engine.snapshot_now().unwrap();
        engine.store().set(b"after_snapshot", b"x").unwrap();
        // Dropped without close: no final snapshot.
    }

    let engine = Engine::open(config_in(&temp, StoreKind::Locked)).unwrap();
    assert_eq!(engine.store().get(b"after_snapshot"), Some(b"x".to_vec()));
    assert_eq!(engine.recovery().wal.entries_applied, 1);
}

#[test]
fn test_close_is_idempotent_and_refuses_writes() {
    let (_temp, engine) = setup_temp_engine(StoreKind::Locked);
    engine.store().set(b"k", b"v").unwrap();

    engine.close().unwrap();
    engine.close().unwrap();
    assert!(engine.is_closed());
    assert!(engine.wal().is_closed());

    assert!(matches!(engine.store().set(b"k", b"new"), Err(EmberError::WalClosed)));
    assert_eq!(engine.store().get(b"k"), Some(b"v".to_vec()));
}

#[test]
fn test_concurrent_close_calls() {
    let (_temp, engine) = setup_temp_engine(StoreKind::Sharded);
    let engine = Arc::new(engine);
    engine.store().set(b"k", b"v").unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.close())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    // Every caller returned after the final snapshot was written.
    assert!(engine.last_snapshot().is_some());
}

// =============================================================================
// Serving Tests
// =============================================================================

#[test]
fn test_serve_until_close() {
    let (_temp, engine) = setup_temp_engine(StoreKind::Sharded);
    let engine = Arc::new(engine);

    let server = engine.bind().unwrap();
    let addr = server.local_addr();
    let serving = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.serve_on(server))
    };

    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut writer = stream.try_clone().unwrap();
    let mut reader = BufReader::new(stream);

    let set = Command::Set { key: b"net".to_vec(), value: b"work".to_vec() };
    writer.write_all(&encode_command(&set)).unwrap();
    assert_eq!(read_reply(&mut reader).unwrap(), Reply::ok());
    assert_eq!(engine.store().get(b"net"), Some(b"work".to_vec()));

    engine.close().unwrap();
    serving.join().unwrap().unwrap();

    // The final snapshot holds the networked write.
    let info = engine.last_snapshot().unwrap();
    assert_eq!(info.entries, 1);
}
