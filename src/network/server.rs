//! TCP Server
//!
//! Accepts connections and dispatches them to worker threads.
//!
//! ```text
//!  accept loop ──try_send──▶ [ queue (capacity Q) ] ──▶ dispatcher
//!      │ full: drop                                      │ acquire_timeout
//!      ▼                                                 ▼
//!   rejected_queue_full              permit: spawn "conn-N" thread
//!                                    timeout: drop (rejected_timeout)
//! ```
//!
//! The accept loop only ever blocks in `accept`. Rejected connections are
//! closed without a reply.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, TrySendError};

use crate::config::Config;
use crate::error::{EmberError, Result};
use crate::store::KeyValueStore;

use super::admission::WorkerPool;
use super::connection::Connection;

/// Admission counters
#[derive(Debug, Default)]
pub struct ServerStats {
    accepted: AtomicU64,
    rejected_queue_full: AtomicU64,
    rejected_timeout: AtomicU64,
    active: AtomicU64,
}

impl ServerStats {
    /// Connections returned by `accept`, admitted or not
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected_queue_full(&self) -> u64 {
        self.rejected_queue_full.load(Ordering::Relaxed)
    }

    pub fn rejected_timeout(&self) -> u64 {
        self.rejected_timeout.load(Ordering::Relaxed)
    }

    /// Connections currently being served
    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }
}

/// Decrements `active` when a connection thread finishes
struct ActiveGuard(Arc<ServerStats>);

impl ActiveGuard {
    fn enter(stats: &Arc<ServerStats>) -> Self {
        stats.active.fetch_add(1, Ordering::Relaxed);
        ActiveGuard(Arc::clone(stats))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Stops a running server from another thread
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    addr: SocketAddr,
}

impl ShutdownHandle {
    /// Stop accepting and stop dispatching
    ///
    /// Connections already being served run until their clients leave.
    pub fn shutdown(&self) {
        if self.flag.swap(true, Ordering::SeqCst) {
            return;
        }
        // Wake the accept loop so it sees the flag.
        let _ = TcpStream::connect_timeout(&wake_addr(self.addr), Duration::from_secs(1));
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

fn wake_addr(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    }
}

/// TCP server for EmberKV
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    store: Arc<dyn KeyValueStore>,
    pool: WorkerPool,
    queue_capacity: usize,
    acquire_timeout: Duration,
    shutdown: Arc<AtomicBool>,
    stats: Arc<ServerStats>,
}

impl Server {
    /// Bind the listener; nothing is accepted until `run`
    pub fn bind(config: &Config, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(&config.listen_addr).map_err(|e| {
            EmberError::Network(format!("cannot listen on {}: {}", config.listen_addr, e))
        })?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            store,
            pool: WorkerPool::new(config.worker_pool_size),
            queue_capacity: config.queue_capacity,
            acquire_timeout: config.worker_acquire_timeout,
            shutdown: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(ServerStats::default()),
        })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
            addr: self.local_addr,
        }
    }

    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.stats)
    }

    /// Accept connections until shut down (blocking)
    pub fn run(&self) -> Result<()> {
        tracing::info!(
            "Listening on {} ({} workers, queue {}, acquire timeout {:?})",
            self.local_addr,
            self.pool.size(),
            self.queue_capacity,
            self.acquire_timeout
        );

        let (queue_tx, queue_rx) = channel::bounded::<TcpStream>(self.queue_capacity);

        let dispatcher = Dispatcher {
            queue: queue_rx,
            pool: self.pool.clone(),
            acquire_timeout: self.acquire_timeout,
            store: Arc::clone(&self.store),
            shutdown: Arc::clone(&self.shutdown),
            stats: Arc::clone(&self.stats),
        };
        let dispatcher = thread::Builder::new()
            .name("dispatcher".to_string())
            .spawn(move || dispatcher.run())?;

        let mut backoff = AcceptBackoff::new();
        for incoming in self.listener.incoming() {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            let stream = match incoming {
                Ok(stream) => {
                    backoff.reset();
                    stream
                }
                Err(e) => {
                    // EMFILE and friends fail again at once until something closes.
                    let delay = backoff.failed();
                    tracing::warn!("Accept failed: {}, retrying in {:?}", e, delay);
                    thread::sleep(delay);
                    continue;
                }
            };
            self.stats.accepted.fetch_add(1, Ordering::Relaxed);

            match queue_tx.try_send(stream) {
                Ok(()) => {}
                Err(TrySendError::Full(stream)) => {
                    self.stats.rejected_queue_full.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        "Connection queue full, dropping {}",
                        peer_of(&stream)
                    );
                }
                Err(TrySendError::Disconnected(_)) => {
                    tracing::error!("Dispatcher exited, stopping accept loop");
                    break;
                }
            }
        }

        drop(queue_tx);
        if dispatcher.join().is_err() {
            tracing::error!("Dispatcher thread panicked");
        }
        tracing::info!("Server on {} stopped", self.local_addr);
        Ok(())
    }
}

const ACCEPT_BACKOFF_START: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause after a failed `accept`, doubling while failures continue
struct AcceptBackoff {
    next: Duration,
}

impl AcceptBackoff {
    fn new() -> Self {
        Self {
            next: ACCEPT_BACKOFF_START,
        }
    }

    /// How long to wait after this failure
    fn failed(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(ACCEPT_BACKOFF_MAX);
        delay
    }

    fn reset(&mut self) {
        self.next = ACCEPT_BACKOFF_START;
    }
}

/// Moves queued connections onto worker threads
struct Dispatcher {
    queue: Receiver<TcpStream>,
    pool: WorkerPool,
    acquire_timeout: Duration,
    store: Arc<dyn KeyValueStore>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<ServerStats>,
}

impl Dispatcher {
    fn run(self) {
        let mut next_id: u64 = 0;

        for stream in self.queue.iter() {
            if self.shutdown.load(Ordering::SeqCst) {
                continue;
            }

            let permit = match self.pool.acquire_timeout(self.acquire_timeout) {
                Some(permit) => permit,
                None => {
                    self.stats.rejected_timeout.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        "No worker free within {:?}, dropping {}",
                        self.acquire_timeout,
                        peer_of(&stream)
                    );
                    continue;
                }
            };

            next_id += 1;
            let store = Arc::clone(&self.store);
            let active = ActiveGuard::enter(&self.stats);
            let spawned = thread::Builder::new()
                .name(format!("conn-{}", next_id))
                .spawn(move || {
                    let _permit = permit;
                    let _active = active;
                    let result = Connection::new(stream, store).and_then(|mut conn| conn.handle());
                    if let Err(e) = result {
                        tracing::warn!("Connection ended with error: {}", e);
                    }
                });
            if let Err(e) = spawned {
                tracing::error!("Failed to spawn connection thread: {}", e);
            }
        }

        tracing::debug!("Dispatcher stopped");
    }
}

fn peer_of(stream: &TcpStream) -> String {
    stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
