//! Worker admission
//!
//! A fixed number of tokens circulate through a bounded channel. Taking a
//! token admits one connection; dropping the permit puts the token back.

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

/// Counting admission gate for connection workers
#[derive(Debug, Clone)]
pub struct WorkerPool {
    tokens_tx: Sender<()>,
    tokens_rx: Receiver<()>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let (tokens_tx, tokens_rx) = channel::bounded(size);
        for _ in 0..size {
            // Capacity is `size`, so this cannot fail.
            let _ = tokens_tx.try_send(());
        }
        Self {
            tokens_tx,
            tokens_rx,
            size,
        }
    }

    /// Wait up to `timeout` for a free worker
    pub fn acquire_timeout(&self, timeout: Duration) -> Option<WorkerPermit> {
        match self.tokens_rx.recv_timeout(timeout) {
            Ok(()) => Some(self.permit()),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Take a free worker without waiting
    pub fn try_acquire(&self) -> Option<WorkerPermit> {
        self.tokens_rx.try_recv().ok().map(|()| self.permit())
    }

    fn permit(&self) -> WorkerPermit {
        WorkerPermit {
            tokens_tx: self.tokens_tx.clone(),
        }
    }

    /// Total number of workers
    pub fn size(&self) -> usize {
        self.size
    }

    /// Workers currently free
    pub fn available(&self) -> usize {
        self.tokens_rx.len()
    }
}

/// One admitted connection's claim on a worker; released on drop
#[derive(Debug)]
pub struct WorkerPermit {
    tokens_tx: Sender<()>,
}

impl Drop for WorkerPermit {
    fn drop(&mut self) {
        let _ = self.tokens_tx.try_send(());
    }
}
