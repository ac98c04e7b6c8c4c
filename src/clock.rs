//! Timestamps for WAL entries and snapshots
//!
//! Every WAL entry and every snapshot is stamped from one process-wide source
//! that never repeats and never goes backwards, even if the wall clock does.
//! Recovery compares these stamps, so they must be totally ordered.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Microseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Beginning of time: every real entry is strictly after it
    pub const ZERO: Timestamp = Timestamp(0);

    pub fn as_micros(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

/// Last timestamp handed out by `now()`
static LAST: AtomicU64 = AtomicU64::new(0);

fn wall_clock_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Next timestamp: the wall clock, or `last + 1` if the wall clock has not moved past it
pub fn now() -> Timestamp {
    let wall = wall_clock_micros();
    let mut last = LAST.load(Ordering::Acquire);
    loop {
        let next = wall.max(last + 1);
        match LAST.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return Timestamp(next),
            Err(actual) => last = actual,
        }
    }
}

/// Make sure future stamps are strictly after `ts`
pub fn observe(ts: Timestamp) {
    LAST.fetch_max(ts.0, Ordering::AcqRel);
}
