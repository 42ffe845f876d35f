//! Host time and ordering oracle
//!
//! The ledger never reads the clock itself. The surrounding host supplies a
//! trusted `current_time` (Unix seconds) and a `current_height` ordering
//! index, both monotonically non-decreasing across calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Trusted source of time and ordering
pub trait HostOracle {
    /// Current time in Unix seconds
    fn current_time(&self) -> u64;

    /// Current ordering height
    fn current_height(&self) -> u64;
}

/// Wall-clock oracle; height advances once per `block_interval_secs`
#[derive(Debug, Clone)]
pub struct SystemOracle {
    block_interval_secs: u64,
}

impl SystemOracle {
    /// Create an oracle with the given height interval (minimum 1 second)
    pub fn new(block_interval_secs: u64) -> Self {
        Self {
            block_interval_secs: block_interval_secs.max(1),
        }
    }
}

impl Default for SystemOracle {
    fn default() -> Self {
        Self::new(1)
    }
}

impl HostOracle for SystemOracle {
    fn current_time(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    fn current_height(&self) -> u64 {
        self.current_time() / self.block_interval_secs
    }
}

/// Host-driven oracle; clones share the same time and height
///
/// Values only move forward: setting an earlier time is ignored.
#[derive(Debug, Clone, Default)]
pub struct ManualOracle {
    time: Arc<AtomicU64>,
    height: Arc<AtomicU64>,
}

impl ManualOracle {
    /// Create an oracle starting at `time` and `height`
    pub fn new(time: u64, height: u64) -> Self {
        Self {
            time: Arc::new(AtomicU64::new(time)),
            height: Arc::new(AtomicU64::new(height)),
        }
    }

    /// Move time forward to `time`
    pub fn set_time(&self, time: u64) {
        self.time.fetch_max(time, Ordering::SeqCst);
    }

    /// Move height forward to `height`
    pub fn set_height(&self, height: u64) {
        self.height.fetch_max(height, Ordering::SeqCst);
    }

    /// Advance time by `secs` and height by one
    pub fn advance(&self, secs: u64) {
        self.time.fetch_add(secs, Ordering::SeqCst);
        self.height.fetch_add(1, Ordering::SeqCst);
    }
}

impl HostOracle for ManualOracle {
    fn current_time(&self) -> u64 {
        self.time.load(Ordering::SeqCst)
    }

    fn current_height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }
}
