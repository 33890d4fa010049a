//! Write-ahead log hook.
//!
//! The buffer pool accepts an optional `LogManager` but does not consult it
//! yet; it only hands out and tracks log sequence numbers.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Log Sequence Number - unique, monotonically increasing id of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Lsn(pub u64);

impl Lsn {
    /// Invalid/uninitialized LSN.
    pub const INVALID: Lsn = Lsn(0);

    /// First valid LSN.
    pub const FIRST: Lsn = Lsn(1);

    /// Returns true if this is a valid LSN.
    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl std::fmt::Display for Lsn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lsn:{}", self.0)
    }
}

/// Tracks the LSNs handed out and the highest LSN known to be durable.
#[derive(Debug)]
pub struct LogManager {
    next_lsn: AtomicU64,
    persistent_lsn: AtomicU64,
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LogManager {
    /// Creates a log manager with no LSNs handed out and nothing persisted.
    pub fn new() -> Self {
        Self {
            next_lsn: AtomicU64::new(Lsn::FIRST.0),
            persistent_lsn: AtomicU64::new(Lsn::INVALID.0),
        }
    }

    /// Hands out the next LSN.
    pub fn allocate_lsn(&self) -> Lsn {
        Lsn(self.next_lsn.fetch_add(1, Ordering::AcqRel))
    }

    /// The LSN the next `allocate_lsn` call will return.
    pub fn next_lsn(&self) -> Lsn {
        Lsn(self.next_lsn.load(Ordering::Acquire))
    }

    /// Highest LSN known to be on stable storage.
    pub fn persistent_lsn(&self) -> Lsn {
        Lsn(self.persistent_lsn.load(Ordering::Acquire))
    }

    /// Advances the persistent LSN. Never moves it backwards.
    pub fn set_persistent_lsn(&self, lsn: Lsn) {
        self.persistent_lsn.fetch_max(lsn.0, Ordering::AcqRel);
    }
}
