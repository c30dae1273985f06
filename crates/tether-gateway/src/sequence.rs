//! Last-seen dispatch sequence number.

use std::sync::atomic::{AtomicU64, Ordering};

/// Tracks the highest sequence number received on the current session.
///
/// Zero means nothing has been received since the last Identify. Readers
/// (heartbeats, Resume) and the writer (the dispatch loop) run on different
/// tasks, so the value lives in an atomic.
#[derive(Debug, Default)]
pub struct Sequence(AtomicU64);

impl Sequence {
    /// Create a tracker at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Current value, zero if nothing has been received.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Current value, or `None` if nothing has been received.
    #[must_use]
    pub fn last(&self) -> Option<u64> {
        match self.get() {
            0 => None,
            seq => Some(seq),
        }
    }

    /// Record a received sequence number. Never moves backwards.
    pub fn observe(&self, seq: u64) {
        self.0.fetch_max(seq, Ordering::SeqCst);
    }

    /// Forget everything; used when a fresh session is identified.
    pub fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}
