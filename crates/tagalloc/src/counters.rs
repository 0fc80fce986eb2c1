//! Exact process-wide totals.
//!
//! Unlike slot balances these never drop an update: every tracked allocation
//! adds its usable size and every release subtracts the same amount, so the
//! counters always match the set of live tagged blocks.

use std::sync::atomic::{AtomicUsize, Ordering};

pub struct GlobalStats {
    live_bytes: AtomicUsize,
    live_blocks: AtomicUsize,
}

impl GlobalStats {
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self {
            live_bytes: AtomicUsize::new(0),
            live_blocks: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn add_block(&self, bytes: usize) {
        self.live_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.live_blocks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn remove_block(&self, bytes: usize) {
        self.live_bytes.fetch_sub(bytes, Ordering::Relaxed);
        self.live_blocks.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn live_blocks(&self) -> usize {
        self.live_blocks.load(Ordering::Relaxed)
    }
}
