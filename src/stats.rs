//! Epoch activity statistics.
//!
//! Relaxed atomic counters recording how the manager, the driver and the
//! reducer are being exercised. Cheap enough to leave on unconditionally.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for epoch activity.
#[derive(Debug, Default)]
pub struct EpochStats {
    /// Read-write transactions entered.
    pub enters: AtomicU64,
    /// Read-write transactions exited.
    pub exits: AtomicU64,
    /// Read-only transactions entered.
    pub read_only_enters: AtomicU64,
    /// Read-only transactions exited.
    pub read_only_exits: AtomicU64,
    /// Enter attempts refused by the head validation check.
    pub enter_rejections: AtomicU64,
    /// Global epoch ticks performed by the driver.
    pub ticks: AtomicU64,
    /// Watermark reductions performed.
    pub reducer_passes: AtomicU64,
}

impl EpochStats {
    /// Create new statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a read-write enter.
    pub fn record_enter(&self) {
        self.enters.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a read-write exit.
    pub fn record_exit(&self) {
        self.exits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a read-only enter.
    pub fn record_read_only_enter(&self) {
        self.read_only_enters.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a read-only exit.
    pub fn record_read_only_exit(&self) {
        self.read_only_exits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an enter attempt that lost the validation race.
    pub fn record_enter_rejection(&self) {
        self.enter_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a driver tick.
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a watermark reduction.
    pub fn record_reducer_pass(&self) {
        self.reducer_passes.fetch_add(1, Ordering::Relaxed);
    }

    /// Read-write transactions currently in flight.
    ///
    /// Approximate under concurrency; the counters are sampled
    /// independently.
    pub fn in_flight(&self) -> u64 {
        self.enters
            .load(Ordering::Relaxed)
            .saturating_sub(self.exits.load(Ordering::Relaxed))
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.enters.store(0, Ordering::Relaxed);
        self.exits.store(0, Ordering::Relaxed);
        self.read_only_enters.store(0, Ordering::Relaxed);
        self.read_only_exits.store(0, Ordering::Relaxed);
        self.enter_rejections.store(0, Ordering::Relaxed);
        self.ticks.store(0, Ordering::Relaxed);
        self.reducer_passes.store(0, Ordering::Relaxed);
    }
}
