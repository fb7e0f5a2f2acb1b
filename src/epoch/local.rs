//! Thread-local epoch tracking.
//!
//! Each registered worker owns a `LocalEpochContext`: a fixed-size ring of
//! per-epoch transaction counters plus a `head`/`tail` pair bracketing the
//! window of epochs in which the thread may still have live transactions.
//! The owner enters and exits slots on its own; a reducer thread
//! periodically resynchronizes idle contexts against the global epoch so
//! their tails keep up with the watermark.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::constants::{RING_SIZE, UNINITIALIZED_EPOCH};

/// One cell of the local epoch ring.
///
/// Counts the transactions currently active in the epoch that maps to this
/// slot. Only the owning worker increments and decrements, but the reducer
/// reads the counters while scanning, so both fields are atomic.
#[derive(Debug, Default)]
pub struct EpochSlot {
    /// Read-write transactions active in this slot.
    read_write: AtomicU32,
    /// Read-only transactions active in this slot. Tracked but never
    /// consulted by tail advance; a future reclamation policy may layer a
    /// separate read-only watermark on top of it.
    read_only: AtomicU32,
}

impl EpochSlot {
    const fn new() -> Self {
        Self {
            read_write: AtomicU32::new(0),
            read_only: AtomicU32::new(0),
        }
    }

    /// Current read-write transaction count.
    #[inline]
    pub fn read_write_count(&self) -> u32 {
        self.read_write.load(Ordering::Acquire)
    }

    /// Current read-only transaction count.
    #[inline]
    pub fn read_only_count(&self) -> u32 {
        self.read_only.load(Ordering::Acquire)
    }
}

/// Per-thread epoch state: the ring plus the `[tail + 1, head]` window.
///
/// `head` is the largest epoch the thread has observed; `tail` is the
/// largest epoch known to hold no live read-write work on this thread.
/// The window never spans more than [`RING_SIZE`] epochs; a transaction
/// outliving the ring is a contract violation.
pub struct LocalEpochContext {
    ring: Box<[EpochSlot]>,
    /// Largest epoch this thread has observed. Raised by the owner on
    /// enter and by the reducer on resync; monotone under both.
    head: AtomicU64,
    /// Largest epoch with no live read-write work on this thread.
    /// Starts at the [`UNINITIALIZED_EPOCH`] sentinel until first use.
    tail: AtomicU64,
}

impl LocalEpochContext {
    /// Create an empty context with an uninitialized window.
    pub fn new() -> Self {
        let ring = (0..RING_SIZE)
            .map(|_| EpochSlot::new())
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            ring,
            head: AtomicU64::new(0),
            tail: AtomicU64::new(UNINITIALIZED_EPOCH),
        }
    }

    #[inline]
    fn slot(&self, epoch_id: u64) -> &EpochSlot {
        &self.ring[(epoch_id % RING_SIZE as u64) as usize]
    }

    /// Enter epoch `epoch_id` with a read-write transaction.
    ///
    /// Returns `false` when `epoch_id` precedes the published head, which
    /// happens only when a reduction raised `head` between the caller
    /// sampling the global epoch and entering here. The caller must
    /// re-sample and retry.
    pub fn enter(&self, epoch_id: u64) -> bool {
        // First use: the window starts one epoch behind the entry point.
        // A failed exchange means the reducer initialized the window first.
        let _ = self.tail.compare_exchange(
            UNINITIALIZED_EPOCH,
            epoch_id - 1,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        // Publish the slot claim before validating, then withdraw it on
        // refusal. A concurrent reduction either observes the claim and
        // stops its tail scan below us, or has already raised head and we
        // see that here. SeqCst pairs with the reducer's head write and
        // slot read in resync_and_advance.
        let slot = self.slot(epoch_id);
        slot.read_write.fetch_add(1, Ordering::SeqCst);

        if epoch_id < self.head.load(Ordering::SeqCst) {
            slot.read_write.fetch_sub(1, Ordering::SeqCst);
            return false;
        }

        self.head.fetch_max(epoch_id, Ordering::SeqCst);

        let tail = self.tail.load(Ordering::Acquire);
        debug_assert!(
            tail != UNINITIALIZED_EPOCH && epoch_id - tail <= RING_SIZE as u64,
            "transaction at epoch {epoch_id} outlived the ring (tail {tail})"
        );

        true
    }

    /// Enter epoch `epoch_id` with a read-only transaction.
    ///
    /// Identical validation to [`enter`](Self::enter); the count lands in
    /// the read-only counter and never blocks tail advance.
    pub fn enter_read_only(&self, epoch_id: u64) -> bool {
        let _ = self.tail.compare_exchange(
            UNINITIALIZED_EPOCH,
            epoch_id - 1,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        let slot = self.slot(epoch_id);
        slot.read_only.fetch_add(1, Ordering::SeqCst);

        if epoch_id < self.head.load(Ordering::SeqCst) {
            slot.read_only.fetch_sub(1, Ordering::SeqCst);
            return false;
        }

        self.head.fetch_max(epoch_id, Ordering::SeqCst);

        let tail = self.tail.load(Ordering::Acquire);
        debug_assert!(
            tail != UNINITIALIZED_EPOCH && epoch_id - tail <= RING_SIZE as u64,
            "read-only transaction at epoch {epoch_id} outlived the ring (tail {tail})"
        );

        true
    }

    /// Exit the read-write transaction entered at `epoch_id`.
    pub fn exit(&self, epoch_id: u64) {
        debug_assert_ne!(self.tail.load(Ordering::Acquire), UNINITIALIZED_EPOCH);
        debug_assert!(epoch_id > self.tail.load(Ordering::Acquire));

        self.slot(epoch_id).read_write.fetch_sub(1, Ordering::SeqCst);
        self.advance_tail();
    }

    /// Exit the read-only transaction entered at `epoch_id`.
    ///
    /// Unlike the read-write side, `epoch_id` may already sit at or below
    /// the tail: read-only work does not pin the watermark.
    pub fn exit_read_only(&self, epoch_id: u64) {
        debug_assert_ne!(self.tail.load(Ordering::Acquire), UNINITIALIZED_EPOCH);

        self.slot(epoch_id).read_only.fetch_sub(1, Ordering::SeqCst);
        self.advance_tail();
    }

    /// Slide `tail` forward over empty slots.
    ///
    /// Stops at the first slot with live read-write work or at `head - 1`.
    /// Both the owner (on exit) and the reducer (on resync) may advance
    /// concurrently; the compare-exchange keeps a stale advancer from ever
    /// moving `tail` backward.
    pub fn advance_tail(&self) {
        let head = self.head.load(Ordering::Acquire);
        let mut tail = self.tail.load(Ordering::Acquire);

        while tail != UNINITIALIZED_EPOCH && tail + 1 < head {
            if self.slot(tail + 1).read_write.load(Ordering::SeqCst) != 0 {
                break;
            }
            match self
                .tail
                .compare_exchange(tail, tail + 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => tail += 1,
                // Another advancer won; continue from its position.
                Err(current) => tail = current,
            }
        }
    }

    /// Pull `head` forward to the current global epoch on behalf of this
    /// context, initialize the window if the thread has never entered,
    /// advance, and return the resulting tail.
    ///
    /// Invoked by the reducer. The race between this raising `head` and
    /// the owner entering at an older sampled epoch is what the validation
    /// in [`enter`](Self::enter) closes.
    pub fn resync_and_advance(&self, global_epoch: u64) -> u64 {
        let prior = self.head.fetch_max(global_epoch, Ordering::SeqCst);
        let head = prior.max(global_epoch);

        // A failed exchange means the owner started a transaction
        // concurrently and initialized the window first; its value wins.
        let _ = self.tail.compare_exchange(
            UNINITIALIZED_EPOCH,
            head - 1,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        self.advance_tail();
        self.tail.load(Ordering::Acquire)
    }

    /// Current tail epoch, [`UNINITIALIZED_EPOCH`] before first use.
    #[inline]
    pub fn tail_epoch(&self) -> u64 {
        self.tail.load(Ordering::Acquire)
    }

    /// Current head epoch.
    #[inline]
    pub fn head_epoch(&self) -> u64 {
        self.head.load(Ordering::Acquire)
    }

    /// Whether the context has left the uninitialized state.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.tail_epoch() != UNINITIALIZED_EPOCH
    }
}

impl Default for LocalEpochContext {
    fn default() -> Self {
        Self::new()
    }
}
