//! The epoch manager façade.
//!
//! Fuses transaction-id issuance with epoch stamping and reduces per-thread
//! observations into the system-wide safe reclamation horizon.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crossbeam::utils::Backoff;
use parking_lot::Mutex;

use crate::epoch::driver::{EpochConfig, EpochDriver};
use crate::epoch::local::LocalEpochContext;
use crate::stats::EpochStats;
use crate::txn_id::TransactionId;

/// Decentralized epoch manager.
///
/// Owns the global epoch counter, the registry of per-thread contexts and
/// the transaction-id allocator. Worker threads register once, then enter
/// and exit epochs on their own context without coordinating with each
/// other; a reclamation consumer periodically reduces the per-thread tails
/// into a single watermark below which no transaction can observe state.
///
/// The manager is meant to be created once at process start, before any
/// worker registers, and handed to the subsystems that need it.
pub struct DecentralizedEpochManager {
    /// True time of the system. Written by the driver (and the reset
    /// hook), read by everyone.
    global_epoch: Arc<AtomicU64>,
    /// Sequence half of issued transaction ids. Wraps; uniqueness comes
    /// from the epoch half.
    next_txn_id: AtomicU32,
    /// Registered per-thread contexts. The lock guards structural
    /// mutation only; enter/exit clone the `Arc` handle once and then run
    /// lock-free against the context.
    contexts: Mutex<HashMap<u64, Arc<LocalEpochContext>>>,
    driver: EpochDriver,
    stats: Arc<EpochStats>,
}

impl DecentralizedEpochManager {
    /// Create a manager with the given epoch configuration.
    pub fn new(config: EpochConfig) -> Self {
        let global_epoch = Arc::new(AtomicU64::new(1));
        let stats = Arc::new(EpochStats::new());
        let driver = EpochDriver::new(config, Arc::clone(&global_epoch), Arc::clone(&stats));

        Self {
            global_epoch,
            next_txn_id: AtomicU32::new(0),
            contexts: Mutex::new(HashMap::new()),
            driver,
            stats,
        }
    }

    /// Register a worker thread.
    ///
    /// Must happen before the thread's first [`enter`](Self::enter).
    /// Registering an id that is already present replaces its context.
    pub fn register_thread(&self, thread_id: u64) {
        self.contexts
            .lock()
            .insert(thread_id, Arc::new(LocalEpochContext::new()));
        tracing::debug!(thread_id, "registered epoch context");
    }

    /// Remove a worker thread's context.
    ///
    /// Must happen after the thread's last [`exit`](Self::exit) has
    /// returned.
    pub fn deregister_thread(&self, thread_id: u64) {
        self.contexts.lock().remove(&thread_id);
        tracing::debug!(thread_id, "deregistered epoch context");
    }

    /// Number of registered worker threads.
    pub fn registered_threads(&self) -> usize {
        self.contexts.lock().len()
    }

    fn context(&self, thread_id: u64) -> Arc<LocalEpochContext> {
        self.contexts
            .lock()
            .get(&thread_id)
            .cloned()
            .unwrap_or_else(|| panic!("thread {thread_id} is not registered"))
    }

    /// Begin a read-write transaction on `thread_id`.
    ///
    /// Samples the global epoch, enters the thread's local ring, and
    /// returns the composite transaction id. An enter that loses the
    /// validation race against a concurrent reduction retries internally;
    /// each retry succeeds within one global tick.
    ///
    /// Panics if `thread_id` was never registered.
    pub fn enter(&self, thread_id: u64) -> TransactionId {
        let context = self.context(thread_id);
        let backoff = Backoff::new();

        loop {
            let epoch_id = self.global_epoch.load(Ordering::Acquire);
            if context.enter(epoch_id) {
                self.stats.record_enter();
                let sequence = self.next_txn_id.fetch_add(1, Ordering::Relaxed);
                return TransactionId::new(epoch_id, sequence);
            }
            self.stats.record_enter_rejection();
            backoff.spin();
        }
    }

    /// Finish the read-write transaction identified by `txn_id`.
    pub fn exit(&self, thread_id: u64, txn_id: TransactionId) {
        self.context(thread_id).exit(txn_id.epoch_id());
        self.stats.record_exit();
    }

    /// Begin a read-only transaction on `thread_id`.
    ///
    /// Issued from the same id allocator as read-write transactions; the
    /// entry never pins the reclamation watermark.
    pub fn enter_read_only(&self, thread_id: u64) -> TransactionId {
        let context = self.context(thread_id);
        let backoff = Backoff::new();

        loop {
            let epoch_id = self.global_epoch.load(Ordering::Acquire);
            if context.enter_read_only(epoch_id) {
                self.stats.record_read_only_enter();
                let sequence = self.next_txn_id.fetch_add(1, Ordering::Relaxed);
                return TransactionId::new(epoch_id, sequence);
            }
            self.stats.record_enter_rejection();
            backoff.spin();
        }
    }

    /// Finish the read-only transaction identified by `txn_id`.
    pub fn exit_read_only(&self, thread_id: u64, txn_id: TransactionId) {
        self.context(thread_id).exit_read_only(txn_id.epoch_id());
        self.stats.record_read_only_exit();
    }

    /// Begin a read-write transaction that exits when the guard drops.
    pub fn enter_guard(&self, thread_id: u64) -> TxnGuard<'_> {
        let txn_id = self.enter(thread_id);
        TxnGuard {
            manager: self,
            thread_id,
            txn_id,
        }
    }

    /// Reduce every registered context against the current global epoch
    /// and return the minimum tail: the safe reclamation horizon.
    ///
    /// Everything at or below the returned epoch is unreachable by any
    /// in-flight transaction. Returns `u64::MAX` when no context is
    /// registered. May run on any thread, including a worker.
    pub fn global_tail_epoch(&self) -> u64 {
        let global_epoch = self.global_epoch.load(Ordering::Acquire);

        // Snapshot the handles so the reduction itself runs without the
        // registry lock; register/deregister may race with the scan.
        let contexts: Vec<Arc<LocalEpochContext>> =
            self.contexts.lock().values().cloned().collect();

        self.stats.record_reducer_pass();

        contexts
            .iter()
            .map(|context| context.resync_and_advance(global_epoch))
            .fold(u64::MAX, u64::min)
    }

    /// Current value of the global epoch counter.
    pub fn current_global_epoch(&self) -> u64 {
        self.global_epoch.load(Ordering::Acquire)
    }

    /// Launch the epoch driver.
    ///
    /// Returns `false` when the driver is already running.
    pub fn start(&self) -> bool {
        self.driver.start()
    }

    /// Stop the epoch driver. A no-op while stopped.
    pub fn stop(&self) {
        self.driver.stop();
    }

    /// Whether the epoch driver is running.
    pub fn is_running(&self) -> bool {
        self.driver.is_running()
    }

    /// Administrative reset of the global epoch.
    ///
    /// Permitted only while the driver is stopped and no worker is
    /// registered; the counter is otherwise monotone.
    pub fn reset(&self, epoch_id: u64) {
        debug_assert!(!self.driver.is_running());
        debug_assert!(self.contexts.lock().is_empty());
        debug_assert!(epoch_id >= 1);
        self.global_epoch.store(epoch_id, Ordering::Release);
    }

    /// Epoch activity counters.
    pub fn stats(&self) -> &EpochStats {
        &self.stats
    }
}

impl Default for DecentralizedEpochManager {
    fn default() -> Self {
        Self::new(EpochConfig::default())
    }
}

/// RAII wrapper around an enter/exit pair.
///
/// Holds the issued transaction id and exits the epoch when dropped.
pub struct TxnGuard<'a> {
    manager: &'a DecentralizedEpochManager,
    thread_id: u64,
    txn_id: TransactionId,
}

impl TxnGuard<'_> {
    /// The issued transaction id.
    pub fn txn_id(&self) -> TransactionId {
        self.txn_id
    }

    /// The worker this guard belongs to.
    pub fn thread_id(&self) -> u64 {
        self.thread_id
    }
}

impl Drop for TxnGuard<'_> {
    fn drop(&mut self) {
        self.manager.exit(self.thread_id, self.txn_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_exit_round_trip() {
        let manager = DecentralizedEpochManager::default();
        manager.register_thread(1);

        let txn = manager.enter(1);
        assert_eq!(txn.epoch_id(), 1);
        assert_eq!(txn.sequence(), 0);

        let txn2 = manager.enter(1);
        assert_eq!(txn2.sequence(), 1);

        manager.exit(1, txn);
        manager.exit(1, txn2);

        // Both transactions done; the watermark reaches global - 1.
        assert_eq!(manager.global_tail_epoch(), 0);
    }

    #[test]
    fn test_open_transaction_pins_watermark() {
        let manager = DecentralizedEpochManager::default();
        manager.reset(10);
        manager.register_thread(1);

        let txn = manager.enter(1);
        assert_eq!(txn.epoch_id(), 10);
        assert_eq!(manager.global_tail_epoch(), 9);

        manager.exit(1, txn);
        assert_eq!(manager.global_tail_epoch(), 9);
    }

    #[test]
    fn test_empty_registry_reduces_to_max() {
        let manager = DecentralizedEpochManager::default();
        assert_eq!(manager.global_tail_epoch(), u64::MAX);

        manager.register_thread(1);
        manager.enter(1);
        manager.deregister_thread(1);
        assert_eq!(manager.global_tail_epoch(), u64::MAX);
    }

    #[test]
    fn test_idle_context_follows_reset_epoch() {
        let manager = DecentralizedEpochManager::default();
        manager.reset(100);
        manager.register_thread(1);

        // The thread never entered; the reduction initializes it.
        assert_eq!(manager.global_tail_epoch(), 99);
    }

    #[test]
    fn test_watermark_is_minimum_over_threads() {
        let manager = DecentralizedEpochManager::default();
        manager.reset(5);
        manager.register_thread(1);
        manager.register_thread(2);

        let pinning = manager.enter(1);
        let other = manager.enter(2);
        manager.exit(2, other);

        assert_eq!(manager.global_tail_epoch(), 4);

        manager.exit(1, pinning);
        assert_eq!(manager.global_tail_epoch(), 4);
    }

    #[test]
    fn test_read_only_does_not_pin_watermark() {
        let manager = DecentralizedEpochManager::default();
        manager.reset(7);
        manager.register_thread(1);

        let ro = manager.enter_read_only(1);
        assert_eq!(ro.epoch_id(), 7);

        // Still live, yet invisible to the reduction.
        assert_eq!(manager.global_tail_epoch(), 6);

        manager.exit_read_only(1, ro);
        assert_eq!(manager.stats().read_only_exits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_guard_exits_on_drop() {
        let manager = DecentralizedEpochManager::default();
        manager.register_thread(1);

        {
            let guard = manager.enter_guard(1);
            assert_eq!(guard.thread_id(), 1);
            assert_eq!(guard.txn_id().epoch_id(), 1);
            assert_eq!(manager.stats().in_flight(), 1);
        }

        assert_eq!(manager.stats().in_flight(), 0);
    }

    #[test]
    fn test_sequence_allocation_is_shared() {
        let manager = DecentralizedEpochManager::default();
        manager.register_thread(1);
        manager.register_thread(2);

        let a = manager.enter(1);
        let b = manager.enter(2);
        assert_ne!(a.sequence(), b.sequence());

        manager.exit(1, a);
        manager.exit(2, b);
    }

    #[test]
    #[should_panic(expected = "not registered")]
    fn test_enter_before_register_panics() {
        let manager = DecentralizedEpochManager::default();
        manager.enter(42);
    }

    #[test]
    fn test_registered_threads() {
        let manager = DecentralizedEpochManager::default();
        assert_eq!(manager.registered_threads(), 0);

        manager.register_thread(1);
        manager.register_thread(2);
        assert_eq!(manager.registered_threads(), 2);

        manager.deregister_thread(1);
        assert_eq!(manager.registered_threads(), 1);
    }
}
