//! Global epoch driver.
//!
//! A dedicated timer thread advances the global epoch counter at a fixed
//! wall-clock rate. The driver is the sole writer of global epoch time
//! outside the administrative reset hook.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::constants::DEFAULT_EPOCH_LENGTH_MS;
use crate::stats::EpochStats;

/// Configuration for epoch advancement.
#[derive(Debug, Clone)]
pub struct EpochConfig {
    /// Interval between global epoch ticks.
    ///
    /// Together with the ring size this bounds how long a transaction may
    /// run: one outliving `RING_SIZE` ticks violates the window invariant.
    pub epoch_length: Duration,
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self {
            epoch_length: Duration::from_millis(DEFAULT_EPOCH_LENGTH_MS),
        }
    }
}

impl EpochConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interval between global epoch ticks.
    pub fn with_epoch_length(mut self, epoch_length: Duration) -> Self {
        self.epoch_length = epoch_length;
        self
    }
}

/// Background timer that owns global epoch advancement.
///
/// Runs a thread that sleeps for one epoch length, re-checks the running
/// flag, and increments the shared counter. Stopping clears the flag and
/// joins the thread.
pub struct EpochDriver {
    config: EpochConfig,
    global_epoch: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    stats: Arc<EpochStats>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl EpochDriver {
    /// Create a driver that advances `global_epoch`.
    pub fn new(config: EpochConfig, global_epoch: Arc<AtomicU64>, stats: Arc<EpochStats>) -> Self {
        Self {
            config,
            global_epoch,
            running: Arc::new(AtomicBool::new(false)),
            stats,
            handle: Mutex::new(None),
        }
    }

    /// Whether the driver loop is live.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// The configured tick interval.
    pub fn epoch_length(&self) -> Duration {
        self.config.epoch_length
    }

    /// Start the driver thread.
    ///
    /// Returns `false` when the driver is already running.
    pub fn start(&self) -> bool {
        if self.running.swap(true, Ordering::AcqRel) {
            return false;
        }

        if tracing::enabled!(tracing::Level::INFO) {
            tracing::info!(
                epoch_length_ms = self.config.epoch_length.as_millis() as u64,
                "epoch driver started"
            );
        }

        let running = Arc::clone(&self.running);
        let global_epoch = Arc::clone(&self.global_epoch);
        let stats = Arc::clone(&self.stats);
        let epoch_length = self.config.epoch_length;

        let handle = thread::spawn(move || {
            Self::driver_loop(running, global_epoch, stats, epoch_length);
        });
        *self.handle.lock() = Some(handle);

        true
    }

    /// Stop the driver and wait for the thread to exit.
    ///
    /// A no-op while stopped.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);

        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
            if tracing::enabled!(tracing::Level::INFO) {
                tracing::info!("epoch driver stopped");
            }
        }
    }

    fn driver_loop(
        running: Arc<AtomicBool>,
        global_epoch: Arc<AtomicU64>,
        stats: Arc<EpochStats>,
        epoch_length: Duration,
    ) {
        while running.load(Ordering::Acquire) {
            thread::sleep(epoch_length);
            if !running.load(Ordering::Acquire) {
                break;
            }
            global_epoch.fetch_add(1, Ordering::AcqRel);
            stats.record_tick();
        }
    }
}

impl Drop for EpochDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
