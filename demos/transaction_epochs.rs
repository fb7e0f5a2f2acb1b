//! Transaction epoch walkthrough.
//!
//! Demonstrates registering workers, fused transaction-id issuance, and
//! how a long-running transaction pins the reclamation watermark.
//!
//! Run: cargo run --example transaction_epochs

use std::thread;
use std::time::Duration;

use oxiepoch::epoch::{DecentralizedEpochManager, EpochConfig};

fn main() {
    let manager = DecentralizedEpochManager::new(
        EpochConfig::new().with_epoch_length(Duration::from_millis(10)),
    );
    manager.start();

    println!("global epoch: {}", manager.current_global_epoch());

    manager.register_thread(1);
    manager.register_thread(2);

    // A transaction id carries the epoch at start in its high half.
    let txn = manager.enter(1);
    println!(
        "issued {} (epoch {}, sequence {})",
        txn,
        txn.epoch_id(),
        txn.sequence()
    );

    // While the transaction is live, the watermark stays below its epoch.
    thread::sleep(Duration::from_millis(50));
    println!("global epoch after 5 ticks: {}", manager.current_global_epoch());
    println!("watermark while pinned: {}", manager.global_tail_epoch());

    // A second worker transacting freely does not move the watermark.
    for _ in 0..3 {
        let other = manager.enter(2);
        manager.exit(2, other);
    }
    println!("watermark still pinned: {}", manager.global_tail_epoch());

    // Releasing the long transaction lets the horizon catch up.
    manager.exit(1, txn);
    println!("watermark after release: {}", manager.global_tail_epoch());

    // The guard form pairs enter and exit automatically.
    {
        let guard = manager.enter_guard(2);
        println!("guarded transaction: {}", guard.txn_id());
    }

    manager.deregister_thread(1);
    manager.deregister_thread(2);
    manager.stop();

    println!(
        "stats: {} enters, {} exits, {} ticks",
        manager
            .stats()
            .enters
            .load(std::sync::atomic::Ordering::Relaxed),
        manager
            .stats()
            .exits
            .load(std::sync::atomic::Ordering::Relaxed),
        manager
            .stats()
            .ticks
            .load(std::sync::atomic::Ordering::Relaxed),
    );
}
