//! Reclamation watermark consumer.
//!
//! Simulates the reclaimer side: a version store tags garbage with the
//! epoch that retired it and frees entries once the watermark passes them.
//!
//! Run: cargo run --example reclamation_watermark

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use oxiepoch::epoch::{DecentralizedEpochManager, EpochConfig};

/// A retired version: reclaimable once the watermark reaches its epoch.
struct Retired {
    epoch: u64,
    payload: String,
}

fn main() {
    let manager = Arc::new(DecentralizedEpochManager::new(
        EpochConfig::new().with_epoch_length(Duration::from_millis(5)),
    ));
    manager.start();

    let workers: Vec<_> = (0..4)
        .map(|thread_id| {
            let manager = Arc::clone(&manager);
            manager.register_thread(thread_id);
            thread::spawn(move || {
                for i in 0..50 {
                    let txn = manager.enter(thread_id);
                    if i % 10 == 0 {
                        // A slow transaction holds its epoch for a while.
                        thread::sleep(Duration::from_millis(10));
                    }
                    manager.exit(thread_id, txn);
                }
            })
        })
        .collect();

    // Reclaimer loop: retire garbage stamped with the current epoch, free
    // everything at or below the watermark.
    let mut garbage: VecDeque<Retired> = VecDeque::new();
    let mut freed = 0usize;

    for round in 0..20 {
        garbage.push_back(Retired {
            epoch: manager.current_global_epoch(),
            payload: format!("undo buffer {round}"),
        });

        let watermark = manager.global_tail_epoch();
        while garbage
            .front()
            .is_some_and(|retired| retired.epoch <= watermark)
        {
            let retired = garbage.pop_front().expect("non-empty queue");
            println!(
                "freeing '{}' (epoch {} <= watermark {})",
                retired.payload, retired.epoch, watermark
            );
            freed += 1;
        }

        thread::sleep(Duration::from_millis(5));
    }

    for handle in workers {
        handle.join().unwrap();
    }

    // With all workers quiesced, one more reduction drains the queue.
    let watermark = manager.global_tail_epoch();
    freed += garbage.iter().filter(|r| r.epoch <= watermark).count();
    println!("freed {freed} of 20 retired entries");

    for thread_id in 0..4 {
        manager.deregister_thread(thread_id);
    }
    manager.stop();
}
