//! Benchmarks for epoch enter/exit and watermark reduction.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};

use oxiepoch::epoch::{DecentralizedEpochManager, EpochConfig};

/// Benchmark a single thread's enter/exit pair on the fast path.
fn bench_enter_exit(c: &mut Criterion) {
    let mut group = c.benchmark_group("enter_exit");
    group.throughput(Throughput::Elements(1));

    let manager = DecentralizedEpochManager::new(EpochConfig::default());
    manager.register_thread(0);

    group.bench_function("single_thread", |b| {
        b.iter(|| {
            let txn = manager.enter(black_box(0));
            manager.exit(0, txn);
        })
    });

    group.bench_function("guard", |b| {
        b.iter(|| {
            let guard = manager.enter_guard(black_box(0));
            black_box(guard.txn_id());
        })
    });

    group.finish();
}

/// Benchmark the watermark reduction over idle and busy registries.
fn bench_global_tail(c: &mut Criterion) {
    let mut group = c.benchmark_group("global_tail_epoch");

    let manager = DecentralizedEpochManager::new(EpochConfig::default());
    for thread_id in 0..16 {
        manager.register_thread(thread_id);
    }

    group.bench_function("idle_16_threads", |b| {
        b.iter(|| black_box(manager.global_tail_epoch()))
    });

    group.finish();
}

/// Benchmark enter/exit with a running driver and contending workers.
fn bench_concurrent(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent");
    group.throughput(Throughput::Elements(1));
    group.measurement_time(Duration::from_secs(5));

    let manager = Arc::new(DecentralizedEpochManager::new(
        EpochConfig::new().with_epoch_length(Duration::from_millis(1)),
    ));
    manager.start();
    manager.register_thread(0);

    // Background load: three workers churning their own contexts.
    let background: Vec<_> = (1..4)
        .map(|thread_id| {
            let manager = Arc::clone(&manager);
            manager.register_thread(thread_id);
            thread::spawn(move || {
                while manager.is_running() {
                    let txn = manager.enter(thread_id);
                    manager.exit(thread_id, txn);
                }
            })
        })
        .collect();

    group.bench_function("enter_exit_under_load", |b| {
        b.iter(|| {
            let txn = manager.enter(black_box(0));
            manager.exit(0, txn);
        })
    });

    group.finish();

    manager.stop();
    for handle in background {
        let _ = handle.join();
    }
}

criterion_group!(benches, bench_enter_exit, bench_global_tail, bench_concurrent);
criterion_main!(benches);
