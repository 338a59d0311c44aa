//! Benchmarks for SPSC ring performance.
//!
//! Compares the indexed and sentinel rings against crossbeam-queue's ArrayQueue.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use crossbeam_queue::ArrayQueue;
use nexus_ring::{indexed, sentinel};
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, Copy, Default)]
struct Medium([u64; 16]); // 128 bytes

// ============================================================================
// Single-threaded latency benchmarks
// ============================================================================

fn bench_single_thread_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread_latency");

    group.bench_function("indexed_heap/u64", |b| {
        let (mut tx, mut rx) = indexed::heap::<u64>(1024).unwrap();
        b.iter(|| {
            tx.try_push(black_box(42)).unwrap();
            black_box(rx.try_pop().unwrap())
        });
    });

    group.bench_function("indexed_inline/u64", |b| {
        let (mut tx, mut rx) = indexed::inline::<u64, 1024>().unwrap();
        b.iter(|| {
            tx.try_push(black_box(42)).unwrap();
            black_box(rx.try_pop().unwrap())
        });
    });

    group.bench_function("sentinel/u64", |b| {
        let (mut tx, mut rx) = sentinel::queue::<u64, 1023>();
        b.iter(|| {
            tx.try_push(black_box(42)).unwrap();
            black_box(rx.try_pop().unwrap())
        });
    });

    group.bench_function("crossbeam_array/u64", |b| {
        let q = ArrayQueue::<u64>::new(1024);
        b.iter(|| {
            q.push(black_box(42)).unwrap();
            black_box(q.pop().unwrap())
        });
    });

    group.bench_function("indexed_heap/128b", |b| {
        let (mut tx, mut rx) = indexed::heap::<Medium>(1024).unwrap();
        let msg = Medium([0; 16]);
        b.iter(|| {
            tx.try_push(black_box(msg)).unwrap();
            black_box(rx.try_pop().unwrap())
        });
    });

    group.bench_function("crossbeam_array/128b", |b| {
        let q = ArrayQueue::<Medium>::new(1024);
        let msg = Medium([0; 16]);
        b.iter(|| {
            q.push(black_box(msg)).unwrap();
            black_box(q.pop().unwrap())
        });
    });

    group.finish();
}

// ============================================================================
// Throughput benchmarks (burst push then pop)
// ============================================================================

fn bench_burst_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("burst_throughput");

    for batch_size in [100u64, 1000] {
        group.throughput(Throughput::Elements(batch_size));

        group.bench_with_input(
            BenchmarkId::new("indexed_heap", batch_size),
            &batch_size,
            |b, &n| {
                let (mut tx, mut rx) = indexed::heap::<u64>(2048).unwrap();
                b.iter(|| {
                    for i in 1..=n {
                        tx.try_push(black_box(i)).unwrap();
                    }
                    for _ in 0..n {
                        black_box(rx.try_pop().unwrap());
                    }
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("sentinel", batch_size),
            &batch_size,
            |b, &n| {
                let (mut tx, mut rx) = sentinel::queue::<u64, 2047>();
                b.iter(|| {
                    for i in 1..=n {
                        tx.try_push(black_box(i)).unwrap();
                    }
                    for _ in 0..n {
                        black_box(rx.try_pop().unwrap());
                    }
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("crossbeam_array", batch_size),
            &batch_size,
            |b, &n| {
                let q = ArrayQueue::<u64>::new(2048);
                b.iter(|| {
                    for i in 1..=n {
                        q.push(black_box(i)).unwrap();
                    }
                    for _ in 0..n {
                        black_box(q.pop().unwrap());
                    }
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// Cross-thread throughput
// ============================================================================

const CROSS_THREAD_COUNT: u64 = 100_000;

fn bench_cross_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("cross_thread");
    group.throughput(Throughput::Elements(CROSS_THREAD_COUNT));
    group.sample_size(20);

    group.bench_function("indexed_heap", |b| {
        b.iter(|| {
            let (mut tx, mut rx) = indexed::heap::<u64>(1024).unwrap();
            let producer = thread::spawn(move || {
                for i in 1..=CROSS_THREAD_COUNT {
                    tx.push(i);
                }
            });
            for _ in 0..CROSS_THREAD_COUNT {
                black_box(rx.pop());
            }
            producer.join().unwrap();
        });
    });

    group.bench_function("sentinel", |b| {
        b.iter(|| {
            let (mut tx, mut rx) = sentinel::queue::<u64, 1023>();
            let producer = thread::spawn(move || {
                for i in 1..=CROSS_THREAD_COUNT {
                    tx.push(i).unwrap();
                }
            });
            while let Some(v) = rx.pop() {
                black_box(v);
            }
            producer.join().unwrap();
        });
    });

    group.bench_function("crossbeam_array", |b| {
        b.iter(|| {
            let q = Arc::new(ArrayQueue::<u64>::new(1024));
            let q_producer = Arc::clone(&q);
            let producer = thread::spawn(move || {
                for i in 1..=CROSS_THREAD_COUNT {
                    while q_producer.push(i).is_err() {
                        std::hint::spin_loop();
                    }
                }
            });
            let mut received = 0;
            while received < CROSS_THREAD_COUNT {
                if let Some(v) = q.pop() {
                    black_box(v);
                    received += 1;
                }
            }
            producer.join().unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_thread_latency,
    bench_burst_throughput,
    bench_cross_thread
);
criterion_main!(benches);
