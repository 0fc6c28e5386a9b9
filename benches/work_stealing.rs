//! Work-stealing benchmark: imbalanced load.
//!
//! One queue's worker is held by a long job while short jobs pile up behind
//! it; draining time measures how well idle workers steal the backlog.

use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use jobforge::{Counter, Executor};

const SHORT_JOBS: usize = 10_000;

fn bench_imbalanced_drain(c: &mut Criterion) {
    let threads = num_cpus::get().max(2);
    let executor = Executor::new(threads).unwrap();

    let mut group = c.benchmark_group("work_stealing");
    group.sample_size(10);

    group.bench_function(BenchmarkId::new("imbalanced_drain", threads), |b| {
        b.iter(|| {
            let done = Arc::new(Counter::new(SHORT_JOBS as i64 + 1));

            // The blocker pins the first queue's worker.
            let blocker_done = done.clone();
            executor
                .execute(move || {
                    std::thread::sleep(Duration::from_millis(5));
                    blocker_done.decrement_and_notify_one();
                })
                .unwrap();

            for _ in 0..SHORT_JOBS {
                let done = done.clone();
                executor
                    .execute(move || {
                        std::hint::black_box(1u64.wrapping_mul(31));
                        done.decrement_and_notify_one();
                    })
                    .unwrap();
            }

            done.wait();
        })
    });

    group.finish();

    let stats = executor.stats();
    eprintln!(
        "executed {} jobs, {} steals",
        stats.jobs_executed(),
        stats.steals()
    );
}

criterion_group!(benches, bench_imbalanced_drain);
criterion_main!(benches);
