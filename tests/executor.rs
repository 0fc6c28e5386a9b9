//! Integration tests for the executor: dispatch, stealing, worker release
//! and teardown.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use jobforge::{Counter, Error, Executor, PinningStrategy};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn zero_threads_is_rejected() {
    match Executor::new(0) {
        Err(Error::ZeroThreads) => {}
        other => panic!("expected ZeroThreads, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn four_hundred_jobs_on_four_threads() {
    init_logs();
    let executor = Executor::new(4).unwrap();
    assert_eq!(executor.thread_count(), 4);

    let hits = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(Counter::new(400));

    for _ in 0..400 {
        let hits = hits.clone();
        let done = done.clone();
        executor
            .execute(move || {
                hits.fetch_add(1, Ordering::SeqCst);
                done.decrement_and_notify_one();
            })
            .unwrap();
    }

    done.wait();
    assert_eq!(hits.load(Ordering::SeqCst), 400);
    assert_eq!(executor.stats().jobs_executed(), 400);
}

#[test]
fn idle_worker_steals_from_blocked_queue() {
    let executor = Executor::new(2).unwrap();
    let done = Arc::new(Counter::new(101));

    // The first submission lands on queue 0 and occupies its worker.
    let blocker_done = done.clone();
    executor
        .execute(move || {
            thread::sleep(Duration::from_millis(200));
            blocker_done.decrement_and_notify_one();
        })
        .unwrap();

    // Round-robin spreads the rest evenly; queue 0's share piles up behind
    // the blocker until worker 1 comes to steal it.
    for _ in 0..100 {
        let done = done.clone();
        executor
            .execute(move || {
                done.decrement_and_notify_one();
            })
            .unwrap();
    }

    done.wait();
    let stats = executor.stats();
    assert!(stats.steals() >= 1, "expected at least one steal: {stats:?}");
    for queue in &stats.queues {
        assert!(queue.executed > 0, "queue {} never executed", queue.index);
    }
}

#[test]
fn release_lets_single_queue_keep_draining() {
    let executor = Executor::new(1).unwrap();
    let done = Arc::new(Counter::new(2));
    let b_done = Arc::new(AtomicBool::new(false));
    let a_observed_b = Arc::new(AtomicBool::new(false));

    {
        let done = done.clone();
        let b_done = b_done.clone();
        let a_observed_b = a_observed_b.clone();
        executor
            .execute(move || {
                Executor::release_current_worker_thread().unwrap();

                // Submitted after the release: a replacement worker now
                // drives the single queue, so this job runs while we spin.
                let handle = Executor::current().unwrap();
                let inner_done = done.clone();
                let inner_b_done = b_done.clone();
                handle
                    .execute(move || {
                        inner_b_done.store(true, Ordering::SeqCst);
                        inner_done.decrement_and_notify_one();
                    })
                    .unwrap();

                let deadline = Instant::now() + Duration::from_secs(2);
                while !b_done.load(Ordering::SeqCst) && Instant::now() < deadline {
                    thread::sleep(Duration::from_millis(1));
                }
                a_observed_b.store(b_done.load(Ordering::SeqCst), Ordering::SeqCst);
                done.decrement_and_notify_one();
            })
            .unwrap();
    }

    done.wait();
    assert!(
        a_observed_b.load(Ordering::SeqCst),
        "the released worker's queue was not adopted"
    );
}

#[test]
fn release_does_not_stall_other_queues() {
    let executor = Executor::new(2).unwrap();
    let done = Arc::new(Counter::new(41));

    {
        let done = done.clone();
        executor
            .execute(move || {
                Executor::release_current_worker_thread().unwrap();
                thread::sleep(Duration::from_millis(150));
                done.decrement_and_notify_one();
            })
            .unwrap();
    }

    let start = Instant::now();
    let quick = Arc::new(AtomicUsize::new(0));
    for _ in 0..40 {
        let done = done.clone();
        let quick = quick.clone();
        executor
            .execute(move || {
                quick.fetch_add(1, Ordering::SeqCst);
                done.decrement_and_notify_one();
            })
            .unwrap();
    }

    // The short jobs must all finish while the long job is still sleeping.
    while quick.load(Ordering::SeqCst) < 40 {
        assert!(
            start.elapsed() < Duration::from_millis(140),
            "short jobs stalled behind a released worker"
        );
        thread::sleep(Duration::from_millis(1));
    }

    done.wait();
}

#[test]
fn release_twice_in_one_job_fails() {
    let executor = Executor::new(1).unwrap();
    let done = Arc::new(Counter::new(1));
    let second = Arc::new(AtomicBool::new(false));

    {
        let done = done.clone();
        let second = second.clone();
        executor
            .execute(move || {
                Executor::release_current_worker_thread().unwrap();
                second.store(
                    Executor::release_current_worker_thread()
                        == Err(Error::WorkerAlreadyReleased),
                    Ordering::SeqCst,
                );
                done.decrement_and_notify_one();
            })
            .unwrap();
    }

    done.wait();
    assert!(second.load(Ordering::SeqCst));
}

#[test]
fn release_off_worker_fails() {
    assert_eq!(
        Executor::release_current_worker_thread(),
        Err(Error::NotWorkerThread)
    );
}

#[test]
fn current_executor_is_visible_inside_jobs_only() {
    assert!(Executor::current().is_none());

    let executor = Executor::new(3).unwrap();
    let done = Arc::new(Counter::new(1));
    let seen_threads = Arc::new(AtomicUsize::new(0));

    {
        let done = done.clone();
        let seen_threads = seen_threads.clone();
        executor
            .execute(move || {
                if let Some(handle) = Executor::current() {
                    seen_threads.store(handle.thread_count(), Ordering::SeqCst);
                }
                done.decrement_and_notify_one();
            })
            .unwrap();
    }

    done.wait();
    assert_eq!(seen_threads.load(Ordering::SeqCst), 3);
}

#[test]
fn pinned_workers_execute_jobs() {
    let executor = Executor::with_pinning(2, PinningStrategy::Linear).unwrap();
    let done = Arc::new(Counter::new(32));

    for _ in 0..32 {
        let done = done.clone();
        executor
            .execute(move || {
                done.decrement_and_notify_one();
            })
            .unwrap();
    }

    done.wait();
}

#[test]
fn panicking_job_is_swallowed_and_freed() {
    init_logs();
    let executor = Executor::new(2).unwrap();
    let witness = Arc::new(());

    {
        let captured = witness.clone();
        executor
            .execute(move || {
                let _keep = &captured;
                panic!("deliberate test panic");
            })
            .unwrap();
    }

    // The pool keeps working after the panic.
    let done = Arc::new(Counter::new(20));
    for _ in 0..20 {
        let done = done.clone();
        executor
            .execute(move || {
                done.decrement_and_notify_one();
            })
            .unwrap();
    }
    done.wait();

    drop(executor);
    // The panicking job's captures were dropped exactly once.
    assert_eq!(Arc::strong_count(&witness), 1);
}

#[test]
fn teardown_frees_pending_jobs() {
    let executor = Executor::new(1).unwrap();
    let witness = Arc::new(());
    let executed = Arc::new(AtomicUsize::new(0));

    // Occupy the single worker so submissions pile up.
    executor
        .execute(|| thread::sleep(Duration::from_millis(100)))
        .unwrap();

    for _ in 0..1000 {
        let captured = witness.clone();
        let executed = executed.clone();
        executor
            .execute(move || {
                let _keep = &captured;
                executed.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    drop(executor);

    // Every pending job was freed via its origin queue without leaking its
    // captures; none of them runs after teardown.
    assert_eq!(Arc::strong_count(&witness), 1);
    assert!(executed.load(Ordering::SeqCst) <= 1000);
}

#[test]
fn handle_outlives_jobs_but_not_the_pool() {
    let executor = Executor::new(2).unwrap();
    let done = Arc::new(Counter::new(1));
    let chained = Arc::new(AtomicBool::new(false));

    {
        let done = done.clone();
        let chained = chained.clone();
        executor
            .execute(move || {
                // Chain a second job through the handle.
                let handle = Executor::current().unwrap();
                let done = done.clone();
                let chained = chained.clone();
                handle
                    .execute(move || {
                        chained.store(true, Ordering::SeqCst);
                        done.decrement_and_notify_one();
                    })
                    .unwrap();
            })
            .unwrap();
    }

    done.wait();
    assert!(chained.load(Ordering::SeqCst));
}

mod engine {
    use super::*;
    use jobforge::engine;

    // The engine is process-global state, so its whole lifecycle lives in a
    // single test.
    #[test]
    fn lifecycle() {
        assert_eq!(engine::thread_count(), Err(Error::EngineNotInitialized));
        assert_eq!(engine::cleanup(), Err(Error::EngineNotInitialized));
        assert_eq!(
            engine::execute(|| {}),
            Err(Error::EngineNotInitialized)
        );

        engine::initialize(2).unwrap();
        assert_eq!(engine::initialize(2), Err(Error::EngineAlreadyInitialized));
        assert_eq!(engine::thread_count(), Ok(2));

        let done = Arc::new(Counter::new(10));
        for _ in 0..10 {
            let done = done.clone();
            engine::execute(move || {
                done.decrement_and_notify_one();
            })
            .unwrap();
        }
        done.wait();

        engine::cleanup().unwrap();
        assert_eq!(engine::thread_count(), Err(Error::EngineNotInitialized));

        // Re-initialization after cleanup is allowed.
        engine::initialize_default().unwrap();
        assert!(engine::thread_count().unwrap() >= 1);
        engine::cleanup().unwrap();
    }
}
