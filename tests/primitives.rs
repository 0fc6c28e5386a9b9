//! Integration tests combining the executor with the signaling primitives.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use jobforge::{Counter, Event, Executor, FutureCell, IsEqualTo, Semaphore};

#[test]
fn counter_gates_on_batch_completion() {
    let executor = Executor::new(4).unwrap();
    let done = Arc::new(Counter::new(64));
    let sum = Arc::new(AtomicUsize::new(0));

    for i in 0..64usize {
        let done = done.clone();
        let sum = sum.clone();
        executor
            .execute(move || {
                sum.fetch_add(i, Ordering::SeqCst);
                done.decrement_and_notify_one();
            })
            .unwrap();
    }

    done.wait();
    assert_eq!(sum.load(Ordering::SeqCst), (0..64).sum());
}

#[test]
fn counter_counts_up_to_target() {
    let executor = Executor::new(2).unwrap();
    let reached = Arc::new(Counter::with_predicate(0, IsEqualTo(10)));

    for _ in 0..10 {
        let reached = reached.clone();
        executor
            .execute(move || {
                reached.increment_and_notify_all();
            })
            .unwrap();
    }

    reached.wait();
    assert_eq!(reached.get(), 10);
}

#[test]
fn event_signals_single_completion() {
    let executor = Executor::new(2).unwrap();
    let event = Arc::new(Event::new());

    {
        let event = event.clone();
        executor
            .execute(move || {
                event.set_and_notify_one();
            })
            .unwrap();
    }

    event.wait();
}

#[test]
fn future_cell_returns_job_results_in_turns() {
    let executor = Executor::new(2).unwrap();
    let cell = Arc::new(FutureCell::<u64>::new());

    for round in 0..5u64 {
        let cell_for_job = cell.clone();
        executor
            .execute(move || {
                cell_for_job.set_and_notify_one(round * round);
            })
            .unwrap();

        // Strict turns: consume each result before producing the next.
        let value = cell.wait();
        assert_eq!(*value, round * round);
    }
}

#[test]
fn semaphore_bounds_in_flight_jobs() {
    let executor = Executor::new(4).unwrap();
    let permits = Arc::new(Semaphore::new(2));
    let done = Arc::new(Counter::new(16));
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    for _ in 0..16 {
        let permits = permits.clone();
        let done = done.clone();
        let active = active.clone();
        let peak = peak.clone();
        executor
            .execute(move || {
                permits.acquire();
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(2));
                active.fetch_sub(1, Ordering::SeqCst);
                permits.release();
                done.decrement_and_notify_one();
            })
            .unwrap();
    }

    done.wait();
    assert!(peak.load(Ordering::SeqCst) <= 2);
}
