//! Predicate-gated synchronized counter.
//!
//! Counters are the completion-signaling primitive of the executor's public
//! surface: jobs decrement, a coordinating thread waits until a predicate
//! over the value holds. The plain mutators are lock-free; the
//! `*_and_notify_*` variants take the internal mutex so a waiter can never
//! miss the wakeup for the mutation that satisfied its predicate.

use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::{Condvar, Mutex};

/// Predicate evaluated against the counter value after each notifying
/// mutation and by every waiter.
pub trait CounterPredicate {
    /// Returns true if the value is one a waiter should wake for.
    fn test(&self, value: i64) -> bool;
}

/// The default predicate: the counter reached zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct IsZero;

impl CounterPredicate for IsZero {
    fn test(&self, value: i64) -> bool {
        value == 0
    }
}

/// Predicate testing the counter against a fixed target value.
#[derive(Debug, Clone, Copy)]
pub struct IsEqualTo(pub i64);

impl CounterPredicate for IsEqualTo {
    fn test(&self, value: i64) -> bool {
        value == self.0
    }
}

impl<F> CounterPredicate for F
where
    F: Fn(i64) -> bool,
{
    fn test(&self, value: i64) -> bool {
        self(value)
    }
}

/// A synchronized counter with a wait predicate.
///
/// Waiters are level-sensitive: `wait` returns once the predicate has been
/// observed true; by the time the caller runs again the value may already
/// have moved on.
pub struct Counter<P: CounterPredicate = IsZero> {
    value: AtomicI64,
    pred: P,
    lock: Mutex<()>,
    cond: Condvar,
}

impl Counter<IsZero> {
    /// Creates a counter that reports completion when the value reaches zero.
    pub fn new(initial: i64) -> Self {
        Counter::with_predicate(initial, IsZero)
    }
}

impl<P: CounterPredicate> Counter<P> {
    /// Creates a counter with a caller-supplied predicate.
    pub fn with_predicate(initial: i64, pred: P) -> Self {
        Counter {
            value: AtomicI64::new(initial),
            pred,
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    /// Returns the current value.
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Increments without notifying. The caller is responsible for waking
    /// waiters if it made the predicate true.
    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements without notifying.
    pub fn decrement(&self) {
        self.value.fetch_sub(1, Ordering::AcqRel);
    }

    /// Increments and wakes one waiter if the new value satisfies the
    /// predicate.
    pub fn increment_and_notify_one(&self) {
        let value = self.mutate(1);
        if self.pred.test(value) {
            self.cond.notify_one();
        }
    }

    /// Increments and wakes all waiters if the new value satisfies the
    /// predicate.
    pub fn increment_and_notify_all(&self) {
        let value = self.mutate(1);
        if self.pred.test(value) {
            self.cond.notify_all();
        }
    }

    /// Decrements and wakes one waiter if the new value satisfies the
    /// predicate.
    pub fn decrement_and_notify_one(&self) {
        let value = self.mutate(-1);
        if self.pred.test(value) {
            self.cond.notify_one();
        }
    }

    /// Decrements and wakes all waiters if the new value satisfies the
    /// predicate.
    pub fn decrement_and_notify_all(&self) {
        let value = self.mutate(-1);
        if self.pred.test(value) {
            self.cond.notify_all();
        }
    }

    /// Blocks until the predicate has been observed true.
    pub fn wait(&self) {
        let mut guard = self.lock.lock();
        while !self.pred.test(self.value.load(Ordering::Acquire)) {
            self.cond.wait(&mut guard);
        }
    }

    // Notifying mutations happen under the mutex the condvar binds to, so a
    // waiter holding the mutex either sees the new value or is already in
    // wait() when the notify fires.
    fn mutate(&self, delta: i64) -> i64 {
        let _guard = self.lock.lock();
        self.value.fetch_add(delta, Ordering::AcqRel) + delta
    }
}
