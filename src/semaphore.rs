//! Counting semaphore.

use parking_lot::{Condvar, Mutex};

/// A counting semaphore over a non-negative resource count.
///
/// `wait`/`acquire` block while the count is zero, then take one unit.
/// Underflow is impossible by construction: the count is only decremented
/// after it has been observed non-zero under the lock.
pub struct Semaphore {
    value: Mutex<usize>,
    cond: Condvar,
}

impl Semaphore {
    /// Creates a semaphore holding `value` units.
    pub fn new(value: usize) -> Self {
        Semaphore {
            value: Mutex::new(value),
            cond: Condvar::new(),
        }
    }

    /// Adds `n` units and wakes one waiter.
    pub fn set_and_notify_one(&self, n: usize) {
        *self.value.lock() += n;
        self.cond.notify_one();
    }

    /// Adds `n` units and wakes all waiters.
    pub fn set_and_notify_all(&self, n: usize) {
        *self.value.lock() += n;
        self.cond.notify_all();
    }

    /// Blocks until a unit is available, then takes it.
    pub fn wait(&self) {
        let mut value = self.value.lock();
        while *value == 0 {
            self.cond.wait(&mut value);
        }
        *value -= 1;
    }

    /// Alias for [`wait`](Self::wait).
    pub fn acquire(&self) {
        self.wait();
    }

    /// Returns one unit; alias for `set_and_notify_one(1)`.
    pub fn release(&self) {
        self.set_and_notify_one(1);
    }
}
