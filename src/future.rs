//! Single-slot value handoff.

use std::ops::Deref;

use parking_lot::{Condvar, Mutex, MutexGuard};

struct Slot<T> {
    value: T,
    set: bool,
}

/// A reusable single-slot handoff cell.
///
/// A producer stores a value with `set_and_notify_one`/`all`; a consumer
/// blocks in `wait` and receives a guard that dereferences to the value.
/// The `set` flag is cleared before the guard is handed out, so the same
/// pair can reuse the cell in strict producer/consumer turns. This is not a
/// multi-consumer broadcast: each stored value is consumed by exactly one
/// `wait`.
pub struct FutureCell<T> {
    slot: Mutex<Slot<T>>,
    cond: Condvar,
}

impl<T: Default> FutureCell<T> {
    /// Creates an empty cell holding `T::default()` as its unset content.
    pub fn new() -> Self {
        FutureCell::with_value(T::default())
    }
}

impl<T> FutureCell<T> {
    /// Creates a cell seeded with `value`. The seed is only the initial slot
    /// content: `wait` still blocks until a producer stores a value.
    pub fn with_value(value: T) -> Self {
        FutureCell {
            slot: Mutex::new(Slot { value, set: false }),
            cond: Condvar::new(),
        }
    }

    /// Stores a value and wakes one waiter.
    pub fn set_and_notify_one(&self, value: T) {
        self.store(value);
        self.cond.notify_one();
    }

    /// Stores a value and wakes all waiters; exactly one consumes it.
    pub fn set_and_notify_all(&self, value: T) {
        self.store(value);
        self.cond.notify_all();
    }

    /// Blocks until a value has been stored, consumes the `set` flag and
    /// returns a guard dereferencing to the value.
    ///
    /// The guard holds the cell's lock, so a producer storing the next value
    /// blocks until the guard is dropped.
    pub fn wait(&self) -> FutureGuard<'_, T> {
        let mut slot = self.slot.lock();
        while !slot.set {
            self.cond.wait(&mut slot);
        }
        slot.set = false;
        FutureGuard { slot }
    }

    fn store(&self, value: T) {
        let mut slot = self.slot.lock();
        slot.value = value;
        slot.set = true;
    }
}

impl<T: Default> Default for FutureCell<T> {
    fn default() -> Self {
        FutureCell::new()
    }
}

/// Read access to a consumed value; holds the cell's lock while alive.
pub struct FutureGuard<'a, T> {
    slot: MutexGuard<'a, Slot<T>>,
}

impl<T> Deref for FutureGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.slot.value
    }
}
