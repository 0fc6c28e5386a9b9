//! Auto-reset event latch.

use parking_lot::{Condvar, Mutex};

/// A boolean latch with auto-reset semantics.
///
/// `wait` blocks until the flag is true and consumes it on the way out, so
/// one signal wakes exactly one waiter even under `set_and_notify_all`: the
/// losers observe `false` again and go back to waiting.
pub struct Event {
    value: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    /// Creates an unsignaled event.
    pub fn new() -> Self {
        Event::with_value(false)
    }

    /// Creates an event with an explicit initial state.
    pub fn with_value(value: bool) -> Self {
        Event {
            value: Mutex::new(value),
            cond: Condvar::new(),
        }
    }

    /// Signals the event and wakes one waiter.
    pub fn set_and_notify_one(&self) {
        *self.value.lock() = true;
        self.cond.notify_one();
    }

    /// Signals the event and wakes all waiters. Exactly one of them consumes
    /// the signal.
    pub fn set_and_notify_all(&self) {
        *self.value.lock() = true;
        self.cond.notify_all();
    }

    /// Blocks until the event is signaled, then resets it.
    pub fn wait(&self) {
        let mut value = self.value.lock();
        while !*value {
            self.cond.wait(&mut value);
        }
        *value = false;
    }
}

impl Default for Event {
    fn default() -> Self {
        Event::new()
    }
}
