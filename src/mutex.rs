//! Deadlock-avoiding mutex.
//!
//! `DeadlockFreeMutex` imposes a global lock order dynamically, by memory
//! address, instead of asking callers to design one. Each thread keeps an
//! address-ordered multiset of the mutexes it currently holds. When a lock
//! attempt contends, the thread releases every held mutex whose address is
//! above the contended one and reacquires the whole range in ascending
//! order. Any two threads therefore acquire whatever subset they share in
//! the same order, and no wait cycle can form.
//!
//! The price of the recovery protocol is visible to callers: while `lock`
//! is blocked on a contended mutex, unrelated higher-addressed mutexes held
//! by the same thread are transiently unlocked, so invariants they guard
//! may be touched by other threads mid-call. Callers must tolerate this; it
//! is the fundamental trade-off of address-ordered recovery.

use std::cell::RefCell;
use std::marker::PhantomData;

use parking_lot::lock_api::RawReentrantMutex;
use parking_lot::{RawMutex, RawThreadId};

// The underlying lock is reentrant as a defensive choice: recursive locking
// of the same mutex inserts a second held-set entry and a second lock level,
// and both unwind symmetrically.
type RawLock = RawReentrantMutex<RawMutex, RawThreadId>;

thread_local! {
    // Address-ordered multiset of the mutexes this thread holds. Strictly
    // thread-local, so no synchronization; the vector's retained capacity
    // makes steady-state lock/unlock allocation-free.
    static HELD: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

// Inserts keeping ascending order, after any equal entries, and returns the
// insertion index. Entries after it are strictly greater.
fn held_insert(held: &mut Vec<usize>, addr: usize) -> usize {
    let index = held.partition_point(|&a| a <= addr);
    held.insert(index, addr);
    index
}

fn held_remove(held: &mut Vec<usize>, addr: usize) {
    if let Ok(index) = held.binary_search(&addr) {
        held.remove(index);
    } else {
        debug_assert!(false, "unlocked a mutex that is not in the held set");
    }
}

// The held set only ever contains addresses of mutexes this thread has
// locked and not yet unlocked; each such mutex is kept alive by the guard
// borrowing it.
unsafe fn raw_of<'a>(addr: usize) -> &'a RawLock {
    &(*(addr as *const DeadlockFreeMutex)).raw
}

/// A mutex that avoids deadlock by enforcing address order on the fly.
///
/// Threads may nest any number of `DeadlockFreeMutex` locks in any source
/// order; the acquisition protocol breaks potential cycles by unlocking and
/// relocking conflicting held locks (see the module docs for the caller
/// contract this implies). `lock` can still block forever if the caller
/// holds a foreign (non-`DeadlockFreeMutex`) lock across a contended `lock`
/// call.
///
/// The guard returned by [`lock`](Self::lock) is not `Send`: the held set
/// is thread-local, so a lock must be released on the thread that took it.
pub struct DeadlockFreeMutex {
    raw: RawLock,
}

impl DeadlockFreeMutex {
    /// Creates an unlocked mutex.
    pub fn new() -> Self {
        DeadlockFreeMutex { raw: RawLock::INIT }
    }

    fn addr(&self) -> usize {
        self as *const DeadlockFreeMutex as usize
    }

    /// Acquires the mutex, reordering this thread's held locks if needed.
    pub fn lock(&self) -> DeadlockFreeGuard<'_> {
        // Uncontended path: take it and record it.
        if self.raw.try_lock() {
            HELD.with(|held| {
                held_insert(&mut held.borrow_mut(), self.addr());
            });
            return self.guard();
        }

        // Contended: another thread owns the lock and a cycle is possible.
        // Release every held mutex above this one (the potential back
        // edges), then take the whole range [self, ..] in ascending address
        // order.
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            let index = held_insert(&mut held, self.addr());
            for &addr in &held[index + 1..] {
                unsafe { raw_of(addr).unlock() };
            }
            for &addr in &held[index..] {
                unsafe { raw_of(addr) }.lock();
            }
        });
        self.guard()
    }

    /// Attempts to acquire the mutex without blocking on it.
    ///
    /// The recovery step may briefly unlock and then blocking-relock
    /// higher-addressed held mutexes, but never blocks on `self`. On
    /// failure the thread's prior held state is restored exactly.
    pub fn try_lock(&self) -> Option<DeadlockFreeGuard<'_>> {
        let locked = HELD.with(|held| {
            let mut held = held.borrow_mut();
            let index = held_insert(&mut held, self.addr());
            if self.raw.try_lock() {
                return true;
            }

            // Contended: drop the back edges and re-attempt once.
            for &addr in &held[index + 1..] {
                unsafe { raw_of(addr).unlock() };
            }
            let locked = self.raw.try_lock();
            for &addr in &held[index + 1..] {
                unsafe { raw_of(addr) }.lock();
            }
            if !locked {
                held.remove(index);
            }
            locked
        });
        locked.then(|| self.guard())
    }

    fn guard(&self) -> DeadlockFreeGuard<'_> {
        DeadlockFreeGuard {
            mutex: self,
            _not_send: PhantomData,
        }
    }

    fn unlock(&self) {
        // Mirror the lock paths: release the lock level first, then drop
        // the held-set entry.
        unsafe { self.raw.unlock() };
        HELD.with(|held| held_remove(&mut held.borrow_mut(), self.addr()));
    }
}

impl Default for DeadlockFreeMutex {
    fn default() -> Self {
        DeadlockFreeMutex::new()
    }
}

/// Releases one lock level of a [`DeadlockFreeMutex`] on drop.
#[must_use = "the mutex unlocks immediately if the guard is dropped"]
pub struct DeadlockFreeGuard<'a> {
    mutex: &'a DeadlockFreeMutex,
    // The held set lives in this thread's TLS; the guard must not move to
    // another thread.
    _not_send: PhantomData<*const ()>,
}

impl Drop for DeadlockFreeGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}
