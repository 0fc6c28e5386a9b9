//! # jobforge: work-stealing job execution and deadlock-avoiding locks
//!
//! A library of concurrency primitives built around two cores:
//!
//! - An [`Executor`] that dispatches jobs across a fixed pool of worker
//!   threads, allocates job memory from per-queue pools, load-balances by
//!   stealing, and lets a long-running job *release* its worker slot so the
//!   pool is transparently replenished
//!   ([`Executor::release_current_worker_thread`]).
//! - A [`DeadlockFreeMutex`] whose acquisition protocol enforces a global
//!   lock order (by address) on the fly, unlocking and relocking
//!   conflicting held locks to break potential cycles.
//!
//! Completion signaling uses the bundled primitives: a predicate-gated
//! [`Counter`], an auto-reset [`Event`], a [`FutureCell`] handoff slot and
//! a counting [`Semaphore`].
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use jobforge::{Counter, Executor};
//!
//! let executor = Executor::new(4)?;
//! let done = Arc::new(Counter::new(100));
//!
//! for _ in 0..100 {
//!     let done = done.clone();
//!     executor.execute(move || {
//!         // ... work ...
//!         done.decrement_and_notify_one();
//!     })?;
//! }
//!
//! done.wait();
//! # Ok::<(), jobforge::Error>(())
//! ```

pub mod counter;
pub mod engine;
pub mod error;
pub mod event;
pub mod executor;
pub mod future;
pub mod metrics;
pub mod mutex;
pub mod semaphore;

mod job;
mod pool;
mod queue;
mod worker;

pub use counter::{Counter, CounterPredicate, IsEqualTo, IsZero};
pub use error::Error;
pub use event::Event;
pub use executor::{Executor, ExecutorHandle, PinningStrategy};
pub use future::{FutureCell, FutureGuard};
pub use metrics::{ExecutorStats, QueueStats};
pub use mutex::{DeadlockFreeGuard, DeadlockFreeMutex};
pub use semaphore::Semaphore;
