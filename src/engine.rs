//! Process-wide execution engine.
//!
//! A thin singleton wrapper around [`Executor`] for programs that want one
//! global pool instead of threading an executor handle through their call
//! graph. The lifecycle is explicit: [`initialize`] (or
//! [`initialize_default`]) before use, [`cleanup`] to stop; misuse is
//! reported as an error rather than left undefined.

use std::thread;

use lazy_static::lazy_static;
use parking_lot::Mutex;

use crate::error::Error;
use crate::executor::Executor;

lazy_static! {
    static ref ENGINE: Mutex<Option<Executor>> = Mutex::new(None);
}

/// Starts the engine with `thread_count` worker threads.
pub fn initialize(thread_count: usize) -> Result<(), Error> {
    let mut slot = ENGINE.lock();
    if slot.is_some() {
        return Err(Error::EngineAlreadyInitialized);
    }
    *slot = Some(Executor::new(thread_count)?);
    Ok(())
}

/// Starts the engine with one worker per available CPU.
pub fn initialize_default() -> Result<(), Error> {
    let threads = thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
    initialize(threads)
}

/// Stops the engine, joining its workers. Pending jobs are discarded. The
/// engine can be re-initialized afterwards.
pub fn cleanup() -> Result<(), Error> {
    let executor = ENGINE.lock().take().ok_or(Error::EngineNotInitialized)?;
    // Dropped outside the slot lock: joining waits on running jobs, and a
    // running job may itself call into the engine.
    drop(executor);
    Ok(())
}

/// Submits a job to the engine's executor.
pub fn execute<F>(func: F) -> Result<(), Error>
where
    F: FnOnce() + Send + 'static,
{
    ENGINE
        .lock()
        .as_ref()
        .ok_or(Error::EngineNotInitialized)?
        .execute(func)
}

/// Number of worker threads, once initialized.
pub fn thread_count() -> Result<usize, Error> {
    ENGINE
        .lock()
        .as_ref()
        .map(Executor::thread_count)
        .ok_or(Error::EngineNotInitialized)
}
