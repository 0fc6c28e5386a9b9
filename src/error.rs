//! Error type shared by the executor, the engine facade and job submission.

use thiserror::Error;

/// Errors reported by the executor and the process-wide engine.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// An executor was requested with zero worker threads.
    #[error("thread count must not be zero")]
    ZeroThreads,

    /// `release_current_worker_thread` was called from a thread that is not
    /// driven by an executor.
    #[error("not called from an executor worker thread")]
    NotWorkerThread,

    /// `release_current_worker_thread` was called twice within the same job.
    #[error("the current worker thread has already been released")]
    WorkerAlreadyReleased,

    /// A queue's job pool could not obtain memory from the system.
    #[error("job pool could not allocate memory")]
    OutOfMemory,

    /// The executor is tearing down and no longer accepts jobs.
    #[error("executor is shutting down")]
    ShuttingDown,

    /// An engine operation was called before `engine::initialize`.
    #[error("execution engine is not initialized")]
    EngineNotInitialized,

    /// `engine::initialize` was called while the engine is already running.
    #[error("execution engine is already initialized")]
    EngineAlreadyInitialized,
}
