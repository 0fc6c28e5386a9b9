//! Executor observability counters.

/// Point-in-time counters for one queue.
#[derive(Debug, Clone, Copy)]
pub struct QueueStats {
    /// Queue index, stable for the executor's lifetime.
    pub index: usize,
    /// Jobs executed by the worker driving this queue, stolen jobs
    /// included.
    pub executed: u64,
    /// Successful steal operations that moved jobs *into* this queue.
    pub steals: u64,
}

/// Snapshot of an executor's per-queue counters.
///
/// Counters are updated with relaxed atomics; a snapshot taken while jobs
/// run is approximate, one taken at a quiescent point is exact.
#[derive(Debug, Clone)]
pub struct ExecutorStats {
    pub queues: Vec<QueueStats>,
}

impl ExecutorStats {
    /// Total jobs executed across all queues.
    pub fn jobs_executed(&self) -> u64 {
        self.queues.iter().map(|q| q.executed).sum()
    }

    /// Total successful steal operations.
    pub fn steals(&self) -> u64 {
        self.queues.iter().map(|q| q.steals).sum()
    }
}
