//! Per-worker job queue.
//!
//! Each queue owns a mutex-guarded deque of job handles plus the pool the
//! jobs' cells are carved from, a condvar its worker waits on, and counters
//! for observability. Producers append at the back; the owning worker pops
//! the front, keeping recently submitted work FIFO; thieves detach the
//! newest half.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::job::JobRef;
use crate::pool::JobPool;

/// Minimum queue length before a thief takes anything. The thief always
/// leaves the older half behind, so bursts smaller than this stay where
/// they were submitted and the lock traffic of a steal is only paid when
/// there is real imbalance.
pub(crate) const STEAL_THRESHOLD: usize = 4;

pub(crate) struct QueueState {
    pub(crate) jobs: VecDeque<JobRef>,
    pub(crate) pool: JobPool,
    /// Set during executor teardown, after which submissions are refused.
    pub(crate) closed: bool,
}

pub(crate) struct Queue {
    index: usize,
    state: CachePadded<Mutex<QueueState>>,
    cond: Condvar,
    executed: AtomicU64,
    steals: AtomicU64,
}

impl Queue {
    pub(crate) fn new(index: usize) -> Self {
        Queue {
            index,
            state: CachePadded::new(Mutex::new(QueueState {
                jobs: VecDeque::new(),
                pool: JobPool::new(),
                closed: false,
            })),
            cond: Condvar::new(),
            executed: AtomicU64::new(0),
            steals: AtomicU64::new(0),
        }
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock()
    }

    pub(crate) fn wait(&self, state: &mut MutexGuard<'_, QueueState>) {
        self.cond.wait(state);
    }

    /// Wakes the queue's worker; called outside the critical section.
    pub(crate) fn notify_one(&self) {
        self.cond.notify_one();
    }

    pub(crate) fn notify_all(&self) {
        self.cond.notify_all();
    }

    /// Detaches the newest half of the queue for a thief, or nothing when
    /// the queue is below the steal threshold.
    pub(crate) fn donate_back_half(&self) -> Option<VecDeque<JobRef>> {
        let mut state = self.state.lock();
        let len = state.jobs.len();
        if len < STEAL_THRESHOLD {
            return None;
        }
        Some(state.jobs.split_off(len - len / 2))
    }

    pub(crate) fn record_executed(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_steal(&self) {
        self.steals.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    pub(crate) fn steals(&self) -> u64 {
        self.steals.load(Ordering::Relaxed)
    }
}
