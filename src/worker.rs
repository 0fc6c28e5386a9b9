//! Worker threads.
//!
//! A worker drives one queue at a time: drain the front, steal the newest
//! half of a busier queue when empty, otherwise wait on the queue condvar.
//! A worker whose queue slot is cleared (see
//! [`Executor::release_current_worker_thread`]) parks on its personal
//! condvar until it is re-bound to a queue or the executor stops.
//!
//! [`Executor::release_current_worker_thread`]: crate::Executor::release_current_worker_thread

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use core_affinity::CoreId;
use log::{trace, warn};
use parking_lot::{Condvar, Mutex};

use crate::executor::ExecutorCore;
use crate::job::JobRef;
use crate::queue::Queue;

/// Sentinel in a worker's queue slot meaning "suspended".
pub(crate) const NO_QUEUE: usize = usize::MAX;

/// State shared between a worker thread and the executor.
pub(crate) struct WorkerCore {
    id: usize,
    /// Index of the queue this worker drives, or [`NO_QUEUE`].
    current: AtomicUsize,
    suspend_lock: Mutex<()>,
    suspend_cond: Condvar,
}

impl WorkerCore {
    pub(crate) fn new(id: usize, queue_index: usize) -> Self {
        WorkerCore {
            id,
            current: AtomicUsize::new(queue_index),
            suspend_lock: Mutex::new(()),
            suspend_cond: Condvar::new(),
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn current_queue(&self) -> Option<usize> {
        match self.current.load(Ordering::Acquire) {
            NO_QUEUE => None,
            index => Some(index),
        }
    }

    /// Clears the queue slot, returning the queue this worker was driving.
    pub(crate) fn detach(&self) -> Option<usize> {
        match self.current.swap(NO_QUEUE, Ordering::AcqRel) {
            NO_QUEUE => None,
            index => Some(index),
        }
    }

    /// Hands a queue to a parked worker and wakes it. Passing through the
    /// suspend lock closes the gap between the worker's slot check and its
    /// wait.
    pub(crate) fn bind(&self, queue_index: usize) {
        self.current.store(queue_index, Ordering::Release);
        drop(self.suspend_lock.lock());
        self.suspend_cond.notify_one();
    }

    /// Wakes the worker so it can observe the executor's stop flag.
    pub(crate) fn wake(&self) {
        drop(self.suspend_lock.lock());
        self.suspend_cond.notify_all();
    }
}

/// TLS context of the current worker thread, installed for the lifetime of
/// the worker loop so jobs can reach their executor.
pub(crate) struct WorkerContext {
    pub(crate) core: Arc<WorkerCore>,
    pub(crate) shared: Arc<ExecutorCore>,
}

thread_local! {
    static CURRENT_WORKER: RefCell<Option<WorkerContext>> = const { RefCell::new(None) };
}

pub(crate) fn with_current<R>(f: impl FnOnce(&WorkerContext) -> R) -> Option<R> {
    CURRENT_WORKER.with(|slot| slot.borrow().as_ref().map(f))
}

/// Spawns the OS thread backing a worker.
pub(crate) fn spawn(
    core: Arc<WorkerCore>,
    shared: Arc<ExecutorCore>,
    core_id: Option<CoreId>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name(format!("jobforge-worker-{}", core.id()))
        .spawn(move || {
            if let Some(core_id) = core_id {
                core_affinity::set_for_current(core_id);
            }
            worker_main(core, shared);
        })
        .expect("failed to spawn worker thread")
}

fn worker_main(core: Arc<WorkerCore>, shared: Arc<ExecutorCore>) {
    trace!("worker {} starting", core.id());
    CURRENT_WORKER.with(|slot| {
        *slot.borrow_mut() = Some(WorkerContext {
            core: core.clone(),
            shared: shared.clone(),
        });
    });

    loop {
        let keep_running = match core.current_queue() {
            Some(queue_index) => drive(&core, &shared, queue_index),
            None => park(&core, &shared),
        };
        if !keep_running {
            break;
        }
    }

    CURRENT_WORKER.with(|slot| slot.borrow_mut().take());
    trace!("worker {} stopped", core.id());
}

/// Drives `queue_index` until the executor stops (returns false) or the
/// worker is detached or re-bound (returns true).
fn drive(core: &WorkerCore, shared: &ExecutorCore, queue_index: usize) -> bool {
    let queue = shared.queue(queue_index);

    loop {
        // Drain local jobs front-to-back. The slot check matters after
        // every job: the job may have released this worker.
        loop {
            if shared.is_stopping() {
                return false;
            }
            if core.current_queue() != Some(queue_index) {
                return true;
            }
            let job = queue.lock().jobs.pop_front();
            match job {
                Some(job) => execute_job(shared, queue, job),
                None => break,
            }
        }

        // Local queue empty: take the newest half of a busier queue.
        if shared.steal_into(queue_index) {
            continue;
        }

        // Nothing to steal: wait for a push, a stop, or a release swap.
        let mut state = queue.lock();
        loop {
            if shared.is_stopping() {
                return false;
            }
            if core.current_queue() != Some(queue_index) {
                return true;
            }
            if !state.jobs.is_empty() {
                break;
            }
            queue.wait(&mut state);
        }
    }
}

/// Parks a suspended worker until it is re-bound (returns true) or the
/// executor stops (returns false).
fn park(core: &WorkerCore, shared: &ExecutorCore) -> bool {
    let mut guard = core.suspend_lock.lock();
    loop {
        if shared.is_stopping() {
            return false;
        }
        if core.current_queue().is_some() {
            return true;
        }
        core.suspend_cond.wait(&mut guard);
    }
}

fn execute_job(shared: &ExecutorCore, queue: &Queue, job: JobRef) {
    // Counted up front so that anything the job signals (a counter, an
    // event) observes the count already bumped.
    queue.record_executed();
    let result = panic::catch_unwind(AssertUnwindSafe(|| unsafe { job.invoke() }));
    // The cell is freed against its origin queue whether or not the job
    // panicked; a stolen job's memory belongs to the queue it was submitted
    // to, not the one it ran from.
    unsafe { shared.free_job_cell(job) };
    if let Err(payload) = result {
        warn!("job panicked: {}", panic_message(payload.as_ref()));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}
