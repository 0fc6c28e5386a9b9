//! Work-stealing job executor.
//!
//! The executor owns one queue per worker thread and dispatches submitted
//! jobs round-robin. Job memory is allocated in the producer thread from
//! the target queue's pool, so the worker stays hot on execution and the
//! pool's single-threaded design is safe: it is only ever touched under its
//! queue's mutex. Idle workers steal the newest half of busier queues.
//!
//! The release facility is what sets this executor apart from a plain
//! thread pool: a long-running job can give its worker slot back with
//! [`Executor::release_current_worker_thread`], and the pool is replenished
//! with a parked or freshly spawned worker while the job keeps running on
//! the original OS thread.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use core_affinity::CoreId;
use log::{debug, error};
use parking_lot::Mutex;

use crate::error::Error;
use crate::job::JobRef;
use crate::metrics::{ExecutorStats, QueueStats};
use crate::queue::Queue;
use crate::worker::{self, WorkerCore};

/// How worker threads are placed on CPU cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PinningStrategy {
    /// Let the OS schedule worker threads freely.
    #[default]
    None,
    /// Pin worker `i` to core `i % core_count`.
    Linear,
}

struct Registry {
    /// Every worker ever spawned, initial and replacement alike.
    workers: Vec<Arc<WorkerCore>>,
    handles: Vec<JoinHandle<()>>,
    /// Released workers, available for adoption on the next release swap.
    parked: Vec<Arc<WorkerCore>>,
    pinning: PinningStrategy,
    cores: Vec<CoreId>,
}

impl Registry {
    fn core_for(&self, worker_id: usize) -> Option<CoreId> {
        match self.pinning {
            PinningStrategy::None => None,
            PinningStrategy::Linear => {
                if self.cores.is_empty() {
                    None
                } else {
                    self.cores.get(worker_id % self.cores.len()).copied()
                }
            }
        }
    }
}

/// Shared state behind an executor and all of its workers.
pub(crate) struct ExecutorCore {
    queues: Box<[Queue]>,
    next_queue: AtomicUsize,
    stop: AtomicBool,
    registry: Mutex<Registry>,
}

impl ExecutorCore {
    pub(crate) fn queue(&self, index: usize) -> &Queue {
        &self.queues[index]
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn thread_count(&self) -> usize {
        self.queues.len()
    }

    fn submit<F>(&self, func: F) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        let index = self.next_queue.fetch_add(1, Ordering::Relaxed) % self.queues.len();
        let queue = &self.queues[index];
        {
            let mut state = queue.lock();
            if state.closed {
                return Err(Error::ShuttingDown);
            }
            let mem = state.pool.alloc(JobRef::layout_for::<F>())?;
            let job = unsafe { JobRef::write(mem, index, func) };
            state.jobs.push_back(job);
        }
        queue.notify_one();
        Ok(())
    }

    /// Moves the newest half of some busier queue into `dst_index`,
    /// scanning round-robin starting after it. Source and destination are
    /// never locked at the same time.
    pub(crate) fn steal_into(&self, dst_index: usize) -> bool {
        let count = self.queues.len();
        for offset in 1..count {
            let src = &self.queues[(dst_index + offset) % count];
            if let Some(mut batch) = src.donate_back_half() {
                let dst = &self.queues[dst_index];
                dst.lock().jobs.append(&mut batch);
                dst.record_steal();
                return true;
            }
        }
        false
    }

    /// Frees a settled job's cell against its origin queue's pool.
    pub(crate) unsafe fn free_job_cell(&self, job: JobRef) {
        let origin = &self.queues[job.origin()];
        origin.lock().pool.dealloc(job.as_block(), job.layout());
    }

    /// Drops a never-run job and frees its cell.
    unsafe fn discard_job(&self, job: JobRef) {
        job.drop_payload();
        self.free_job_cell(job);
    }

    /// Detaches the calling worker from its queue and hands the queue to a
    /// parked or freshly spawned successor.
    fn release_worker(shared: &Arc<ExecutorCore>, core: &Arc<WorkerCore>) -> Result<(), Error> {
        let queue_index = core.detach().ok_or(Error::WorkerAlreadyReleased)?;

        let mut registry = shared.registry.lock();
        if shared.is_stopping() {
            // Teardown is abandoning the queues; a successor would only
            // observe the stop flag and exit.
            return Ok(());
        }
        if let Some(successor) = registry.parked.pop() {
            debug!(
                "worker {} released queue {}, adopted by parked worker {}",
                core.id(),
                queue_index,
                successor.id()
            );
            successor.bind(queue_index);
        } else {
            let id = registry.workers.len();
            debug!(
                "worker {} released queue {}, spawning replacement worker {}",
                core.id(),
                queue_index,
                id
            );
            let successor = Arc::new(WorkerCore::new(id, queue_index));
            let handle = worker::spawn(successor.clone(), shared.clone(), registry.core_for(id));
            registry.workers.push(successor);
            registry.handles.push(handle);
        }
        registry.parked.push(core.clone());
        Ok(())
    }

    fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            queues: self
                .queues
                .iter()
                .map(|queue| QueueStats {
                    index: queue.index(),
                    executed: queue.executed(),
                    steals: queue.steals(),
                })
                .collect(),
        }
    }
}

/// A fixed-size pool of worker threads executing submitted jobs.
///
/// Dropping the executor stops all workers: jobs already running complete,
/// pending jobs are freed without being invoked.
pub struct Executor {
    core: Arc<ExecutorCore>,
}

impl Executor {
    /// Creates an executor with `thread_count` queues and workers.
    ///
    /// Returns [`Error::ZeroThreads`] if `thread_count` is zero.
    pub fn new(thread_count: usize) -> Result<Self, Error> {
        Executor::with_pinning(thread_count, PinningStrategy::None)
    }

    /// Creates an executor whose workers are placed per `pinning`.
    pub fn with_pinning(thread_count: usize, pinning: PinningStrategy) -> Result<Self, Error> {
        if thread_count == 0 {
            return Err(Error::ZeroThreads);
        }

        let queues: Box<[Queue]> = (0..thread_count).map(Queue::new).collect();
        let cores = match pinning {
            PinningStrategy::None => Vec::new(),
            PinningStrategy::Linear => core_affinity::get_core_ids().unwrap_or_default(),
        };
        let core = Arc::new(ExecutorCore {
            queues,
            next_queue: AtomicUsize::new(0),
            stop: AtomicBool::new(false),
            registry: Mutex::new(Registry {
                workers: Vec::with_capacity(thread_count),
                handles: Vec::with_capacity(thread_count),
                parked: Vec::new(),
                pinning,
                cores,
            }),
        });

        {
            let mut registry = core.registry.lock();
            for index in 0..thread_count {
                let worker = Arc::new(WorkerCore::new(index, index));
                let handle = worker::spawn(worker.clone(), core.clone(), registry.core_for(index));
                registry.workers.push(worker);
                registry.handles.push(handle);
            }
        }

        Ok(Executor { core })
    }

    /// Submits a job.
    ///
    /// The target queue is chosen round-robin; the job's cell is allocated
    /// from that queue's pool in the calling thread. Fails with
    /// [`Error::OutOfMemory`] if the pool cannot obtain memory and
    /// [`Error::ShuttingDown`] once teardown has begun.
    pub fn execute<F>(&self, func: F) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        self.core.submit(func)
    }

    /// Number of queues (and of workers driving them).
    pub fn thread_count(&self) -> usize {
        self.core.thread_count()
    }

    /// Snapshot of per-queue execution and steal counters.
    pub fn stats(&self) -> ExecutorStats {
        self.core.stats()
    }

    /// The executor driving the calling thread, if any.
    pub fn current() -> Option<ExecutorHandle> {
        worker::with_current(|ctx| ExecutorHandle {
            core: ctx.shared.clone(),
        })
    }

    /// Detaches the calling worker thread from its queue and replenishes
    /// the pool with another worker, so the queue keeps draining while the
    /// calling job continues on this OS thread.
    ///
    /// Meant to be called at the start of a long-running job. The calling
    /// job is not interrupted; once it returns, the thread parks and
    /// becomes the first candidate for a future release swap.
    ///
    /// Fails with [`Error::NotWorkerThread`] off a worker and
    /// [`Error::WorkerAlreadyReleased`] on a second call within the same
    /// job.
    pub fn release_current_worker_thread() -> Result<(), Error> {
        worker::with_current(|ctx| ExecutorCore::release_worker(&ctx.shared, &ctx.core))
            .unwrap_or(Err(Error::NotWorkerThread))
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.core.stop.store(true, Ordering::Release);

        // Wake queue waiters. Passing through each queue's lock closes the
        // gap between a worker's stop check and its wait.
        for queue in self.core.queues.iter() {
            drop(queue.lock());
            queue.notify_all();
        }

        // Wake parked workers and collect every join handle. The registry
        // lock is not held across the joins: a still-running job may be in
        // the middle of a release swap, which needs the lock.
        let (workers, handles) = {
            let mut registry = self.core.registry.lock();
            let workers = std::mem::take(&mut registry.workers);
            let handles = std::mem::take(&mut registry.handles);
            registry.parked.clear();
            (workers, handles)
        };
        for worker in &workers {
            worker.wake();
        }
        for handle in handles {
            if handle.join().is_err() {
                error!("a worker thread panicked outside a job");
            }
        }

        // All workers are gone; close the queues and free the jobs that
        // never ran, each against its origin queue.
        let mut pending = Vec::new();
        for queue in self.core.queues.iter() {
            let mut state = queue.lock();
            state.closed = true;
            pending.extend(state.jobs.drain(..));
        }
        debug!("executor dropped with {} pending jobs", pending.len());
        for job in pending {
            unsafe { self.core.discard_job(job) };
        }
    }
}

/// Cloneable submission handle to a live executor, obtained from
/// [`Executor::current`] inside a job.
#[derive(Clone)]
pub struct ExecutorHandle {
    core: Arc<ExecutorCore>,
}

impl ExecutorHandle {
    /// Submits a job; see [`Executor::execute`].
    pub fn execute<F>(&self, func: F) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        self.core.submit(func)
    }

    /// Number of queues; see [`Executor::thread_count`].
    pub fn thread_count(&self) -> usize {
        self.core.thread_count()
    }

    /// Snapshot of per-queue counters; see [`Executor::stats`].
    pub fn stats(&self) -> ExecutorStats {
        self.core.stats()
    }
}
