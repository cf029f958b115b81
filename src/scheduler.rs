//! The fork-join scheduler.
//!
//! `JobScheduler` owns one worker per pool thread plus an implicit "main"
//! worker (index 0) for the thread that constructed it, a fixed block pool
//! of job slots, and the job-graph operations. The engine itself lives on
//! [`Shared`] so worker threads and the owning thread drive the same code
//! through their own [`JobContext`]s.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::context::JobContext;
use crate::error::{PoolError, ScheduleError, SchedulerError, ShutdownError, SpawnError};
use crate::job::{Job, JobHandle, NO_PARENT};
#[cfg(feature = "metrics")]
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::pool::BlockPool;
use crate::worker::{self, Worker};

/// Scheduler construction options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Worker threads to spawn. The owning thread acts as one additional
    /// implicit worker while it is inside [`JobScheduler::wait`].
    pub num_threads: usize,
    /// Sizes both the job pool (`num_threads * max_jobs_per_worker` slots)
    /// and each worker queue (rounded up to a power of two).
    pub max_jobs_per_worker: usize,
    /// Pin each worker thread to a CPU core (linear assignment).
    pub pin_workers: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            num_threads: thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            max_jobs_per_worker: 4096,
            pin_workers: false,
        }
    }
}

/// Engine state shared by all workers.
pub(crate) struct Shared {
    /// `num_threads + 1` entries; index 0 is the main worker.
    workers: Box<[Worker]>,
    pool: BlockPool<Job>,
    #[cfg(feature = "metrics")]
    pub(crate) metrics: Metrics,
}

impl Shared {
    pub(crate) fn worker(&self, index: usize) -> &Worker {
        &self.workers[index]
    }

    /// Allocates and arms a job slot. `parent` links the new job into the
    /// fork-join tree: the parent cannot complete until this child has.
    pub(crate) fn create<F>(
        &self,
        parent: Option<JobHandle>,
        f: F,
    ) -> Result<JobHandle, SpawnError>
    where
        F: FnOnce(&JobContext) + Send + 'static,
    {
        let index = self.pool.allocate().ok_or(SpawnError::PoolExhausted)?;

        let parent_index = match parent {
            Some(p) => {
                debug_assert_eq!(
                    self.pool.generation(p.index),
                    p.generation,
                    "parent job already completed"
                );
                // Register with the parent before the child's handle exists
                // anywhere, so the parent can never be observed finished
                // first.
                self.pool.get(p.index).add_child();
                p.index
            }
            None => NO_PARENT,
        };

        let slot = self.pool.get(index);
        // SAFETY: the slot was just allocated; nobody else can reach it.
        unsafe { slot.init(f, parent_index) };

        Ok(JobHandle {
            index,
            generation: self.pool.generation(index),
        })
    }

    /// Pushes `handle` onto a uniformly random worker queue (any of the
    /// `num_threads + 1`, independent of the calling thread). No retry on a
    /// full queue; backpressure belongs to the host.
    pub(crate) fn schedule(&self, ctx: &JobContext, handle: JobHandle) -> Result<(), ScheduleError> {
        let target = ctx.random_worker(self.workers.len());
        self.workers[target]
            .queue
            .push(handle)
            .map_err(ScheduleError::QueueFull)?;
        #[cfg(feature = "metrics")]
        self.metrics.schedule_pushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Create-and-schedule; on a full queue the job is unwound as if it was
    /// never created.
    pub(crate) fn spawn<F>(
        &self,
        ctx: &JobContext,
        parent: Option<JobHandle>,
        f: F,
    ) -> Result<JobHandle, SpawnError>
    where
        F: FnOnce(&JobContext) + Send + 'static,
    {
        let handle = self.create(parent, f)?;
        match self.schedule(ctx, handle) {
            Ok(()) => Ok(handle),
            Err(ScheduleError::QueueFull(handle)) => {
                // SAFETY: the handle never reached a queue; we are its only
                // holder.
                unsafe { self.pool.get(handle.index).discard() };
                self.pool.deallocate(handle.index);
                // The phantom child must not keep the parent alive; this may
                // legitimately be the decrement that completes it.
                if let Some(p) = parent {
                    self.finish(p.index);
                }
                Err(SpawnError::QueueFull)
            }
        }
    }

    /// One round of work acquisition: own queue first, then a single pop
    /// from one random other queue. `None` means the caller should yield.
    pub(crate) fn get_job(&self, ctx: &JobContext) -> Option<JobHandle> {
        let me = ctx.worker_index();
        if let Some(handle) = self.workers[me].queue.pop() {
            #[cfg(feature = "metrics")]
            self.metrics.local_pops.fetch_add(1, Ordering::Relaxed);
            return Some(handle);
        }

        if self.workers.len() < 2 {
            return None;
        }

        let victim = ctx.random_victim(self.workers.len());
        #[cfg(feature = "metrics")]
        self.metrics.steal_attempts.fetch_add(1, Ordering::Relaxed);
        let stolen = self.workers[victim].queue.pop();
        if stolen.is_some() {
            log::trace!("worker {me} stole a job from worker {victim}");
            #[cfg(feature = "metrics")]
            self.metrics.steals_success.fetch_add(1, Ordering::Relaxed);
        }
        stolen
    }

    /// Runs the job body, then propagates completion.
    pub(crate) fn execute(&self, ctx: &JobContext, handle: JobHandle) {
        let previous = ctx.swap_current(Some(handle));
        // SAFETY: we dequeued the handle; the queue hands each element to
        // exactly one consumer.
        unsafe { self.pool.get(handle.index).run(ctx) };
        ctx.swap_current(previous);
        self.finish(handle.index);
        #[cfg(feature = "metrics")]
        self.metrics.jobs_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Drops one outstanding unit from the job's counter; on the final
    /// decrement, cascades into the parent and returns the slot to the pool.
    /// This is the join point of the fork-join model.
    pub(crate) fn finish(&self, index: u32) {
        let job = self.pool.get(index);
        if job.complete_one() {
            // SAFETY: we observed the final decrement; no other thread will
            // touch this slot again before it is recycled.
            let parent = unsafe { job.parent() };
            if parent != NO_PARENT {
                self.finish(parent);
            }
            self.pool.deallocate(index);
        }
    }

    /// Keeps the calling thread productive (executing local or stolen work)
    /// until `handle` completes. Never blocks on an OS primitive.
    pub(crate) fn wait(&self, ctx: &JobContext, handle: JobHandle) {
        while !self.has_job_completed(handle) {
            match self.get_job(ctx) {
                Some(next) => self.execute(ctx, next),
                None => {
                    #[cfg(feature = "metrics")]
                    self.metrics.wait_yields.fetch_add(1, Ordering::Relaxed);
                    thread::yield_now();
                }
            }
        }
    }

    /// True iff the job and all its descendants have finished.
    ///
    /// A recycled slot (generation moved on) means the job completed some
    /// time ago. The two loads are not atomic together: a recycle between
    /// them can produce one spurious `false`, which the next call corrects.
    pub(crate) fn has_job_completed(&self, handle: JobHandle) -> bool {
        if self.pool.generation(handle.index) != handle.generation {
            return true;
        }
        self.pool.get(handle.index).is_complete()
    }

    /// Discards whatever never ran. Call only after workers have stopped.
    fn drain_queues(&self) -> usize {
        let mut discarded = 0;
        for worker in self.workers.iter() {
            while let Some(handle) = worker.queue.pop() {
                // SAFETY: workers have exited; this thread is the only
                // consumer left.
                unsafe { self.pool.get(handle.index).discard() };
                self.pool.deallocate(handle.index);
                discarded += 1;
            }
        }
        discarded
    }
}

/// The host-facing scheduler handle.
///
/// Owned by (and used from) the constructing thread; job bodies interact
/// through the [`JobContext`] they receive instead. Dropping the scheduler
/// tears the workers down, abandoning any jobs that never started.
pub struct JobScheduler {
    shared: Arc<Shared>,
    threads: Vec<thread::JoinHandle<()>>,
    main: JobContext,
}

impl JobScheduler {
    /// Spawns the worker threads and pre-allocates the job pool
    /// (`num_threads * max_jobs_per_worker` slots).
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        if config.num_threads == 0 {
            return Err(SchedulerError::ZeroWorkers);
        }
        if config.max_jobs_per_worker == 0 {
            return Err(SchedulerError::ZeroJobCapacity);
        }

        let pool_capacity = config
            .num_threads
            .checked_mul(config.max_jobs_per_worker)
            .ok_or(PoolError::CapacityOverflow(usize::MAX))?;
        let queue_capacity = config.max_jobs_per_worker.next_power_of_two().max(2);

        let workers = (0..=config.num_threads)
            .map(|_| Worker::new(queue_capacity))
            .collect();
        let pool = BlockPool::new(pool_capacity, |_| Job::vacant())?;

        let shared = Arc::new(Shared {
            workers,
            pool,
            #[cfg(feature = "metrics")]
            metrics: Metrics::new(),
        });

        let threads = (1..=config.num_threads)
            .map(|index| {
                let shared = Arc::clone(&shared);
                let pin = config.pin_workers;
                thread::spawn(move || worker::run(shared, index, pin))
            })
            .collect();

        log::debug!(
            "scheduler started: {} worker threads, {} job slots",
            config.num_threads,
            pool_capacity
        );

        let main = JobContext::new(Arc::clone(&shared), 0);
        Ok(JobScheduler {
            shared,
            threads,
            main,
        })
    }

    /// Scheduler with `num_threads` workers and default sizing.
    pub fn with_threads(num_threads: usize) -> Result<Self, SchedulerError> {
        JobScheduler::new(SchedulerConfig {
            num_threads,
            ..SchedulerConfig::default()
        })
    }

    /// Number of pool worker threads (the implicit main worker not counted).
    pub fn num_workers(&self) -> usize {
        self.threads.len()
    }

    /// The owning thread's context (worker 0).
    pub fn context(&self) -> &JobContext {
        &self.main
    }

    /// Creates a root job. Fails if the pool is exhausted; the pool never
    /// grows, so size it for peak in-flight jobs.
    pub fn create_job<F>(&self, f: F) -> Result<JobHandle, SpawnError>
    where
        F: FnOnce(&JobContext) + Send + 'static,
    {
        self.shared.create(None, f)
    }

    /// Creates a job the `parent` will wait on; the parent's counter is
    /// raised before the child becomes schedulable.
    pub fn create_job_as_child<F>(&self, parent: JobHandle, f: F) -> Result<JobHandle, SpawnError>
    where
        F: FnOnce(&JobContext) + Send + 'static,
    {
        self.shared.create(Some(parent), f)
    }

    /// Pushes a created job onto a uniformly random worker queue.
    pub fn schedule(&self, handle: JobHandle) -> Result<(), ScheduleError> {
        self.shared.schedule(&self.main, handle)
    }

    /// Create-and-schedule in one call.
    pub fn spawn<F>(&self, f: F) -> Result<JobHandle, SpawnError>
    where
        F: FnOnce(&JobContext) + Send + 'static,
    {
        self.shared.spawn(&self.main, None, f)
    }

    /// [`spawn`](Self::spawn) with a parent link.
    pub fn spawn_as_child<F>(&self, parent: JobHandle, f: F) -> Result<JobHandle, SpawnError>
    where
        F: FnOnce(&JobContext) + Send + 'static,
    {
        self.shared.spawn(&self.main, Some(parent), f)
    }

    /// Executes available work on the calling thread until `handle`
    /// completes.
    pub fn wait(&self, handle: JobHandle) {
        self.shared.wait(&self.main, handle);
    }

    /// True iff the job and all its descendants have finished.
    pub fn has_job_completed(&self, handle: JobHandle) -> bool {
        self.shared.has_job_completed(handle)
    }

    /// Counter snapshot; see [`MetricsSnapshot`].
    #[cfg(feature = "metrics")]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Stops the workers and reaps them.
    ///
    /// Termination flags are observed between jobs, so in-flight bodies run
    /// to completion; jobs still sitting in queues are discarded (their
    /// captures dropped). Hosts that care should `wait` on their roots
    /// first.
    pub fn shutdown(mut self) -> Result<(), ShutdownError> {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> Result<(), ShutdownError> {
        for worker in (0..=self.threads.len()).map(|i| self.shared.worker(i)) {
            worker.terminated.store(true, Ordering::Relaxed);
        }

        let mut panicked = 0;
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                panicked += 1;
            }
        }

        let discarded = self.shared.drain_queues();
        if discarded > 0 {
            log::warn!("discarded {discarded} unexecuted jobs at shutdown");
        }

        if panicked > 0 {
            log::warn!("{panicked} worker thread(s) panicked");
            Err(ShutdownError::WorkerPanicked { count: panicked })
        } else {
            log::debug!("scheduler stopped");
            Ok(())
        }
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        let _ = self.shutdown_inner();
    }
}
