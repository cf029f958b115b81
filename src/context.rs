//! Per-thread execution context.
//!
//! Every worker run loop (and the scheduler-owning thread) gets exactly one
//! [`JobContext`]: its worker index, its own RNG for placement and victim
//! selection, and the job it is currently executing. Job bodies receive a
//! reference to the context of whichever worker picked them up, which is how
//! nested parallelism reaches the scheduler without any global registry.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::{ScheduleError, SpawnError};
use crate::job::JobHandle;
use crate::scheduler::Shared;

/// Capabilities available inside a job body and inside a worker loop.
///
/// One context per thread; the type is deliberately `!Sync` (per-thread RNG,
/// current-job cell) and never crosses threads.
pub struct JobContext {
    shared: Arc<Shared>,
    worker: usize,
    rng: RefCell<SmallRng>,
    current: Cell<Option<JobHandle>>,
}

impl JobContext {
    pub(crate) fn new(shared: Arc<Shared>, worker: usize) -> Self {
        JobContext {
            shared,
            worker,
            rng: RefCell::new(SmallRng::from_entropy()),
            current: Cell::new(None),
        }
    }

    /// Index of the worker this context belongs to (0 is the main worker).
    pub fn worker_index(&self) -> usize {
        self.worker
    }

    /// Handle of the job currently executing on this thread, if any.
    ///
    /// This is how a job body names itself as the parent of children it
    /// spawns.
    pub fn current_job(&self) -> Option<JobHandle> {
        self.current.get()
    }

    /// Creates a root job. See
    /// [`JobScheduler::create_job`](crate::scheduler::JobScheduler::create_job).
    pub fn create_job<F>(&self, f: F) -> Result<JobHandle, SpawnError>
    where
        F: FnOnce(&JobContext) + Send + 'static,
    {
        self.shared.create(None, f)
    }

    /// Creates a job whose completion the `parent` waits on.
    pub fn create_job_as_child<F>(&self, parent: JobHandle, f: F) -> Result<JobHandle, SpawnError>
    where
        F: FnOnce(&JobContext) + Send + 'static,
    {
        self.shared.create(Some(parent), f)
    }

    /// Pushes a created job onto a uniformly random worker queue.
    pub fn schedule(&self, handle: JobHandle) -> Result<(), ScheduleError> {
        self.shared.schedule(self, handle)
    }

    /// Create-and-schedule in one call; releases the job on a full queue.
    pub fn spawn<F>(&self, f: F) -> Result<JobHandle, SpawnError>
    where
        F: FnOnce(&JobContext) + Send + 'static,
    {
        self.shared.spawn(self, None, f)
    }

    /// [`spawn`](Self::spawn) with a parent link.
    pub fn spawn_as_child<F>(&self, parent: JobHandle, f: F) -> Result<JobHandle, SpawnError>
    where
        F: FnOnce(&JobContext) + Send + 'static,
    {
        self.shared.spawn(self, Some(parent), f)
    }

    /// Runs available work (own queue or stolen) until `handle` completes.
    pub fn wait(&self, handle: JobHandle) {
        self.shared.wait(self, handle);
    }

    /// True iff the job has finished (itself and all descendants).
    pub fn has_job_completed(&self, handle: JobHandle) -> bool {
        self.shared.has_job_completed(handle)
    }

    /// Gives up the timeslice.
    pub fn yield_now(&self) {
        std::thread::yield_now();
    }

    pub(crate) fn swap_current(&self, handle: Option<JobHandle>) -> Option<JobHandle> {
        self.current.replace(handle)
    }

    /// Uniform index over all `total` workers, self included, so initial
    /// placement is decoupled from job origin.
    pub(crate) fn random_worker(&self, total: usize) -> usize {
        self.rng.borrow_mut().gen_range(0..total)
    }

    /// Uniform index over the `total - 1` workers that are not this one.
    pub(crate) fn random_victim(&self, total: usize) -> usize {
        debug_assert!(total > 1);
        let pick = self.rng.borrow_mut().gen_range(0..total - 1);
        if pick >= self.worker {
            pick + 1
        } else {
            pick
        }
    }
}
