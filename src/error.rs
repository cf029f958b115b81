//! Error types surfaced by the scheduler and its building blocks.

use crate::job::JobHandle;
use thiserror::Error;

/// Construction failures of a [`BlockPool`](crate::pool::BlockPool).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// The pool must hold at least one block.
    #[error("pool capacity must be nonzero")]
    ZeroCapacity,
    /// Slot indices are `u32` with `u32::MAX` reserved as the free-list
    /// sentinel, so the capacity must stay below it.
    #[error("pool capacity {0} exceeds the representable index range")]
    CapacityOverflow(usize),
}

/// Construction failures of a [`JobScheduler`](crate::scheduler::JobScheduler).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    /// At least one worker thread is required; the pool is sized by
    /// `num_threads * max_jobs_per_worker`, so zero threads would leave no
    /// job capacity at all.
    #[error("worker thread count must be nonzero")]
    ZeroWorkers,
    /// `max_jobs_per_worker` must be nonzero.
    #[error("max jobs per worker must be nonzero")]
    ZeroJobCapacity,
    /// The job pool could not be constructed.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Failures of `create_job` / `create_job_as_child` / `spawn`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// The fixed-capacity job pool is exhausted. The pool never grows; size
    /// it for the expected peak number of in-flight jobs.
    #[error("job pool exhausted")]
    PoolExhausted,
    /// `spawn` created the job but the target queue refused it; the job has
    /// been released back to the pool.
    #[error("target worker queue is full")]
    QueueFull,
}

/// Failure of `schedule`: the randomly chosen worker queue is saturated.
///
/// The handle is returned so the host can apply its own backpressure policy
/// (retry, run inline, shed load). The scheduler itself never retries.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("target worker queue is full")]
    QueueFull(JobHandle),
}

/// Teardown report from [`JobScheduler::shutdown`](crate::scheduler::JobScheduler::shutdown).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownError {
    /// One or more worker threads panicked while running a job body.
    #[error("{count} worker thread(s) panicked")]
    WorkerPanicked { count: usize },
}
