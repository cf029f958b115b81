//! Worker state and the worker-thread run loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::context::JobContext;
use crate::job::JobHandle;
use crate::queue::BoundedQueue;
use crate::scheduler::Shared;

/// Per-worker state: one bounded job queue and a termination flag.
///
/// The queue is conceptually owned by its worker but physically MPMC:
/// `schedule` pushes from any thread and stealing workers pop from it.
pub(crate) struct Worker {
    pub(crate) queue: BoundedQueue<JobHandle>,
    pub(crate) terminated: AtomicBool,
}

impl Worker {
    pub(crate) fn new(queue_capacity: usize) -> Self {
        Worker {
            queue: BoundedQueue::new(queue_capacity),
            terminated: AtomicBool::new(false),
        }
    }
}

/// Body of each pool thread.
///
/// The termination flag is observed cooperatively between jobs, never
/// mid-job. An empty round (own queue and the one stolen-from queue both
/// dry) yields the timeslice instead of sleeping.
pub(crate) fn run(shared: Arc<Shared>, index: usize, pin_to_core: bool) {
    if pin_to_core {
        if let Some(core_ids) = core_affinity::get_core_ids() {
            if let Some(core) = core_ids.get(index % core_ids.len()) {
                core_affinity::set_for_current(*core);
            }
        }
    }

    log::debug!("worker {index} started");
    let ctx = JobContext::new(Arc::clone(&shared), index);

    while !shared.worker(index).terminated.load(Ordering::Relaxed) {
        match shared.get_job(&ctx) {
            Some(handle) => shared.execute(&ctx, handle),
            None => thread::yield_now(),
        }
    }

    log::debug!("worker {index} stopped");
}
