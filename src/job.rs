//! Pool-resident job descriptors.
//!
//! A [`Job`] never leaves its pool slot. Its body is an erased closure whose
//! captured state lives inline in a fixed-size payload region, keeping every
//! Job the same size so the block pool can recycle slots freely. The handle
//! the host works with is a copyable `(slot index, generation)` pair.

use std::cell::UnsafeCell;
use std::mem::{align_of, size_of, MaybeUninit};
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use crate::context::JobContext;

/// Maximum size in bytes of a job body's captured state.
///
/// Chosen so a whole pool slot (job header + payload + slot bookkeeping)
/// stays within one padded cache line. A handful of `Arc`s and small values
/// fit comfortably; anything larger should be boxed by the caller.
pub const MAX_JOB_PAYLOAD: usize = 64;

/// Maximum alignment of a job body's captured state.
pub const MAX_JOB_ALIGN: usize = 16;

/// Parent-link value for root jobs.
pub(crate) const NO_PARENT: u32 = u32::MAX;

#[repr(C, align(16))]
struct Payload([MaybeUninit<u8>; MAX_JOB_PAYLOAD]);

type InvokeFn = unsafe fn(*mut u8, &JobContext);
type DropFn = unsafe fn(*mut u8);

unsafe fn invoke_erased<F: FnOnce(&JobContext)>(payload: *mut u8, ctx: &JobContext) {
    // SAFETY: caller guarantees `payload` holds an initialized `F` that has
    // not been consumed; reading it out transfers ownership to this frame.
    let f = unsafe { payload.cast::<F>().read() };
    f(ctx);
}

unsafe fn drop_erased<F>(payload: *mut u8) {
    // SAFETY: caller guarantees `payload` holds an initialized, unconsumed `F`.
    unsafe { payload.cast::<F>().drop_in_place() };
}

/// Identifies a job created by the scheduler.
///
/// Handles stay valid to *query* forever: once the job completes and its slot
/// is recycled, the generation mismatch makes
/// [`has_job_completed`](crate::scheduler::JobScheduler::has_job_completed)
/// report `true` rather than reading a stranger's counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JobHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// A schedulable unit of work, resident in a pool slot.
///
/// Field protocol: the non-atomic fields are written only by the creating
/// thread before the handle is published (the queue push is the Release
/// point), and later touched only by the single thread that runs or finishes
/// the job. `unfinished` is the one field with genuinely concurrent writers.
pub(crate) struct Job {
    invoke: UnsafeCell<Option<InvokeFn>>,
    drop_payload: UnsafeCell<Option<DropFn>>,
    parent: UnsafeCell<u32>,
    /// Reserved for priority scheduling; never consulted.
    priority: AtomicU8,
    /// 1 for the job's own body, +1 per outstanding child.
    unfinished: AtomicU32,
    payload: UnsafeCell<Payload>,
}

// SAFETY: see the field protocol above; cross-thread hand-off of the
// non-atomic fields is ordered by the queue's publication and by the
// counter's AcqRel decrement.
unsafe impl Send for Job {}
unsafe impl Sync for Job {}

impl Job {
    /// An empty slot: no payload, counter at rest.
    pub(crate) fn vacant() -> Self {
        Job {
            invoke: UnsafeCell::new(None),
            drop_payload: UnsafeCell::new(None),
            parent: UnsafeCell::new(NO_PARENT),
            priority: AtomicU8::new(0),
            unfinished: AtomicU32::new(0),
            payload: UnsafeCell::new(Payload([MaybeUninit::uninit(); MAX_JOB_PAYLOAD])),
        }
    }

    /// Arms a freshly allocated slot with a body and parent link.
    ///
    /// # Safety
    ///
    /// The caller must have exclusive use of this slot (just allocated,
    /// handle not yet shared).
    pub(crate) unsafe fn init<F>(&self, f: F, parent: u32)
    where
        F: FnOnce(&JobContext) + Send + 'static,
    {
        const {
            assert!(
                size_of::<F>() <= MAX_JOB_PAYLOAD,
                "job closure captures exceed MAX_JOB_PAYLOAD bytes"
            );
            assert!(
                align_of::<F>() <= MAX_JOB_ALIGN,
                "job closure captures exceed MAX_JOB_ALIGN alignment"
            );
        }

        unsafe {
            (*self.payload.get()).0.as_mut_ptr().cast::<F>().write(f);
            *self.invoke.get() = Some(invoke_erased::<F>);
            *self.drop_payload.get() = Some(drop_erased::<F>);
            *self.parent.get() = parent;
        }
        self.priority.store(0, Ordering::Relaxed);
        self.unfinished.store(1, Ordering::Relaxed);
    }

    /// Consumes and runs the body.
    ///
    /// # Safety
    ///
    /// Only the worker that dequeued this job may call this, exactly once.
    pub(crate) unsafe fn run(&self, ctx: &JobContext) {
        let invoke = unsafe { (*self.invoke.get()).take() };
        unsafe { *self.drop_payload.get() = None };
        debug_assert!(invoke.is_some(), "job body run twice or never armed");
        if let Some(invoke) = invoke {
            unsafe { invoke((*self.payload.get()).0.as_mut_ptr().cast(), ctx) };
        }
    }

    /// Drops a never-run body (teardown drain, failed spawn).
    ///
    /// # Safety
    ///
    /// The caller must have exclusive use of this slot and the body must not
    /// have been run.
    pub(crate) unsafe fn discard(&self) {
        unsafe {
            *self.invoke.get() = None;
            if let Some(drop_fn) = (*self.drop_payload.get()).take() {
                drop_fn((*self.payload.get()).0.as_mut_ptr().cast());
            }
        }
    }

    /// # Safety
    ///
    /// Readable only after the job was published (queue Acquire) or by its
    /// creator.
    pub(crate) unsafe fn parent(&self) -> u32 {
        unsafe { *self.parent.get() }
    }

    /// Registers one more outstanding child.
    ///
    /// Relaxed is enough: the creator holds the parent live (its own count
    /// has not reached zero), and the child's later decrement is ordered
    /// behind this increment by the child's queue publication.
    pub(crate) fn add_child(&self) {
        self.unfinished.fetch_add(1, Ordering::Relaxed);
    }

    /// Drops one outstanding unit; true when this call was the last.
    ///
    /// AcqRel: Release publishes this unit's side effects to whoever observes
    /// zero; Acquire makes the observer of the final decrement see every
    /// previous unit's effects.
    pub(crate) fn complete_one(&self) -> bool {
        self.unfinished.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.unfinished.load(Ordering::Acquire) == 0
    }

    #[allow(dead_code)]
    pub(crate) fn priority(&self) -> u8 {
        self.priority.load(Ordering::Relaxed)
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        // A body that was armed but never ran still owns its captures.
        // SAFETY: `&mut self` proves exclusive access.
        unsafe { self.discard() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vacant_slot_is_at_rest() {
        let job = Job::vacant();
        assert!(job.is_complete());
        assert_eq!(unsafe { job.parent() }, NO_PARENT);
        assert_eq!(job.priority(), 0);
    }

    #[test]
    fn counter_tracks_children() {
        let job = Job::vacant();
        unsafe { job.init(|_| {}, NO_PARENT) };
        assert!(!job.is_complete());

        job.add_child();
        assert!(!job.complete_one(), "body done but child outstanding");
        assert!(job.complete_one(), "last child completes the job");
        assert!(job.is_complete());
    }

    #[test]
    fn discard_drops_captures() {
        use std::sync::Arc;

        let marker = Arc::new(());
        let held = Arc::clone(&marker);
        let job = Job::vacant();
        unsafe { job.init(move |_| drop(held), NO_PARENT) };
        assert_eq!(Arc::strong_count(&marker), 2);

        unsafe { job.discard() };
        assert_eq!(Arc::strong_count(&marker), 1);

        // Discarding again is a no-op.
        unsafe { job.discard() };
        assert_eq!(Arc::strong_count(&marker), 1);
    }
}
