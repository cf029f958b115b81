//! # forkpool - Fine-Grained Fork-Join Job Scheduler
//!
//! An in-process scheduler for distributing many small CPU-bound work units
//! across worker threads without a shared mutex-protected queue. Three
//! lock-free tiers make that possible:
//!
//! - **Bounded MPMC queues**: each worker owns a fixed-capacity ring buffer
//!   that any thread may push to (scheduling) or pop from (stealing).
//! - **Block pool**: job descriptors live in a pre-allocated slot arena with
//!   a lock-free free list, so the hot path never touches the general
//!   allocator.
//! - **Fork-join scheduler**: parent/child completion counters, randomized
//!   placement and victim selection, and a busy-productive `wait` that keeps
//!   the caller executing other work instead of blocking.
//!
//! ## Example
//!
//! ```no_run
//! use forkpool::JobScheduler;
//!
//! let scheduler = JobScheduler::with_threads(4).unwrap();
//!
//! let root = scheduler
//!     .spawn(|ctx| {
//!         // Fork: children block the parent's completion.
//!         let me = ctx.current_job().unwrap();
//!         for _ in 0..8 {
//!             ctx.spawn_as_child(me, |_| {
//!                 // CPU-bound leaf work.
//!             })
//!             .unwrap();
//!         }
//!     })
//!     .unwrap();
//!
//! // Join: returns once the root and every descendant finished.
//! scheduler.wait(root);
//! scheduler.shutdown().unwrap();
//! ```

pub mod context;
pub mod error;
pub mod job;
pub mod metrics;
pub mod pool;
pub mod queue;
pub mod scheduler;
mod worker;

pub use context::JobContext;
pub use error::{PoolError, ScheduleError, SchedulerError, ShutdownError, SpawnError};
pub use job::{JobHandle, MAX_JOB_ALIGN, MAX_JOB_PAYLOAD};
pub use pool::BlockPool;
pub use queue::BoundedQueue;
pub use scheduler::{JobScheduler, SchedulerConfig};
