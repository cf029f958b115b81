//! Teardown behavior.

use forkpool::{JobScheduler, SchedulerConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn shutdown_immediately_after_construction() {
    let scheduler = JobScheduler::with_threads(4).unwrap();
    assert_eq!(scheduler.num_workers(), 4);
    scheduler.shutdown().expect("clean shutdown");
}

#[test]
fn drop_without_explicit_shutdown() {
    let scheduler = JobScheduler::with_threads(2).unwrap();
    let ran = Arc::new(AtomicBool::new(false));

    let seen = Arc::clone(&ran);
    let job = scheduler
        .spawn(move |_| {
            seen.store(true, Ordering::SeqCst);
        })
        .unwrap();
    scheduler.wait(job);
    drop(scheduler);

    assert!(ran.load(Ordering::SeqCst));
}

/// Jobs still sitting in queues at teardown are discarded and their captured
/// state is dropped, not leaked.
#[test]
fn shutdown_drains_unexecuted_jobs() {
    const PENDING: usize = 8;

    let _ = env_logger::builder().is_test(true).try_init();
    let scheduler = JobScheduler::new(SchedulerConfig {
        num_threads: 1,
        max_jobs_per_worker: 64,
        pin_workers: false,
    })
    .unwrap();

    // Park the only pool worker inside a job body.
    let started = Arc::new(AtomicBool::new(false));
    let gate = Arc::new(AtomicBool::new(false));
    let s = Arc::clone(&started);
    let g = Arc::clone(&gate);
    scheduler
        .spawn(move |_| {
            s.store(true, Ordering::SeqCst);
            while !g.load(Ordering::SeqCst) {
                thread::yield_now();
            }
        })
        .expect("spawn blocker");
    while !started.load(Ordering::SeqCst) {
        thread::yield_now();
    }

    // These can only pile up: the worker is busy and this thread never
    // executes work (no wait call).
    let marker = Arc::new(());
    for _ in 0..PENDING {
        let held = Arc::clone(&marker);
        scheduler
            .spawn(move |_| {
                drop(held);
            })
            .expect("spawn pending job");
    }
    assert_eq!(Arc::strong_count(&marker), PENDING + 1);

    // Release the blocker a moment after shutdown has raised the
    // termination flags; the worker then exits without taking new work.
    let releaser = {
        let gate = Arc::clone(&gate);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            gate.store(true, Ordering::SeqCst);
        })
    };

    scheduler.shutdown().expect("shutdown failed");
    releaser.join().unwrap();

    assert_eq!(
        Arc::strong_count(&marker),
        1,
        "pending job captures were leaked"
    );
}

#[test]
fn wait_then_shutdown_under_load() {
    let scheduler = JobScheduler::with_threads(4).unwrap();
    let mut jobs = Vec::new();
    for _ in 0..500 {
        jobs.push(
            scheduler
                .spawn(|_| {
                    std::hint::black_box(0u64);
                })
                .unwrap(),
        );
    }
    for job in jobs {
        scheduler.wait(job);
    }
    scheduler.shutdown().expect("shutdown failed");
}
