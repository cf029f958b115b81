//! Concurrency invariants of the bounded MPMC queue.

use forkpool::BoundedQueue;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Every successfully pushed value is delivered exactly once, and whatever
/// is neither consumed nor drained does not exist.
#[test]
fn values_delivered_exactly_once() {
    const CAPACITY: usize = 128;
    const PRODUCERS: usize = 4;
    const CONSUMERS: usize = 4;
    const PER_PRODUCER: usize = 20_000;

    let queue = Arc::new(BoundedQueue::new(CAPACITY));
    let producers_done = Arc::new(AtomicBool::new(false));

    let producer_handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut pushed = Vec::with_capacity(PER_PRODUCER);
                for i in 0..PER_PRODUCER {
                    let value = p * PER_PRODUCER + i;
                    // Retry on full: this test is about delivery, not
                    // backpressure.
                    loop {
                        match queue.push(value) {
                            Ok(()) => break,
                            Err(_) => thread::yield_now(),
                        }
                    }
                    pushed.push(value);
                }
                pushed
            })
        })
        .collect();

    let consumer_handles: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let producers_done = Arc::clone(&producers_done);
            thread::spawn(move || {
                let mut popped = Vec::new();
                loop {
                    match queue.pop() {
                        Some(value) => popped.push(value),
                        None => {
                            if producers_done.load(Ordering::Acquire) && queue.is_empty() {
                                break;
                            }
                            thread::yield_now();
                        }
                    }
                }
                popped
            })
        })
        .collect();

    let mut pushed = Vec::new();
    for handle in producer_handles {
        pushed.extend(handle.join().unwrap());
    }
    producers_done.store(true, Ordering::Release);

    let mut popped = Vec::new();
    for handle in consumer_handles {
        popped.extend(handle.join().unwrap());
    }
    // Late pushes that raced the consumers' exit.
    while let Some(value) = queue.pop() {
        popped.push(value);
    }

    assert_eq!(popped.len(), pushed.len());

    let pushed: HashSet<usize> = pushed.into_iter().collect();
    let mut seen = HashSet::new();
    for value in popped {
        assert!(seen.insert(value), "value {value} delivered twice");
        assert!(pushed.contains(&value), "value {value} was never pushed");
    }
}

/// (successful pushes - successful pops) can never exceed the capacity.
#[test]
fn occupancy_never_exceeds_capacity() {
    const CAPACITY: usize = 16;
    const THREADS: usize = 4;
    const ATTEMPTS: usize = 50_000;

    let queue = Arc::new(BoundedQueue::new(CAPACITY));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut pushes = 0usize;
                let mut pops = 0usize;
                for i in 0..ATTEMPTS {
                    if i % 2 == 0 {
                        if queue.push(i).is_ok() {
                            pushes += 1;
                        }
                    } else if queue.pop().is_some() {
                        pops += 1;
                    }
                }
                (pushes, pops)
            })
        })
        .collect();

    let mut total_pushes = 0usize;
    let mut total_pops = 0usize;
    for handle in handles {
        let (pushes, pops) = handle.join().unwrap();
        total_pushes += pushes;
        total_pops += pops;
    }

    let remaining = total_pushes - total_pops;
    assert!(
        remaining <= CAPACITY,
        "net occupancy {remaining} exceeds capacity {CAPACITY}"
    );

    let mut drained = 0usize;
    while queue.pop().is_some() {
        drained += 1;
    }
    assert_eq!(drained, remaining);
}
