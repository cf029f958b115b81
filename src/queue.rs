//! Bounded lock-free multi-producer/multi-consumer queue.
//!
//! Dmitry Vyukov's bounded MPMC algorithm: a power-of-two ring of cells, each
//! carrying an atomic sequence number, plus two independent monotonically
//! increasing cursors. A cell's sequence encodes which side may touch it at a
//! given cursor position, so every CAS retry is local to one cell and there
//! is no global lock to contend on.
//!
//! # Ordering rationale
//!
//! ```text
//! Producer writes slot, then Release-stores sequence = pos + 1
//!   → consumer Acquire-loads sequence, then reads slot
//! Consumer reads slot, then Release-stores sequence = pos + capacity
//!   → producer (one lap later) Acquire-loads sequence, then writes slot
//! ```
//!
//! The cursor CASes themselves are Relaxed: they only arbitrate which thread
//! owns a position, and the payload hand-off is ordered entirely by the
//! sequence store/load pair above.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

struct Slot<T> {
    /// Generation marker. `sequence == pos` means the slot is writable for
    /// the producer claiming position `pos`; `sequence == pos + 1` means it
    /// is readable for the consumer at `pos`.
    sequence: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Fixed-capacity MPMC ring buffer. Never blocks, never resizes.
///
/// Both ends are shared: any thread may push, any thread may pop. Pops drain
/// in per-slot admission order. Stealing threads pop the same end as the
/// owning worker: this is a symmetric ring, not a Chase-Lev deque, trading
/// the deque's locality for a single simple structure.
pub struct BoundedQueue<T> {
    buffer: Box<[Slot<T>]>,
    mask: usize,
    /// Producers' claim cursor.
    enqueue_pos: CachePadded<AtomicUsize>,
    /// Consumers' claim cursor.
    dequeue_pos: CachePadded<AtomicUsize>,
}

// SAFETY: slot hand-off is ordered by the per-cell sequence protocol; a slot
// is only read by the consumer that claimed its position, after the producer
// published it.
unsafe impl<T: Send> Send for BoundedQueue<T> {}
unsafe impl<T: Send> Sync for BoundedQueue<T> {}

impl<T> BoundedQueue<T> {
    /// Creates a queue with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not a power of two or is less than 2. This is
    /// a construction-time contract, mirroring the fatal-at-construction
    /// error model of the rest of the crate.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity >= 2 && capacity.is_power_of_two(),
            "queue capacity must be a power of two >= 2, got {capacity}"
        );

        let buffer = (0..capacity)
            .map(|i| Slot {
                sequence: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();

        BoundedQueue {
            buffer,
            mask: capacity - 1,
            enqueue_pos: CachePadded::new(AtomicUsize::new(0)),
            dequeue_pos: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Attempts to insert `value`, returning it back if the queue is full.
    pub fn push(&self, value: T) -> Result<(), T> {
        let mut pos = self.enqueue_pos.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[pos & self.mask];
            let seq = slot.sequence.load(Ordering::Acquire);
            let dif = seq as isize - pos as isize;

            if dif == 0 {
                // The slot is vacant for this position; race other producers
                // for the claim.
                match self.enqueue_pos.compare_exchange_weak(
                    pos,
                    pos + 1,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: winning the CAS grants exclusive write
                        // access to this slot until the sequence store below
                        // publishes it.
                        unsafe { (*slot.value.get()).write(value) };
                        slot.sequence.store(pos + 1, Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => pos = current,
                }
            } else if dif < 0 {
                // The consumer a full lap behind has not vacated this slot:
                // the queue is full.
                return Err(value);
            } else {
                // Another producer already claimed this position; chase the
                // cursor.
                pos = self.enqueue_pos.load(Ordering::Relaxed);
            }
        }
    }

    /// Attempts to remove the oldest value, or `None` if the queue is empty.
    pub fn pop(&self) -> Option<T> {
        let mut pos = self.dequeue_pos.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[pos & self.mask];
            let seq = slot.sequence.load(Ordering::Acquire);
            let dif = seq as isize - (pos + 1) as isize;

            if dif == 0 {
                match self.dequeue_pos.compare_exchange_weak(
                    pos,
                    pos + 1,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: winning the CAS grants exclusive read
                        // access; the producer's Release store made the
                        // payload visible to our Acquire load above.
                        let value = unsafe { (*slot.value.get()).assume_init_read() };
                        // Mark the slot writable for the producer one lap
                        // ahead.
                        slot.sequence
                            .store(pos + self.mask + 1, Ordering::Release);
                        return Some(value);
                    }
                    Err(current) => pos = current,
                }
            } else if dif < 0 {
                // No producer has published this position yet: empty.
                return None;
            } else {
                pos = self.dequeue_pos.load(Ordering::Relaxed);
            }
        }
    }

    /// Instantaneous element count. Non-transactional: concurrent pushes and
    /// pops may move either cursor while the two loads happen.
    pub fn len(&self) -> usize {
        let tail = self.enqueue_pos.load(Ordering::Relaxed);
        let head = self.dequeue_pos.load(Ordering::Relaxed);
        tail.saturating_sub(head)
    }

    /// Snapshot emptiness check; same caveat as [`len`](Self::len).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }
}

impl<T> Drop for BoundedQueue<T> {
    fn drop(&mut self) {
        // Drain whatever was never consumed so payload destructors run.
        while self.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn fill_then_overflow() {
        let queue = BoundedQueue::new(16);
        for i in 0..queue.capacity() {
            assert!(queue.push(i).is_ok(), "push {i} should fit");
        }
        assert_eq!(queue.push(usize::MAX), Err(usize::MAX));
    }

    #[test]
    fn drain_then_underflow() {
        let queue = BoundedQueue::new(16);
        for i in 0..queue.capacity() {
            assert!(queue.push(i).is_ok());
        }
        for i in 0..queue.capacity() {
            assert_eq!(queue.pop(), Some(i));
        }
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn admission_order_across_wrap() {
        let queue = BoundedQueue::new(4);
        for lap in 0..10usize {
            for i in 0..4 {
                assert!(queue.push(lap * 4 + i).is_ok());
            }
            for i in 0..4 {
                assert_eq!(queue.pop(), Some(lap * 4 + i));
            }
        }
    }

    #[test]
    fn len_tracks_pushes_and_pops() {
        let queue = BoundedQueue::new(8);
        assert!(queue.is_empty());
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        assert_eq!(queue.len(), 2);
        queue.pop().unwrap();
        assert_eq!(queue.len(), 1);
        queue.pop().unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn drop_releases_unconsumed_values() {
        let marker = Arc::new(());
        {
            let queue = BoundedQueue::new(8);
            for _ in 0..5 {
                queue.push(Arc::clone(&marker)).unwrap();
            }
            assert_eq!(Arc::strong_count(&marker), 6);
        }
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn rejects_non_power_of_two() {
        let _ = BoundedQueue::<u32>::new(12);
    }
}
