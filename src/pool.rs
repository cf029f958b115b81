//! Lock-free fixed-block slot pool.
//!
//! One contiguous slab of slots is allocated up front and never grows. Free
//! slots form an intrusive Treiber stack threaded through the slots' own
//! `next_free` fields, driven by a single atomic head.
//!
//! Two hardenings over a classic pointer-based free list:
//!
//! - The head packs a monotonically increasing tag next to the slot index in
//!   one `AtomicU64`. A slot that is freed and re-allocated between another
//!   thread's head load and its CAS changes the tag, so the stale CAS fails
//!   instead of silently corrupting the list (the ABA hazard).
//! - Every slot carries a generation counter, bumped on release. A caller
//!   that kept a slot index across a free can detect the recycle by
//!   comparing generations instead of dereferencing stale state.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

use crate::error::PoolError;

/// Free-list terminator and the one index value a pool can never hand out.
pub(crate) const NIL: u32 = u32::MAX;

fn pack(tag: u32, index: u32) -> u64 {
    (u64::from(tag) << 32) | u64::from(index)
}

fn unpack(head: u64) -> (u32, u32) {
    ((head >> 32) as u32, head as u32)
}

struct Block<T> {
    /// Next free slot index. Meaningful only while this slot sits on the
    /// free list; garbage while the slot is handed out.
    next_free: AtomicU32,
    /// Bumped on every deallocation.
    generation: AtomicU32,
    value: T,
}

/// Fixed-capacity arena of `T` slots with lock-free allocate/deallocate.
///
/// Every `T` is constructed once at pool construction; allocation hands out
/// exclusive use of a slot, deallocation returns it. Reuse is therefore a
/// field-reset concern of the caller, which is what lets slots hold atomics.
///
/// Slots are cache-line padded so two concurrently touched slots never share
/// a line.
pub struct BlockPool<T> {
    slots: Box<[CachePadded<Block<T>>]>,
    /// Packed `(tag, index)` head of the free stack.
    free_head: CachePadded<AtomicU64>,
}

impl<T> BlockPool<T> {
    /// Builds a pool of `capacity` slots, constructing each with `init`.
    pub fn new(capacity: usize, init: impl Fn(usize) -> T) -> Result<Self, PoolError> {
        if capacity == 0 {
            return Err(PoolError::ZeroCapacity);
        }
        if capacity >= NIL as usize {
            return Err(PoolError::CapacityOverflow(capacity));
        }

        let slots: Box<[_]> = (0..capacity)
            .map(|i| {
                let next = if i + 1 == capacity { NIL } else { (i + 1) as u32 };
                CachePadded::new(Block {
                    next_free: AtomicU32::new(next),
                    generation: AtomicU32::new(0),
                    value: init(i),
                })
            })
            .collect();

        Ok(BlockPool {
            slots,
            free_head: CachePadded::new(AtomicU64::new(pack(0, 0))),
        })
    }

    /// Takes a slot off the free list. `None` means exhausted; the pool
    /// never blocks and never grows.
    pub fn allocate(&self) -> Option<u32> {
        let mut head = self.free_head.load(Ordering::Acquire);
        loop {
            let (tag, index) = unpack(head);
            if index == NIL {
                return None;
            }
            // The Acquire on `head` pairs with the Release CAS in
            // `deallocate`, making the pusher's `next_free` store visible.
            let next = self.slots[index as usize].next_free.load(Ordering::Relaxed);
            match self.free_head.compare_exchange_weak(
                head,
                pack(tag.wrapping_add(1), next),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(index),
                Err(current) => head = current,
            }
        }
    }

    /// Returns a slot to the free list and bumps its generation.
    ///
    /// `index` must have come from [`allocate`](Self::allocate) on this pool
    /// and must not be freed twice; like the classic free list, the pool does
    /// not detect either misuse.
    pub fn deallocate(&self, index: u32) {
        let slot = &self.slots[index as usize];
        // Bump before relinking: once the slot is reachable from the free
        // list a racing `generation` reader must already see it retired.
        slot.generation.fetch_add(1, Ordering::Release);

        let mut head = self.free_head.load(Ordering::Relaxed);
        loop {
            let (tag, head_index) = unpack(head);
            slot.next_free.store(head_index, Ordering::Relaxed);
            match self.free_head.compare_exchange_weak(
                head,
                pack(tag.wrapping_add(1), index),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(current) => head = current,
            }
        }
    }

    /// Shared access to a slot's value.
    pub fn get(&self, index: u32) -> &T {
        &self.slots[index as usize].value
    }

    /// Current generation of a slot. A stored `(index, generation)` pair
    /// whose generation no longer matches refers to a recycled slot.
    pub fn generation(&self, index: u32) -> u32 {
        self.slots[index as usize].generation.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
