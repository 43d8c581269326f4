//! Lock-free bounded MPMC ring queue with a claim-then-commit cursor trio.
//!
//! # Design
//!
//! An alternative to the sequence-number ring ([`crate::mpmc`]) that keeps
//! the slots plain and pays for it with one extra cursor:
//!
//! - `head`: claim cursor. A producer CASes it forward to reserve a slot
//!   index exclusively.
//! - `middle`: commit cursor. After writing its slot, a producer advances
//!   `middle` from its claimed index to publish. Commits happen in claim
//!   order, so a producer briefly waits for earlier claimants; consumers
//!   only ever observe fully committed slots.
//! - `tail`: consume cursor. Consumers CAS it forward to take ownership
//!   of a committed slot.
//!
//! FIFO is defined by commit order: two producers claiming concurrently
//! are ordered by whoever wins the `head` CAS, not by call order.
//!
//! One slot stays reserved to keep the masked full/empty tests
//! unambiguous, so [`capacity`](MpmcCursorQueue::capacity) reports the
//! constructed capacity minus one, matching the other two-cursor rings.
//! The sequence-number variant reports its full constructed capacity.
//!
//! # Why `T: Copy`
//!
//! A consumer reads its candidate slot *before* winning the `tail` CAS; a
//! loser simply discards the copy. Restricting to plain-old-data types
//! makes that speculative read-and-discard free and keeps drop semantics
//! trivial. Non-`Copy` payloads belong in [`crate::mpmc`].
//!
//! # Progress
//!
//! Lock-free: claim CASes retry under contention and the commit step waits
//! for earlier claimants, but no OS-level blocking call is made.

#[cfg(not(loom))]
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(loom)]
use loom::sync::atomic::{AtomicUsize, Ordering};

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;

use crossbeam_utils::CachePadded;

/// Scheduler hint between retries of the commit CAS.
#[inline]
fn spin_hint() {
    #[cfg(loom)]
    loom::thread::yield_now();
    #[cfg(not(loom))]
    std::hint::spin_loop();
}

/// Bounded MPMC ring queue for `Copy` payloads, claim-then-commit protocol.
///
/// All operations take `&self`; share between threads behind an
/// [`std::sync::Arc`] (or a scoped borrow).
///
/// # Example
///
/// ```
/// use ringlet::MpmcCursorQueue;
///
/// let q = MpmcCursorQueue::with_capacity(4);
/// assert!(q.enqueue(1));
/// assert_eq!(q.dequeue(), Some(1));
/// assert_eq!(q.dequeue(), None);
/// ```
pub struct MpmcCursorQueue<T: Copy> {
    buf: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,

    /// Producer claim cursor.
    head: CachePadded<AtomicUsize>,

    /// Producer commit cursor; `[tail, middle)` is committed and readable.
    middle: CachePadded<AtomicUsize>,

    /// Consumer claim cursor.
    tail: CachePadded<AtomicUsize>,
}

// SAFETY: Slot writes are exclusive to the claim winner; speculative slot
// reads are of plain-old-data and discarded unless the tail CAS is won.
unsafe impl<T: Copy + Send> Sync for MpmcCursorQueue<T> {}
unsafe impl<T: Copy + Send> Send for MpmcCursorQueue<T> {}

impl<T: Copy> MpmcCursorQueue<T> {
    /// Creates a queue holding up to `capacity - 1` items (one slot
    /// reserved).
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not a power of two or is less than two.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 1, "ring queue capacity must be greater than one");
        assert!(
            capacity.is_power_of_two(),
            "ring queue capacity must be a power of two"
        );

        let buf = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();

        Self {
            buf,
            mask: capacity - 1,
            head: CachePadded::new(AtomicUsize::new(0)),
            middle: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Number of items the queue can hold (constructed capacity minus the
    /// reserved slot).
    pub fn capacity(&self) -> usize {
        self.mask
    }

    /// Snapshot of the current item count (claimed positions included).
    pub fn size(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    /// True when the snapshot count is zero.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Attempts to enqueue `value` from any thread; `false` means full.
    #[inline]
    pub fn enqueue(&self, value: T) -> bool {
        let mut head = self.head.load(Ordering::Relaxed);

        // Claim a slot index.
        loop {
            let tail = self.tail.load(Ordering::Acquire);

            // Full when advancing head would collide with tail (one slot
            // reserved).
            if head.wrapping_sub(tail).wrapping_add(1) & self.mask == 0 {
                return false;
            }

            match self.head.compare_exchange_weak(
                head,
                head.wrapping_add(1),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => head = current,
            }
        }

        // SAFETY: The claim win makes `head & mask` exclusively ours until
        // the commit below; consumers cannot pass `middle`.
        unsafe { (*self.buf[head & self.mask].get()).write(value) };

        // Commit in claim order: wait until every earlier claimant has
        // advanced `middle` to our claimed index, then publish.
        loop {
            match self.middle.compare_exchange_weak(
                head,
                head.wrapping_add(1),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(_) => spin_hint(),
            }
        }
    }

    /// Attempts to dequeue the oldest value from any thread, returning
    /// `None` when no committed value is available.
    #[inline]
    pub fn dequeue(&self) -> Option<T> {
        let mut tail = self.tail.load(Ordering::Relaxed);

        loop {
            let middle = self.middle.load(Ordering::Acquire);

            // Empty when no committed slot lies beyond tail.
            if middle.wrapping_sub(tail) & self.mask == 0 {
                return None;
            }

            // Speculative read: if the CAS below fails, another consumer
            // owns this slot and the copy is discarded. A racing producer
            // can only reuse the slot after `tail` advances, which happens
            // on our own success, so the volatile read is of a slot no
            // writer touches while we can still win.
            let slot = self.buf[tail & self.mask].get();
            // SAFETY: `[tail, middle)` slots are committed and initialized;
            // T: Copy makes the discarded-copy case free.
            let value = unsafe { ptr::read_volatile(slot as *const MaybeUninit<T>).assume_init() };

            match self.tail.compare_exchange_weak(
                tail,
                tail.wrapping_add(1),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(value),
                Err(current) => tail = current,
            }
        }
    }
}
