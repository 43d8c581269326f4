//! Lock-free bounded MPMC ring queue with per-slot sequence numbers.
//!
//! # Design
//!
//! Vyukov's bounded MPMC queue: every slot carries a sequence number,
//! initialized to the slot's own index, that identifies which
//! production/consumption cycle currently owns the slot. A producer whose
//! `head` cursor matches the slot's sequence knows the slot is free for
//! this write cycle; it claims the position by CAS on the *cursor* (not
//! the slot), writes the value, and bumps the sequence to `head + 1` to
//! hand the slot to consumers. Consumers mirror the protocol on `tail`
//! with expected sequence `tail + 1`, releasing the slot for the next
//! write cycle with `tail + capacity`.
//!
//! Ownership is arbitrated purely by sequence comparison; the payload is
//! never inspected. Unlike the two-cursor rings in this crate, no slot is
//! reserved: the reported [`capacity`](MpmcRingQueue::capacity) equals the
//! constructed capacity.
//!
//! # Progress
//!
//! Lock-free, not wait-free: the claim CAS can fail under contention and
//! retry indefinitely in theory, but some thread always completes and no
//! OS-level blocking call is ever made.
//!
//! # Safety
//!
//! A slot's value cell is only touched by the unique thread that moved the
//! matching sequence number into its claim window, so accesses are
//! data-race free despite the `&self` API.

#[cfg(not(loom))]
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(loom)]
use loom::sync::atomic::{AtomicUsize, Ordering};

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

use crossbeam_utils::CachePadded;

/// One ring slot: the arbitration sequence and the payload cell.
struct Slot<T> {
    /// Slot state encoded relative to the cursors:
    /// `seq == pos`:     empty, free for the producer claiming `pos`.
    /// `seq == pos + 1`: full, readable by the consumer claiming `pos`.
    /// anything else:    in transition or a later cycle.
    sequence: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Bounded multi-producer/multi-consumer ring queue.
///
/// All operations take `&self`; share the queue between threads behind an
/// [`std::sync::Arc`] (or a scoped borrow).
///
/// # Example
///
/// ```
/// use ringlet::MpmcRingQueue;
///
/// let q = MpmcRingQueue::with_capacity(4);
/// assert!(q.enqueue(1).is_ok());
/// assert_eq!(q.dequeue(), Some(1));
/// assert_eq!(q.dequeue(), None);
/// ```
pub struct MpmcRingQueue<T> {
    buf: Box<[Slot<T>]>,
    mask: usize,

    /// Producer claim cursor.
    head: CachePadded<AtomicUsize>,

    /// Consumer claim cursor.
    tail: CachePadded<AtomicUsize>,
}

// SAFETY: Slot access is serialized by the sequence protocol; values move
// between threads, hence T: Send.
unsafe impl<T: Send> Sync for MpmcRingQueue<T> {}
unsafe impl<T: Send> Send for MpmcRingQueue<T> {}

impl<T> MpmcRingQueue<T> {
    /// Creates a queue holding up to `capacity` items.
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
            .map(|i| Slot {
                sequence: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();

        Self {
            buf,
            mask: capacity - 1,
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Number of items the queue can hold. No slot is reserved in this
    /// variant, so this equals the constructed capacity.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Snapshot of the current item count; may be stale under concurrent
    /// operations.
    pub fn size(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    /// True when the snapshot count is zero.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Attempts to enqueue `value` from any thread, returning `Err(value)`
    /// when the queue is full.
    #[inline]
    pub fn enqueue(&self, value: T) -> Result<(), T> {
        let mut head = self.head.load(Ordering::Relaxed);

        loop {
            let slot = &self.buf[head & self.mask];
            let seq = slot.sequence.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(head) as isize;

            if diff == 0 {
                // Slot is free for this cycle; claim the position by moving
                // the cursor. Weak CAS: spurious failure just re-loops.
                match self.head.compare_exchange_weak(
                    head,
                    head.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: Winning the CAS gives this thread sole
                        // ownership of the slot until the sequence store.
                        unsafe { (*slot.value.get()).write(value) };
                        slot.sequence.store(head.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => head = current,
                }
            } else if diff < 0 {
                // Sequence lags the cursor: the slot still holds the value
                // from the previous cycle, so the ring is full.
                return Err(value);
            } else {
                // Another producer claimed this position; chase the cursor.
                head = self.head.load(Ordering::Relaxed);
            }
        }
    }

    /// Attempts to dequeue the oldest value from any thread, returning
    /// `None` when the queue is empty.
    #[inline]
    pub fn dequeue(&self) -> Option<T> {
        let mut tail = self.tail.load(Ordering::Relaxed);

        loop {
            let slot = &self.buf[tail & self.mask];
            let seq = slot.sequence.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(tail.wrapping_add(1)) as isize;

            if diff == 0 {
                match self.tail.compare_exchange_weak(
                    tail,
                    tail.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: Winning the CAS gives this thread sole
                        // ownership of the initialized slot.
                        let value = unsafe { (*slot.value.get()).assume_init_read() };
                        // Release the slot for the producer one full cycle
                        // ahead.
                        slot.sequence
                            .store(tail.wrapping_add(self.mask).wrapping_add(1), Ordering::Release);
                        return Some(value);
                    }
                    Err(current) => tail = current,
                }
            } else if diff < 0 {
                // Slot not yet published for this cycle: queue is empty.
                return None;
            } else {
                tail = self.tail.load(Ordering::Relaxed);
            }
        }
    }
}

impl<T> Drop for MpmcRingQueue<T> {
    fn drop(&mut self) {
        // Exclusive access: every position in [tail, head) holds an
        // undelivered, initialized value.
        let head = self.head.load(Ordering::Relaxed);
        let mut tail = self.tail.load(Ordering::Relaxed);

        while tail != head {
            let slot = &self.buf[tail & self.mask];
            // SAFETY: See above; no other thread can exist during drop.
            unsafe { (*slot.value.get()).assume_init_drop() };
            tail = tail.wrapping_add(1);
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn empty_dequeue_returns_none() {
        let q = MpmcRingQueue::<u64>::with_capacity(4);
        assert_eq!(q.dequeue(), None);
        assert!(q.is_empty());
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn non_power_of_two_capacity_panics() {
        let _ = MpmcRingQueue::<u64>::with_capacity(10);
    }

    #[test]
    fn full_capacity_no_reserved_slot() {
        // The sequence-number design uses every slot: capacity 4 accepts 4.
        let q = MpmcRingQueue::<u64>::with_capacity(4);
        assert_eq!(q.capacity(), 4);

        for i in 0..4u64 {
            assert!(q.enqueue(i).is_ok());
        }
        assert_eq!(q.enqueue(4), Err(4));

        // One dequeue frees exactly one slot.
        assert_eq!(q.dequeue(), Some(0));
        assert!(q.enqueue(4).is_ok());
        assert_eq!(q.enqueue(5), Err(5));
    }

    #[test]
    fn single_thread_fifo() {
        let q = MpmcRingQueue::<u64>::with_capacity(8);

        for round in 0..16u64 {
            let base = round * 5;
            for i in 0..5 {
                assert!(q.enqueue(base + i).is_ok());
            }
            for i in 0..5 {
                assert_eq!(q.dequeue(), Some(base + i));
            }
            assert_eq!(q.dequeue(), None);
        }
    }

    #[test]
    fn drop_undelivered_items() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let drops = Arc::new(AtomicUsize::new(0));

        struct DropTracker(Arc<AtomicUsize>);
        impl Drop for DropTracker {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }

        {
            let q = MpmcRingQueue::with_capacity(8);
            for _ in 0..6 {
                assert!(q.enqueue(DropTracker(drops.clone())).is_ok());
            }
            assert!(q.dequeue().is_some());
            // 5 undelivered values dropped with the queue, plus the one
            // delivered above.
        }

        assert_eq!(drops.load(Ordering::Relaxed), 6);
    }

    #[test]
    fn multi_producer_multi_consumer_multiset() {
        const PRODUCERS: u64 = 4;
        const CONSUMERS: usize = 3;
        const PER_PRODUCER: u64 = 10_000;

        let q = Arc::new(MpmcRingQueue::<u64>::with_capacity(64));
        let mut handles = Vec::new();

        for p in 0..PRODUCERS {
            let q = q.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    let mut item = p * PER_PRODUCER + i;
                    loop {
                        match q.enqueue(item) {
                            Ok(()) => break,
                            Err(back) => {
                                item = back;
                                std::thread::yield_now();
                            }
                        }
                    }
                }
            }));
        }

        let mut consumers = Vec::new();
        for _ in 0..CONSUMERS {
            let q = q.clone();
            consumers.push(std::thread::spawn(move || {
                let mut got = Vec::new();
                loop {
                    match q.dequeue() {
                        Some(u64::MAX) => break,
                        Some(v) => got.push(v),
                        None => std::thread::yield_now(),
                    }
                }
                got
            }));
        }

        for h in handles {
            h.join().unwrap();
        }
        // Poison pills stop the consumers.
        for _ in 0..CONSUMERS {
            loop {
                match q.enqueue(u64::MAX) {
                    Ok(()) => break,
                    Err(_) => std::thread::yield_now(),
                }
            }
        }

        let mut all = HashSet::new();
        let mut per_producer_last: Vec<Vec<u64>> = vec![Vec::new(); PRODUCERS as usize];
        for h in consumers {
            for v in h.join().unwrap() {
                assert!(all.insert(v), "value {v} delivered twice");
                per_producer_last[(v / PER_PRODUCER) as usize].push(v);
            }
        }
        assert_eq!(all.len(), (PRODUCERS * PER_PRODUCER) as usize);

        // Per-consumer interleaving is free, but every producer's values
        // must all arrive.
        for (p, values) in per_producer_last.iter().enumerate() {
            assert_eq!(values.len(), PER_PRODUCER as usize, "producer {p} lost values");
        }
    }
}
