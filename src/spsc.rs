//! Wait-free SPSC (single-producer, single-consumer) bounded ring queue.
//!
//! # Design
//!
//! Two monotonically increasing cursors over a power-of-two slot array:
//! `head` is the next slot to write (producer-owned), `tail` the next slot
//! to read (consumer-owned). One slot is permanently reserved so that
//! `head == tail` unambiguously means empty; the reported [`capacity`]
//! is therefore the constructed capacity minus one.
//!
//! [`capacity`]: SpscProducer::capacity
//!
//! # Key properties
//!
//! - **Wait-free**: both `enqueue` and `dequeue` complete in bounded steps.
//! - **No CAS**: with exactly one producer and one consumer, a single
//!   Acquire/Release pair of plain atomic loads and stores per cursor
//!   suffices. On x86-64 TSO these compile to plain `MOV`.
//! - **Cached remote cursor**: the producer caches the consumer's `tail`
//!   locally and only reloads it on apparent-full; the consumer caches the
//!   producer's `head` and only reloads on apparent-empty. This reduces
//!   cross-core cache-coherence traffic.
//! - **Cache-line padded**: `head` and `tail` live on separate cache lines
//!   to prevent false sharing between the two threads.
//! - **Power-of-2 capacity**: bitwise AND masking for O(1) slot indexing.
//!
//! # Ordering rationale
//!
//! ```text
//! Producer writes slot, then Release-stores head  →  consumer Acquire-loads head, then reads slot
//! Consumer reads slot, then Release-stores tail   →  producer Acquire-loads tail, then writes slot
//! ```
//!
//! This establishes happens-before between slot write and slot read in both
//! directions.
//!
//! # Safety
//!
//! Uses `unsafe` for `MaybeUninit` slot access. The cursor protocol ensures
//! producer and consumer never touch the same slot concurrently: a slot is
//! written only while it is outside `[tail, head)` and read only while it is
//! inside. Run under Miri/loom to validate.

#[cfg(not(loom))]
use std::sync::atomic::{AtomicUsize, Ordering};
#[cfg(not(loom))]
use std::sync::Arc;

#[cfg(loom)]
use loom::sync::atomic::{AtomicUsize, Ordering};
#[cfg(loom)]
use loom::sync::Arc;

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

use crossbeam_utils::CachePadded;

/// Shared storage backing the SPSC ring queue.
///
/// # Invariants
///
/// - `buf.len()` is a power of two greater than one.
/// - `head` and `tail` increase monotonically and wrap via `mask` only at
///   the point of slot indexing, never in the atomic itself (no ABA).
/// - `head - tail <= mask` at all times (one slot stays reserved).
/// - Slots in the logical range `[tail, head)` are initialized; all other
///   slots are uninitialized.
/// - Only the producer writes `head`; only the consumer writes `tail`.
struct SpscRing<T> {
    buf: Box<[UnsafeCell<MaybeUninit<T>>]>,
    /// Bitmask for power-of-2 modulo: `cursor & mask == cursor % capacity`.
    mask: usize,

    /// Producer's write cursor. Release-stored by the producer after the
    /// slot write; Acquire-loaded by the consumer to detect data.
    head: CachePadded<AtomicUsize>,

    /// Consumer's read cursor. Release-stored by the consumer after the
    /// slot read; Acquire-loaded by the producer to detect free space.
    tail: CachePadded<AtomicUsize>,
}

impl<T> SpscRing<T> {
    fn new(capacity: usize) -> Self {
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
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Relaxed cursor snapshot; exact only when no operation is in flight.
    fn size(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        head.wrapping_sub(tail)
    }
}

// SAFETY: The SPSC protocol ensures producer and consumer access disjoint
// slots; the atomic cursors enforce the access discipline.
unsafe impl<T: Send> Sync for SpscRing<T> {}
unsafe impl<T: Send> Send for SpscRing<T> {}

impl<T> Drop for SpscRing<T> {
    fn drop(&mut self) {
        // Drop any undelivered items. We have exclusive access here.
        let head = self.head.load(Ordering::Relaxed);
        let mut tail = self.tail.load(Ordering::Relaxed);

        while tail != head {
            let slot = tail & self.mask;
            // SAFETY: Slots in [tail, head) are initialized.
            unsafe { (*self.buf[slot].get()).assume_init_drop() };
            tail = tail.wrapping_add(1);
        }
    }
}

/// Creates a bounded SPSC ring queue and splits it into its two endpoints.
///
/// `capacity` must be a power of two greater than one. One slot is reserved
/// to disambiguate full from empty, so the queue holds at most
/// `capacity - 1` items.
///
/// Both endpoints are `Send` and may be moved to different threads; the
/// `&mut self` receivers enforce the single-producer/single-consumer
/// contract in the type system. The ring (and any undelivered items) is
/// reclaimed when both endpoints are dropped.
///
/// # Panics
///
/// Panics if `capacity` is not a power of two or is less than two.
///
/// # Example
///
/// ```
/// let (mut tx, mut rx) = ringlet::spsc::channel::<u64>(8);
/// tx.enqueue(42).unwrap();
/// assert_eq!(rx.dequeue(), Some(42));
/// ```
pub fn channel<T: Send>(capacity: usize) -> (SpscProducer<T>, SpscConsumer<T>) {
    let ring = Arc::new(SpscRing::new(capacity));

    let producer = SpscProducer {
        ring: ring.clone(),
        cached_tail: 0,
    };
    let consumer = SpscConsumer {
        ring,
        cached_head: 0,
    };

    (producer, consumer)
}

/// Producer endpoint of the SPSC ring queue.
///
/// Holds a cached copy of the consumer's `tail` cursor, refreshed only when
/// the ring appears full.
pub struct SpscProducer<T: Send> {
    ring: Arc<SpscRing<T>>,
    cached_tail: usize,
}

impl<T: Send> SpscProducer<T> {
    /// Attempts to enqueue `value`, returning `Err(value)` when the ring is
    /// full so the caller keeps ownership.
    ///
    /// # Ordering
    ///
    /// 1. Read `head` (Relaxed; we are its only writer).
    /// 2. If the ring looks full against the cached `tail`, reload `tail`
    ///    with Acquire to pick up consumer progress.
    /// 3. Write the value into slot `head & mask`.
    /// 4. Release-store `head + 1` to publish the slot.
    #[inline]
    pub fn enqueue(&mut self, value: T) -> Result<(), T> {
        let ring = &*self.ring;
        let head = ring.head.load(Ordering::Relaxed);

        // Full when head - tail == mask (one slot stays reserved). A stale
        // cached tail can only under-report free space, never over-report.
        if head.wrapping_sub(self.cached_tail) >= ring.mask {
            self.cached_tail = ring.tail.load(Ordering::Acquire);
            if head.wrapping_sub(self.cached_tail) >= ring.mask {
                return Err(value);
            }
        }

        let slot = head & ring.mask;
        // SAFETY: The slot is outside [tail, head), so the consumer will not
        // read it until the head store below publishes it.
        unsafe { (*ring.buf[slot].get()).write(value) };

        ring.head.store(head.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Number of items the queue can hold (constructed capacity minus the
    /// reserved slot).
    pub fn capacity(&self) -> usize {
        self.ring.mask
    }

    /// Snapshot of the current item count.
    pub fn size(&self) -> usize {
        self.ring.size()
    }
}

/// Consumer endpoint of the SPSC ring queue.
///
/// Holds a cached copy of the producer's `head` cursor, refreshed only when
/// the ring appears empty.
pub struct SpscConsumer<T: Send> {
    ring: Arc<SpscRing<T>>,
    cached_head: usize,
}

impl<T: Send> SpscConsumer<T> {
    /// Attempts to dequeue the oldest value, returning `None` when the ring
    /// is empty.
    ///
    /// # Ordering
    ///
    /// 1. Read `tail` (Relaxed; we are its only writer).
    /// 2. If the ring looks empty against the cached `head`, reload `head`
    ///    with Acquire to pick up producer progress.
    /// 3. Read the value from slot `tail & mask`.
    /// 4. Release-store `tail + 1` to free the slot.
    #[inline]
    pub fn dequeue(&mut self) -> Option<T> {
        let ring = &*self.ring;
        let tail = ring.tail.load(Ordering::Relaxed);

        if tail == self.cached_head {
            self.cached_head = ring.head.load(Ordering::Acquire);
            if tail == self.cached_head {
                return None;
            }
        }

        let slot = tail & ring.mask;
        // SAFETY: The slot is inside [tail, head), hence initialized; the
        // producer will not overwrite it until the tail store below.
        let value = unsafe { (*ring.buf[slot].get()).assume_init_read() };

        ring.tail.store(tail.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// Number of items the queue can hold (constructed capacity minus the
    /// reserved slot).
    pub fn capacity(&self) -> usize {
        self.ring.mask
    }

    /// Snapshot of the current item count.
    pub fn size(&self) -> usize {
        self.ring.size()
    }

    /// True when no items are pending (snapshot).
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}



#[cfg(all(test, loom))]
mod loom_tests {
    use super::*;
    use loom::thread;

    /// Loom exhaustively schedules a producer pushing K items against a
    /// consumer popping until K received; FIFO must hold in every
    /// interleaving.
    #[test]
    fn loom_spsc_fifo() {
        const K: u64 = 3;

        loom::model(|| {
            let (mut tx, mut rx) = channel::<u64>(4);

            let producer = thread::spawn(move || {
                for i in 0..K {
                    let mut item = i;
                    loop {
                        match tx.enqueue(item) {
                            Ok(()) => break,
                            Err(back) => {
                                item = back;
                                loom::thread::yield_now();
                            }
                        }
                    }
                }
            });

            let mut received = Vec::new();
            while received.len() < K as usize {
                match rx.dequeue() {
                    Some(v) => received.push(v),
                    None => loom::thread::yield_now(),
                }
            }

            producer.join().unwrap();
            assert_eq!(received, vec![0, 1, 2]);
        });
    }

    /// A capacity-2 ring (one usable slot) forces the full path on every
    /// second push; loom verifies the retry handshake.
    #[test]
    fn loom_spsc_full_retry() {
        loom::model(|| {
            let (mut tx, mut rx) = channel::<u64>(2);

            let producer = thread::spawn(move || {
                for i in 0..3u64 {
                    let mut item = i;
                    loop {
                        match tx.enqueue(item) {
                            Ok(()) => break,
                            Err(back) => {
                                item = back;
                                loom::thread::yield_now();
                            }
                        }
                    }
                }
            });

            let mut received = Vec::new();
            while received.len() < 3 {
                match rx.dequeue() {
                    Some(v) => received.push(v),
                    None => loom::thread::yield_now(),
                }
            }

            producer.join().unwrap();
            assert_eq!(received, vec![0, 1, 2]);
        });
    }
}
