//! Wait-free SPSC byte ring buffer for variable-length chunk transfer.
//!
//! # Design
//!
//! The same cursor algebra as [`crate::spsc`], applied to a flat byte region
//! instead of typed slots: `head` and `tail` count *bytes* written and read
//! over the life of the stream, and a chunk of `n` bytes advances its cursor
//! by `n` in one Release store. One byte is reserved to disambiguate full
//! from empty, so the usable capacity is the constructed capacity minus one.
//!
//! Chunks are all-or-nothing on the write side: a chunk that does not fit in
//! the current free space is rejected whole, never partially copied. The
//! read side is a byte stream: a read drains up to the caller's buffer
//! size, and chunk boundaries are not preserved (callers needing framing
//! prepend a length header or use [`crate::spsc`] with an owned chunk type).
//!
//! # Ordering rationale
//!
//! Identical to the typed ring: the byte copy into the region is
//! ordered-before the Release store of `head`, and the copy out is
//! ordered-before the Release store of `tail`.

#[cfg(not(loom))]
use std::sync::atomic::{AtomicUsize, Ordering};
#[cfg(not(loom))]
use std::sync::Arc;

#[cfg(loom)]
use loom::sync::atomic::{AtomicUsize, Ordering};
#[cfg(loom)]
use loom::sync::Arc;

use std::cell::UnsafeCell;
use std::ptr;

use crossbeam_utils::CachePadded;

/// Shared byte region backing the SPSC ring buffer.
///
/// # Invariants
///
/// - `capacity` (the region length) is a power of two greater than one.
/// - `head - tail <= capacity - 1`: at least one byte stays reserved.
/// - Bytes in the logical range `[tail, head)` hold written-but-unread
///   data; only the producer writes outside it, only the consumer reads
///   inside it.
struct ByteRing {
    buf: Box<[UnsafeCell<u8>]>,
    mask: usize,

    /// Byte count written; Release-published by the writer.
    head: CachePadded<AtomicUsize>,

    /// Byte count read; Release-published by the reader.
    tail: CachePadded<AtomicUsize>,
}

impl ByteRing {
    fn new(capacity: usize) -> Self {
        assert!(
            capacity > 1,
            "ring buffer capacity must be greater than one"
        );
        assert!(
            capacity.is_power_of_two(),
            "ring buffer capacity must be a power of two"
        );

        Self {
            buf: (0..capacity).map(|_| UnsafeCell::new(0)).collect(),
            mask: capacity - 1,
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Base pointer of the byte region. `UnsafeCell<u8>` has the same
    /// layout as `u8`, so offsets address raw bytes.
    fn base(&self) -> *mut u8 {
        self.buf.as_ptr() as *mut u8
    }

    fn size(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        head.wrapping_sub(tail)
    }
}

// SAFETY: The SPSC protocol keeps writer and reader on disjoint byte
// ranges; the atomic cursors enforce the discipline.
unsafe impl Sync for ByteRing {}
unsafe impl Send for ByteRing {}

/// Creates a bounded SPSC byte ring buffer split into writer and reader.
///
/// `capacity` must be a power of two greater than one; the buffer holds at
/// most `capacity - 1` bytes.
///
/// # Panics
///
/// Panics if `capacity` is not a power of two or is less than two.
///
/// # Example
///
/// ```
/// let (mut tx, mut rx) = ringlet::spsc_buffer::channel(16);
/// assert!(tx.enqueue(b"hello"));
/// let mut out = [0u8; 16];
/// assert_eq!(rx.dequeue(&mut out), 5);
/// assert_eq!(&out[..5], b"hello");
/// ```
pub fn channel(capacity: usize) -> (SpscBufferWriter, SpscBufferReader) {
    let ring = Arc::new(ByteRing::new(capacity));
    (
        SpscBufferWriter { ring: ring.clone() },
        SpscBufferReader { ring },
    )
}

/// Producer endpoint of the byte ring buffer.
pub struct SpscBufferWriter {
    ring: Arc<ByteRing>,
}

impl SpscBufferWriter {
    /// Attempts to append the whole `chunk`, returning `false` without any
    /// copy when the chunk is empty, larger than the usable capacity, or
    /// larger than the current free space.
    ///
    /// The copy wraps across the region end in at most two segments.
    #[inline]
    pub fn enqueue(&mut self, chunk: &[u8]) -> bool {
        let ring = &*self.ring;
        let len = chunk.len();

        if len == 0 || len > ring.mask {
            return false;
        }

        let head = ring.head.load(Ordering::Relaxed);
        let tail = ring.tail.load(Ordering::Acquire);

        // Whole-chunk admission: reject unless every byte fits.
        let used = head.wrapping_sub(tail);
        if len > ring.mask - used {
            return false;
        }

        let idx = head & ring.mask;
        let first = len.min(ring.mask + 1 - idx);
        // SAFETY: [head, head + len) lies outside [tail, head), so the
        // reader does not touch these bytes until the head store below.
        // The two segments stay in bounds: idx + first <= capacity and
        // len - first < idx.
        unsafe {
            ptr::copy_nonoverlapping(chunk.as_ptr(), ring.base().add(idx), first);
            if len > first {
                ptr::copy_nonoverlapping(chunk.as_ptr().add(first), ring.base(), len - first);
            }
        }

        ring.head.store(head.wrapping_add(len), Ordering::Release);
        true
    }

    /// Usable byte capacity (constructed capacity minus the reserved byte).
    pub fn capacity(&self) -> usize {
        self.ring.mask
    }

    /// Snapshot of the pending byte count.
    pub fn size(&self) -> usize {
        self.ring.size()
    }
}

/// Consumer endpoint of the byte ring buffer.
pub struct SpscBufferReader {
    ring: Arc<ByteRing>,
}

impl SpscBufferReader {
    /// Drains up to `out.len()` pending bytes into `out`, returning the
    /// number copied (0 when the buffer or `out` is empty).
    ///
    /// Bytes arrive in stream order; chunk boundaries from the write side
    /// are not preserved.
    #[inline]
    pub fn dequeue(&mut self, out: &mut [u8]) -> usize {
        let ring = &*self.ring;

        let tail = ring.tail.load(Ordering::Relaxed);
        let head = ring.head.load(Ordering::Acquire);

        let available = head.wrapping_sub(tail);
        let len = available.min(out.len());
        if len == 0 {
            return 0;
        }

        let idx = tail & ring.mask;
        let first = len.min(ring.mask + 1 - idx);
        // SAFETY: [tail, tail + len) lies inside [tail, head), which the
        // writer will not overwrite until the tail store below.
        unsafe {
            ptr::copy_nonoverlapping(ring.base().add(idx), out.as_mut_ptr(), first);
            if len > first {
                ptr::copy_nonoverlapping(ring.base(), out.as_mut_ptr().add(first), len - first);
            }
        }

        ring.tail.store(tail.wrapping_add(len), Ordering::Release);
        len
    }

    /// Usable byte capacity (constructed capacity minus the reserved byte).
    pub fn capacity(&self) -> usize {
        self.ring.mask
    }

    /// Snapshot of the pending byte count.
    pub fn size(&self) -> usize {
        self.ring.size()
    }

    /// True when no bytes are pending (snapshot).
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}
