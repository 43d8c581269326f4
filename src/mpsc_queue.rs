//! Unbounded lock-free MPSC linked queue (Vyukov intrusive MPSC).
//!
//! # Design
//!
//! Producers allocate a node per value and publish it with a single atomic
//! `swap` on the shared `head` pointer; there is no CAS retry loop, so insertion
//! always succeeds in one step. The previous head is then linked to the
//! new node with a Release store of its `next` pointer.
//!
//! Insertion order at `head` is newest-first, but the consumer never walks
//! from `head`: it keeps its own `tail` cursor starting at a stub
//! (sentinel) node and follows `next` links, which run oldest-to-newest.
//! That cursor is what yields FIFO order without any reversal step. The
//! stub also keeps the empty/non-empty transition tear-free: the queue is
//! empty exactly when `tail.next` is null.
//!
//! There is a momentary window between a producer's `swap` and its `next`
//! store during which the new node is unreachable from `tail`; `dequeue`
//! simply reports "no data" and the caller retries, per the crate-wide
//! non-blocking stance.
//!
//! # Ownership
//!
//! A node is heap-allocated by the enqueuing thread and owned by the queue
//! from the moment the `swap` makes it reachable; the consumer frees each
//! node after moving its value out (the node then serves one turn as the
//! stub). Undelivered nodes are freed when the last endpoint drops.
//!
//! # Contract
//!
//! Any number of producers; exactly one consumer. The consumer endpoint is
//! unique and `dequeue` takes `&mut self`, so the single-consumer rule is
//! enforced by the type system rather than documentation alone.

#[cfg(not(loom))]
use std::sync::atomic::{AtomicPtr, Ordering};
#[cfg(not(loom))]
use std::sync::Arc;

#[cfg(loom)]
use loom::sync::atomic::{AtomicPtr, Ordering};
#[cfg(loom)]
use loom::sync::Arc;

use std::mem::MaybeUninit;
use std::ptr;

use crossbeam_utils::CachePadded;

/// Queue node. The stub's `value` is uninitialized; every other node holds
/// a live value until the consumer moves it out.
struct Node<T> {
    next: AtomicPtr<Node<T>>,
    value: MaybeUninit<T>,
}

impl<T> Node<T> {
    fn alloc(value: MaybeUninit<T>) -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            next: AtomicPtr::new(ptr::null_mut()),
            value,
        }))
    }
}

/// Shared state: producers swap `head`, the consumer advances `tail`.
struct Inner<T> {
    /// Newest node; producers publish here with one atomic exchange.
    head: CachePadded<AtomicPtr<Node<T>>>,

    /// Oldest node (the current stub); written only by the consumer.
    tail: CachePadded<AtomicPtr<Node<T>>>,
}

// SAFETY: Nodes are transferred producer -> consumer through the atomic
// protocol; values cross threads, hence T: Send.
unsafe impl<T: Send> Sync for Inner<T> {}
unsafe impl<T: Send> Send for Inner<T> {}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        // Exclusive access: free the stub, then every undelivered node
        // (dropping its value).
        unsafe {
            let stub = self.tail.load(Ordering::Relaxed);
            let mut next = (*stub).next.load(Ordering::Relaxed);
            drop(Box::from_raw(stub));

            while !next.is_null() {
                let node = next;
                next = (*node).next.load(Ordering::Relaxed);
                ptr::drop_in_place((*node).value.as_mut_ptr());
                drop(Box::from_raw(node));
            }
        }
    }
}

/// Creates an unbounded MPSC linked queue split into its endpoints.
///
/// The producer endpoint is cheaply cloneable and shareable across any
/// number of threads; the consumer endpoint is unique.
///
/// # Example
///
/// ```
/// let (tx, mut rx) = ringlet::mpsc_queue::channel::<u64>();
/// assert!(tx.enqueue(1));
/// assert!(tx.enqueue(2));
/// assert_eq!(rx.dequeue(), Some(1));
/// assert_eq!(rx.dequeue(), Some(2));
/// assert_eq!(rx.dequeue(), None);
/// ```
pub fn channel<T: Send>() -> (MpscProducer<T>, MpscConsumer<T>) {
    let stub = Node::alloc(MaybeUninit::uninit());
    let inner = Arc::new(Inner {
        head: CachePadded::new(AtomicPtr::new(stub)),
        tail: CachePadded::new(AtomicPtr::new(stub)),
    });

    (
        MpscProducer {
            inner: inner.clone(),
        },
        MpscConsumer { inner },
    )
}

/// Producer endpoint; clone one per producing thread.
pub struct MpscProducer<T: Send> {
    inner: Arc<Inner<T>>,
}

impl<T: Send> Clone for MpscProducer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send> MpscProducer<T> {
    /// Enqueues `value` from any thread.
    ///
    /// The boolean mirrors the family-wide contract that linked enqueue can
    /// fail only on node allocation failure; Rust's global allocator
    /// reports that by aborting, so in practice this always returns `true`.
    #[inline]
    pub fn enqueue(&self, value: T) -> bool {
        let node = Node::alloc(MaybeUninit::new(value));

        // One exchange makes the node the new head; the queue owns it from
        // here on.
        let prev = self.inner.head.swap(node, Ordering::AcqRel);
        // SAFETY: `prev` is a queue-owned node the consumer cannot free
        // yet: it only frees nodes *behind* a non-null next link, and
        // prev's link becomes non-null just now.
        unsafe { (*prev).next.store(node, Ordering::Release) };

        true
    }
}

/// Consumer endpoint; unique, single thread at a time.
pub struct MpscConsumer<T: Send> {
    inner: Arc<Inner<T>>,
}

impl<T: Send> MpscConsumer<T> {
    /// Dequeues the oldest value, or `None` when no linked node is
    /// reachable yet.
    #[inline]
    pub fn dequeue(&mut self) -> Option<T> {
        let inner = &*self.inner;

        // Only this thread writes `tail`.
        let tail = inner.tail.load(Ordering::Relaxed);
        // SAFETY: `tail` points at the live stub, freed only by this
        // method or by Inner::drop.
        let next = unsafe { (*tail).next.load(Ordering::Acquire) };
        if next.is_null() {
            return None;
        }

        // SAFETY: `next` was fully published (Acquire pairs with the
        // producer's Release), its value is initialized, and moving it out
        // turns the node into the new stub.
        let value = unsafe { (*next).value.assume_init_read() };
        inner.tail.store(next, Ordering::Release);

        // SAFETY: The old stub is unreachable from any producer or from
        // `tail` now; its value was consumed on a previous call (or never
        // set, for the initial stub).
        unsafe { drop(Box::from_raw(tail)) };

        Some(value)
    }

    /// True when no linked node is currently reachable (a concurrent
    /// producer may be mid-publish).
    pub fn is_empty(&self) -> bool {
        let tail = self.inner.tail.load(Ordering::Relaxed);
        // SAFETY: The stub is live for the lifetime of the endpoints.
        unsafe { (*tail).next.load(Ordering::Acquire).is_null() }
    }
}


#[cfg(all(test, feature = "proptest-tests", not(loom)))]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    const PROPTEST_CASES: u32 = 32;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(
            crate::test_utils::proptest_cases(PROPTEST_CASES)
        ))]

        /// Single-threaded, the queue is an unbounded FIFO.
        #[test]
        fn shadow_model(ops in proptest::collection::vec(prop::bool::ANY, 0..400)) {
            let (tx, mut rx) = channel::<u32>();
            let mut shadow = VecDeque::new();
            let mut next = 0u32;

            for &push in &ops {
                if push {
                    prop_assert!(tx.enqueue(next));
                    shadow.push_back(next);
                    next += 1;
                } else {
                    match rx.dequeue() {
                        Some(v) => prop_assert_eq!(Some(v), shadow.pop_front()),
                        None => prop_assert!(shadow.is_empty()),
                    }
                }
            }
        }
    }
}
