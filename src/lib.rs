//! Wait-free and lock-free inter-thread communication primitives.
//!
//! ## Scope
//! This crate moves values between caller-owned threads without blocking.
//! Every primitive is a plain data structure: there is no internal thread
//! creation, no async suspension, and no OS-level blocking call anywhere.
//! An operation either completes or returns "would block" (`Err`/`None`/
//! `false`), leaving the retry strategy entirely to the caller.
//!
//! ## The family
//! - [`spsc`]: bounded single-producer/single-consumer ring queue. Wait-free;
//!   one Acquire/Release pair per operation, no CAS. Lowest latency.
//! - [`spsc_buffer`]: the same index algebra over a flat byte region, for
//!   variable-length chunk transfer. A chunk either fully fits or is fully
//!   rejected.
//! - [`mpmc`]: bounded multi-producer/multi-consumer ring with per-slot
//!   sequence numbers (Vyukov's bounded MPMC). Lock-free.
//! - [`mpmc_cursor`]: bounded MPMC ring with a three-cursor
//!   claim-then-commit protocol instead of per-slot metadata. Lock-free.
//! - [`mpsc_queue`]: unbounded multi-producer/single-consumer linked queue.
//!   Producers publish with a single atomic swap; the consumer drains FIFO.
//! - [`mpsc_batcher`]: same production side, but the consumer detaches the
//!   entire pending chain in one exchange and processes it as an ordered
//!   batch.
//! - [`spin`]: a bare boolean spin lock, the simplest primitive in the
//!   family.
//!
//! ## Key invariants
//! - Ring capacities are powers of two; slot index is `counter & (cap - 1)`.
//!   Counters increase monotonically (wrapping), so indices never suffer ABA.
//! - Values are published with Release stores and observed with Acquire
//!   loads; slot ownership is arbitrated by counters or sequence numbers,
//!   never by inspecting the payload.
//! - FIFO order is per queue instance and defined by enqueue *completion*
//!   order: two producers racing for the same logical slot are ordered by
//!   whichever wins the atomic increment, not by wall-clock call order.
//! - Independently-written atomics are separated by cache-line padding
//!   (`crossbeam_utils::CachePadded`) so producer and consumer cache lines
//!   never false-share.
//!
//! ## Error model
//! "Full" and "empty" are expected, high-frequency outcomes and are signaled
//! by return values, never panics. Construction-time contract violations
//! (non-power-of-two capacity) are programming errors and panic at
//! construction. The hot paths carry no logging.
//!
//! ## Verification
//! Each concurrent module carries inline unit tests, a `loom` interleaving
//! model (`RUSTFLAGS="--cfg loom" cargo test`), and proptest shadow models
//! behind the `proptest-tests` feature.

pub mod mpmc;
pub mod mpmc_cursor;
pub mod mpsc_batcher;
pub mod mpsc_queue;
pub mod spin;
pub mod spsc;
pub mod spsc_buffer;

#[cfg(test)]
pub mod test_utils;

pub use mpmc::MpmcRingQueue;
pub use mpmc_cursor::MpmcCursorQueue;
pub use mpsc_batcher::{BatchConsumer, BatchProducer};
pub use mpsc_queue::{MpscConsumer, MpscProducer};
pub use spin::{SpinLock, SpinLockGuard};
pub use spsc::{SpscConsumer, SpscProducer};
pub use spsc_buffer::{SpscBufferReader, SpscBufferWriter};
