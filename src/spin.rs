//! Spin lock: a bare boolean exclusion flag.
//!
//! # Design
//!
//! The simplest primitive in the family: one `AtomicBool`, `false` =
//! unlocked, `true` = locked. Acquisition is a single
//! `exchange(true, Acquire)`; release is a `store(false, Release)`.
//!
//! There is no owner tracking: the lock is not reentrant, and any thread
//! may unlock a lock it did not acquire. Unlocking a lock that is not held
//! is a caller error with benign (memory-safe) effect. This is a bare
//! exclusion flag, not a mutex: it protects no data of its own. Pair it
//! with [`SpinLockGuard`] for scope-bound release.
//!
//! # When (not) to use
//!
//! Contending threads busy-wait and burn CPU instead of descheduling.
//! [`lock`](SpinLock::lock) spins unboundedly and never yields scheduling
//! priority to the holder; do not use it under real-time or
//! priority-inversion-sensitive conditions. The bounded variants
//! ([`try_lock`](SpinLock::try_lock), [`try_lock_spin`](SpinLock::try_lock_spin),
//! [`try_lock_for`](SpinLock::try_lock_for)) let the caller own the
//! waiting policy, per the crate-wide non-blocking stance.

#[cfg(not(loom))]
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(loom)]
use loom::sync::atomic::{AtomicBool, Ordering};

use std::time::{Duration, Instant};

use crossbeam_utils::Backoff;

/// Boolean spin lock. `Default` is unlocked.
pub struct SpinLock {
    flag: AtomicBool,
}

impl SpinLock {
    /// Creates an unlocked spin lock.
    pub fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
        }
    }

    /// True when the lock is currently held (by anyone). Never blocks.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// One acquisition attempt; never spins, never blocks.
    #[inline]
    pub fn try_lock(&self) -> bool {
        !self.flag.swap(true, Ordering::Acquire)
    }

    /// Retries acquisition up to `spin` additional times, with a spin/yield
    /// hint between attempts. `spin == 0` is exactly one attempt.
    pub fn try_lock_spin(&self, spin: u64) -> bool {
        let backoff = Backoff::new();
        let mut remaining = spin;

        // At least one attempt regardless of the spin budget.
        loop {
            if self.try_lock() {
                return true;
            }
            if remaining == 0 {
                return false;
            }
            remaining -= 1;
            backoff.spin();
        }
    }

    /// Retries acquisition until roughly `timeout` has elapsed.
    ///
    /// Bounded by wall clock, not attempt count; makes at least one
    /// attempt even for a zero timeout.
    pub fn try_lock_for(&self, timeout: Duration) -> bool {
        self.try_lock_until(Instant::now() + timeout)
    }

    /// Retries acquisition until `deadline`; at least one attempt.
    pub fn try_lock_until(&self, deadline: Instant) -> bool {
        let backoff = Backoff::new();

        loop {
            if self.try_lock() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            backoff.snooze();
        }
    }

    /// Spins until the lock is acquired. Unbounded; the backoff escalates
    /// from busy-spin to cooperative yield but never sleeps or parks.
    pub fn lock(&self) {
        let backoff = Backoff::new();
        while !self.try_lock() {
            // Test-and-test-and-set: spin on the cheap load and only retry
            // the exchange once the flag reads free.
            while self.is_locked() {
                backoff.snooze();
            }
        }
    }

    /// Unconditionally releases the lock. Any thread may call this,
    /// including one that did not acquire it.
    #[inline]
    pub fn unlock(&self) {
        self.flag.store(false, Ordering::Release);
    }

    /// Acquires (spinning unboundedly) and returns a guard that unlocks on
    /// drop.
    pub fn lock_guard(&self) -> SpinLockGuard<'_> {
        self.lock();
        SpinLockGuard { lock: self }
    }

    /// Single acquisition attempt returning a scope guard on success.
    pub fn try_lock_guard(&self) -> Option<SpinLockGuard<'_>> {
        if self.try_lock() {
            Some(SpinLockGuard { lock: self })
        } else {
            None
        }
    }
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the borrowed [`SpinLock`] when dropped.
pub struct SpinLockGuard<'a> {
    lock: &'a SpinLock,
}

impl Drop for SpinLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}
