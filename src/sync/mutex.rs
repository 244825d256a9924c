//! Scoped mutual exclusion, condition waits and a counting semaphore.
//!
//! On host and ESP-IDF targets these sit on `std::sync` (pthreads, which
//! ESP-IDF maps onto FreeRTOS primitives). Guards release on every exit
//! path, including unwinding. A poisoned lock is recovered rather than
//! propagated: the data behind these locks is plain bookkeeping that stays
//! consistent across a panicking callback.

use std::sync::{Condvar, MutexGuard as StdGuard, PoisonError};
use std::time::{Duration, Instant};

/// Guard returned by [`Mutex::lock`].
pub type MutexGuard<'a, T> = StdGuard<'a, T>;

// ═══════════════════════════════════════════════════════════════
//  Mutex
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct Mutex<T> {
    inner: std::sync::Mutex<T>,
}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: std::sync::Mutex::new(value),
        }
    }

    /// Block until the lock is held.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the lock only if it is free right now.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        match self.inner.try_lock() {
            Ok(guard) => Some(guard),
            Err(std::sync::TryLockError::Poisoned(p)) => Some(p.into_inner()),
            Err(std::sync::TryLockError::WouldBlock) => None,
        }
    }

    /// Run `f` with the lock held.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

// ═══════════════════════════════════════════════════════════════
//  WaitCondition
// ═══════════════════════════════════════════════════════════════

/// Condition wait paired with a [`Mutex`].
#[derive(Debug, Default)]
pub struct WaitCondition {
    cv: Condvar,
}

impl WaitCondition {
    pub const fn new() -> Self {
        Self { cv: Condvar::new() }
    }

    /// Block while `condition` holds.
    pub fn wait_while<'a, T>(
        &self,
        guard: MutexGuard<'a, T>,
        condition: impl FnMut(&mut T) -> bool,
    ) -> MutexGuard<'a, T> {
        self.cv
            .wait_while(guard, condition)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Block while `condition` holds, at most `timeout`.
    ///
    /// Returns the guard and `true` if the wait ended by timing out with
    /// the condition still holding.
    pub fn wait_timeout_while<'a, T>(
        &self,
        guard: MutexGuard<'a, T>,
        timeout: Duration,
        condition: impl FnMut(&mut T) -> bool,
    ) -> (MutexGuard<'a, T>, bool) {
        let (guard, result) = self
            .cv
            .wait_timeout_while(guard, timeout, condition)
            .unwrap_or_else(PoisonError::into_inner);
        (guard, result.timed_out())
    }

    pub fn notify_one(&self) {
        self.cv.notify_one();
    }

    pub fn notify_all(&self) {
        self.cv.notify_all();
    }
}

// ═══════════════════════════════════════════════════════════════
//  Semaphore
// ═══════════════════════════════════════════════════════════════

/// Counting semaphore.
#[derive(Debug, Default)]
pub struct Semaphore {
    count: Mutex<usize>,
    changed: WaitCondition,
}

impl Semaphore {
    pub const fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            changed: WaitCondition::new(),
        }
    }

    /// Add one permit.
    pub fn release(&self) {
        self.release_n(1);
    }

    pub fn release_n(&self, n: usize) {
        let mut count = self.count.lock();
        *count += n;
        drop(count);
        self.changed.notify_all();
    }

    /// Take one permit, blocking until available.
    pub fn acquire(&self) {
        self.acquire_n(1);
    }

    /// Take `n` permits at once, blocking until all are available.
    pub fn acquire_n(&self, n: usize) {
        let count = self.count.lock();
        let mut count = self.changed.wait_while(count, |c| *c < n);
        *count -= n;
    }

    /// Take `n` permits, giving up after `timeout`. Returns `true` on success.
    pub fn acquire_n_timeout(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count < n {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self.changed.wait_timeout_while(count, deadline - now, |c| *c < n);
            count = guard;
        }
        *count -= n;
        true
    }

    /// Take one permit if available.
    pub fn try_acquire(&self) -> bool {
        let mut count = self.count.lock();
        if *count == 0 {
            return false;
        }
        *count -= 1;
        true
    }

    pub fn available(&self) -> usize {
        *self.count.lock()
    }
}

// ── Tests ────────────────────────────────────────────────────
