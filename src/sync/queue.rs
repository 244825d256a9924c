//! Bounded FIFO with blocking, non-blocking and interrupt-safe variants.
//!
//! Storage is an `embassy-sync` channel guarded by a critical section.
//!
//! - `enqueue_from_isr` / `dequeue_from_isr` touch nothing but the channel
//!   and are safe from ISR / timer-callback context.
//! - `try_enqueue` / `try_dequeue` never block either, and additionally
//!   signal a parked peer. They take no lock, but the signal uses a
//!   condition variable, so they belong in thread context.
//! - The blocking variants park on a [`WaitCondition`] in slices of at most
//!   [`WAKE_SLICE`] and re-check the channel after each one, so values moved
//!   without a signal are still picked up.
//!
//! ```text
//!   producer ──try_enqueue──▶ ┌──────────────┐ ──dequeue──▶ consumer
//!   ISR ──enqueue_from_isr──▶ │ Channel<T, N>│  (blocks)
//!                             └──────────────┘
//! ```

use core::sync::atomic::{AtomicUsize, Ordering};
use core::time::Duration;
use std::time::Instant;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};

use super::mutex::{Mutex, WaitCondition};

/// Longest a blocked caller sleeps before looking at the channel again.
pub const WAKE_SLICE: Duration = Duration::from_millis(5);

pub struct Queue<T, const N: usize> {
    channel: Channel<CriticalSectionRawMutex, T, N>,
    /// Mutex the wait conditions park on. Never taken by the fast paths.
    gate: Mutex<()>,
    readable: WaitCondition,
    writable: WaitCondition,
    /// Callers parked in `dequeue*` / `enqueue`.
    readers: AtomicUsize,
    writers: AtomicUsize,
}

impl<T, const N: usize> Queue<T, N> {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            gate: Mutex::new(()),
            readable: WaitCondition::new(),
            writable: WaitCondition::new(),
            readers: AtomicUsize::new(0),
            writers: AtomicUsize::new(0),
        }
    }

    /// Interrupt-safe enqueue: a critical section around the channel and
    /// nothing else. Hands the value back when full.
    pub fn enqueue_from_isr(&self, value: T) -> Result<(), T> {
        self.channel.try_send(value).map_err(|TrySendError::Full(v)| v)
    }

    /// Interrupt-safe dequeue; `None` when empty.
    pub fn dequeue_from_isr(&self) -> Option<T> {
        self.channel.try_receive().ok()
    }

    /// Non-blocking enqueue that wakes a parked reader. Hands the value
    /// back when full.
    pub fn try_enqueue(&self, value: T) -> Result<(), T> {
        self.enqueue_from_isr(value)?;
        if self.readers.load(Ordering::SeqCst) > 0 {
            self.readable.notify_one();
        }
        Ok(())
    }

    /// Non-blocking dequeue that wakes a parked writer; `None` when empty.
    pub fn try_dequeue(&self) -> Option<T> {
        let value = self.dequeue_from_isr()?;
        if self.writers.load(Ordering::SeqCst) > 0 {
            self.writable.notify_one();
        }
        Some(value)
    }

    /// Enqueue, blocking while the queue is full.
    pub fn enqueue(&self, mut value: T) {
        loop {
            match self.try_enqueue(value) {
                Ok(()) => return,
                Err(v) => value = v,
            }
            self.park(&self.writers, &self.writable, WAKE_SLICE, || {
                self.channel.is_full()
            });
        }
    }

    /// Dequeue, blocking until a value is available.
    pub fn dequeue(&self) -> T {
        loop {
            if let Some(value) = self.try_dequeue() {
                return value;
            }
            self.park(&self.readers, &self.readable, WAKE_SLICE, || {
                self.channel.is_empty()
            });
        }
    }

    /// Dequeue, giving up after `timeout`.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(value) = self.try_dequeue() {
                return Some(value);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let slice = WAKE_SLICE.min(deadline - now);
            self.park(&self.readers, &self.readable, slice, || {
                self.channel.is_empty()
            });
        }
    }

    /// Sleep on `cond` for at most `slice` while `blocked` holds, counted
    /// in `parked` so the fast paths know to signal.
    fn park(
        &self,
        parked: &AtomicUsize,
        cond: &WaitCondition,
        slice: Duration,
        blocked: impl Fn() -> bool,
    ) {
        let gate = self.gate.lock();
        parked.fetch_add(1, Ordering::SeqCst);
        let _ = cond.wait_timeout_while(gate, slice, |_| blocked());
        parked.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.channel.is_full()
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<T, const N: usize> Default for Queue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────
