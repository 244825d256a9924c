//! Deterministic lock-step simulation scheduler.
//!
//! Owns the single authoritative simulated clock. Simulated threads have
//! no timer of their own; each one subscribes to the tick topic and only
//! runs when a tick reaches it.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  step()                                                      │
//! │   1. now += step_ms                                          │
//! │   2. snapshot live threads (registration order) → turn order │
//! │   3. publish TimeTick on TICK_TOPIC_ID                       │
//! │   4. block on Semaphore until every thread has signalled     │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ TimeTick
//!          ┌─────────────────────┼─────────────────────┐
//!          ▼                     ▼                     ▼
//!   ┌────────────┐  turn   ┌────────────┐  turn   ┌────────────┐
//!   │ sim thread │ ──────▶ │ sim thread │ ──────▶ │ sim thread │
//!   │ #1         │         │ #2         │         │ #3         │
//!   └─────┬──────┘         └─────┬──────┘         └─────┬──────┘
//!         │ drain, run if due,   │                      │
//!         └──── release ─────────┴──── release ─────────┘
//! ```
//!
//! Within a step threads take turns in registration order, so at most one
//! simulated callback runs at a time and two runs with the same
//! registrations produce the same invocation sequence.

use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::FrameworkConfig;
use crate::error::Error;
use crate::messaging::topic::{Topic, TopicId, TopicReceiver, TopicRegistry};
use crate::sync::{Mutex, Semaphore, WaitCondition};
use crate::thread::{Thread, ThreadContext, ThreadId, ThreadState};

/// Well-known topic carrying [`TimeTick`] samples.
pub const TICK_TOPIC_ID: TopicId = 0xFFFF;

/// How often an idle worker re-checks whether its thread was stopped.
const STOP_POLL: Duration = Duration::from_millis(10);

// ═══════════════════════════════════════════════════════════════
//  Tick
// ═══════════════════════════════════════════════════════════════

/// One discrete advance of the simulated clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeTick {
    /// Step counter, starting at 1.
    pub step: u64,
    /// Simulated milliseconds since the scheduler was created.
    pub now_ms: u64,
}

/// Turn order for the step in progress.
struct Turnstile {
    step: u64,
    order: Vec<ThreadId>,
    turn: usize,
}

impl Turnstile {
    fn is_pending(&self, id: ThreadId) -> bool {
        self.order.get(self.turn..).is_some_and(|rest| rest.contains(&id))
    }
}

struct Inner {
    now_ms: AtomicU64,
    step_ms: u64,
    step_deadline: Duration,
    ticks: Arc<Topic<TimeTick>>,
    turnstile: Mutex<Turnstile>,
    turn_changed: WaitCondition,
    done: Semaphore,
    threads: Mutex<Vec<Arc<ThreadContext>>>,
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler
// ═══════════════════════════════════════════════════════════════

/// Cloning shares the same clock and thread set.
#[derive(Clone)]
pub struct SimulationScheduler {
    inner: Arc<Inner>,
}

impl SimulationScheduler {
    pub fn new(topics: &TopicRegistry, config: &FrameworkConfig) -> crate::Result<Self> {
        config.validate()?;
        let ticks = topics.topic::<TimeTick>(TICK_TOPIC_ID)?;
        info!("Scheduler: simulated clock, {} ms per step", config.sim_step_ms);
        Ok(Self {
            inner: Arc::new(Inner {
                now_ms: AtomicU64::new(0),
                step_ms: u64::from(config.sim_step_ms),
                step_deadline: Duration::from_millis(u64::from(config.sim_step_deadline_ms)),
                ticks,
                turnstile: Mutex::new(Turnstile {
                    step: 0,
                    order: Vec::new(),
                    turn: 0,
                }),
                turn_changed: WaitCondition::new(),
                done: Semaphore::new(0),
                threads: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn now_ms(&self) -> u64 {
        self.inner.now_ms.load(Ordering::Acquire)
    }

    pub fn step_ms(&self) -> u64 {
        self.inner.step_ms
    }

    /// Steps completed or in progress.
    pub fn steps(&self) -> u64 {
        self.inner.turnstile.lock().step
    }

    /// Simulated threads that still take part in steps.
    pub fn thread_count(&self) -> usize {
        self.inner
            .threads
            .lock()
            .iter()
            .filter(|c| c.state() != ThreadState::Stopped)
            .count()
    }

    /// Ticks as seen by any other subscriber.
    pub fn tick_topic(&self) -> &Arc<Topic<TimeTick>> {
        &self.inner.ticks
    }

    /// Register a simulated thread. It starts suspended, and its callback
    /// runs only inside [`step`](Self::step).
    pub fn spawn(
        &self,
        name: &'static str,
        period_ms: u32,
        callback: impl FnMut() + Send + 'static,
    ) -> crate::Result<Thread> {
        let ctx = ThreadContext::new(name, period_ms);
        let rx = self.inner.ticks.subscribe_receiver();
        let inner = Arc::clone(&self.inner);
        let worker_ctx = Arc::clone(&ctx);
        let first_due = self.now_ms() + u64::from(period_ms);

        // Detached: the worker exits on its own once the thread stops, and
        // joining from inside another simulated callback could deadlock.
        std::thread::Builder::new()
            .name(name.into())
            .spawn(move || sim_worker(&inner, &worker_ctx, &rx, first_due, callback))
            .map_err(|e| {
                warn!("Scheduler: spawning '{}' failed: {}", name, e);
                Error::ParameterInvalid("thread spawn failed")
            })?;

        self.inner.threads.lock().push(Arc::clone(&ctx));
        info!("Scheduler: registered '{}' (period {} ms)", name, period_ms);
        Ok(Thread::from_parts(ctx, None))
    }

    /// Advance the clock one step and wait until every live simulated
    /// thread has taken its turn.
    pub fn step(&self) -> crate::Result<TimeTick> {
        let inner = &self.inner;
        let (tick, expected) = {
            let mut turnstile = inner.turnstile.lock();
            // Permits left over from a step that timed out.
            while inner.done.try_acquire() {}

            let order: Vec<ThreadId> = {
                let mut threads = inner.threads.lock();
                threads.retain(|c| c.state() != ThreadState::Stopped);
                threads.iter().map(|c| c.id()).collect()
            };
            let now_ms = inner.now_ms.fetch_add(inner.step_ms, Ordering::AcqRel) + inner.step_ms;

            turnstile.step += 1;
            turnstile.turn = 0;
            turnstile.order = order;
            (
                TimeTick {
                    step: turnstile.step,
                    now_ms,
                },
                turnstile.order.len(),
            )
        };
        inner.turn_changed.notify_all();

        inner.ticks.publish(tick);

        if !inner.done.acquire_n_timeout(expected, inner.step_deadline) {
            warn!(
                "Scheduler: step {} incomplete after {:?} ({} threads expected)",
                tick.step, inner.step_deadline, expected
            );
            return Err(Error::Timeout);
        }
        debug!("Scheduler: step {} done at {} ms", tick.step, tick.now_ms);
        Ok(tick)
    }

    /// Run `steps` consecutive steps.
    pub fn run(&self, steps: u64) -> crate::Result<()> {
        for _ in 0..steps {
            self.step()?;
        }
        Ok(())
    }

    /// Run enough steps to advance the clock by at least `ms`.
    pub fn run_for_ms(&self, ms: u64) -> crate::Result<()> {
        self.run(ms.div_ceil(self.inner.step_ms))
    }
}

/// Per-thread driver: wait for a tick, wait for this thread's turn, run,
/// hand the turn on and signal the scheduler.
fn sim_worker(
    inner: &Inner,
    ctx: &ThreadContext,
    ticks: &TopicReceiver<TimeTick>,
    first_due: u64,
    mut callback: impl FnMut(),
) {
    let id = ctx.id();
    let period = u64::from(ctx.period_ms());
    let mut next_due = first_due;

    loop {
        let Some(tick) = ticks.recv_timeout(STOP_POLL) else {
            if ctx.state() == ThreadState::Stopped && !inner.turnstile.lock().is_pending(id) {
                break;
            }
            continue;
        };

        {
            let turnstile = inner.turnstile.lock();
            let turnstile = inner.turn_changed.wait_while(turnstile, |t| {
                t.step == tick.step && t.is_pending(id) && t.order.get(t.turn) != Some(&id)
            });
            if turnstile.step != tick.step || turnstile.order.get(turnstile.turn) != Some(&id) {
                // Stale tick, or registered after this step's snapshot.
                continue;
            }
        }

        if ctx.state() == ThreadState::Running {
            ctx.take_wake();
            let delivered = ctx.drain_mailboxes();
            let due = if period == 0 {
                delivered > 0
            } else {
                tick.now_ms >= next_due
            };
            if due {
                callback();
                if period > 0 {
                    next_due += period;
                    if next_due <= tick.now_ms {
                        next_due = tick.now_ms + period;
                    }
                }
            }
        }

        {
            let mut turnstile = inner.turnstile.lock();
            if turnstile.step == tick.step {
                turnstile.turn += 1;
                inner.done.release();
            }
        }
        inner.turn_changed.notify_all();

        if ctx.state() == ThreadState::Stopped {
            break;
        }
    }

    debug!("Scheduler: worker for '{}' exited", ctx.name());
}

// ── Tests ────────────────────────────────────────────────────
