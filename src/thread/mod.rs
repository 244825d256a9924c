//! Threads with interchangeable backends.
//!
//! A [`Thread`] is a unit of execution with a period (0 = event-driven,
//! >0 = periodic) and an explicit state machine:
//!
//! ```text
//!            enable()              stop()
//!  ┌───────────┐ ──────▶ ┌─────────┐ ──────▶ ┌─────────┐
//!  │ Suspended │         │ Running │         │ Stopped │
//!  └───────────┘ ◀────── └─────────┘         └─────────┘
//!            disable()         ▲ stop() from Suspended too
//! ```
//!
//! The state lives in a [`ThreadContext`] shared between the handle and
//! the execution unit, guarded by a [`Mutex`] and signalled through a
//! [`WaitCondition`]. Backends:
//!
//! - **native**: an OS thread; blocks while suspended, sleeps between
//!   periods, wakes early to drain topic deliveries.
//! - **rtos**: the same loop on a core-pinned FreeRTOS task.
//! - **simulated**: no timer of its own; runs only when the
//!   [`SimulationScheduler`](crate::scheduler::SimulationScheduler) ticks.
//!
//! Topic subscriptions attach a [`Mailbox`] to their owning thread so
//! callbacks always run on that thread, never on the publisher's.

pub mod native;
pub mod task_pin;

use core::sync::atomic::{AtomicU32, Ordering};
use core::time::Duration;
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{info, warn};

use crate::sync::{Mutex, WaitCondition};

pub use task_pin::{Core, RtosConfig};

pub type ThreadId = u32;

static NEXT_THREAD_ID: AtomicU32 = AtomicU32::new(1);

fn next_thread_id() -> ThreadId {
    NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Suspended,
    Running,
    Stopped,
}

/// Pending deliveries for one thread. Draining runs the callbacks on the
/// calling (owning) thread.
pub trait Mailbox: Send + Sync {
    /// Deliver everything queued. Returns the number of samples delivered.
    fn drain(&self) -> usize;
}

/// Why [`ThreadContext::wait_for_work`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wake {
    Work,
    Timeout,
    Suspended,
    Stopped,
}

struct Control {
    state: ThreadState,
    wake_pending: bool,
}

/// State shared between a [`Thread`] handle and its execution unit.
pub struct ThreadContext {
    id: ThreadId,
    name: &'static str,
    period_ms: u32,
    control: Mutex<Control>,
    changed: WaitCondition,
    mailboxes: Mutex<Vec<Arc<dyn Mailbox>>>,
}

impl ThreadContext {
    pub(crate) fn new(name: &'static str, period_ms: u32) -> Arc<Self> {
        Arc::new(Self {
            id: next_thread_id(),
            name,
            period_ms,
            control: Mutex::new(Control {
                state: ThreadState::Suspended,
                wake_pending: false,
            }),
            changed: WaitCondition::new(),
            mailboxes: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn period_ms(&self) -> u32 {
        self.period_ms
    }

    pub fn state(&self) -> ThreadState {
        self.control.lock().state
    }

    pub fn is_enabled(&self) -> bool {
        self.state() == ThreadState::Running
    }

    /// Move to `state`. `Stopped` is terminal.
    pub(crate) fn set_state(&self, state: ThreadState) -> bool {
        let mut control = self.control.lock();
        if control.state == ThreadState::Stopped {
            return false;
        }
        control.state = state;
        drop(control);
        self.changed.notify_all();
        true
    }

    /// Attach a delivery source drained on this thread.
    pub fn attach(&self, mailbox: Arc<dyn Mailbox>) {
        self.mailboxes.lock().push(mailbox);
    }

    pub fn mailbox_count(&self) -> usize {
        self.mailboxes.lock().len()
    }

    /// Signal that a mailbox has something to deliver.
    pub fn notify(&self) {
        self.control.lock().wake_pending = true;
        self.changed.notify_all();
    }

    /// Run every pending delivery on the calling thread.
    pub fn drain_mailboxes(&self) -> usize {
        let mailboxes: Vec<Arc<dyn Mailbox>> = self.mailboxes.lock().clone();
        mailboxes.iter().map(|m| m.drain()).sum()
    }

    /// Block while suspended. Returns the state that ended the wait.
    pub(crate) fn wait_enabled(&self) -> ThreadState {
        let control = self.control.lock();
        let control = self
            .changed
            .wait_while(control, |c| c.state == ThreadState::Suspended);
        control.state
    }

    /// Block while running with nothing to deliver, at most `timeout`
    /// (forever when `None`).
    pub(crate) fn wait_for_work(&self, timeout: Option<Duration>) -> Wake {
        let idle = |c: &mut Control| c.state == ThreadState::Running && !c.wake_pending;
        let control = self.control.lock();
        let mut control = match timeout {
            None => self.changed.wait_while(control, idle),
            Some(t) => self.changed.wait_timeout_while(control, t, idle).0,
        };
        match control.state {
            ThreadState::Stopped => Wake::Stopped,
            ThreadState::Suspended => Wake::Suspended,
            ThreadState::Running if control.wake_pending => {
                control.wake_pending = false;
                Wake::Work
            }
            ThreadState::Running => Wake::Timeout,
        }
    }

    /// Consume a pending wake without blocking.
    pub(crate) fn take_wake(&self) -> bool {
        core::mem::take(&mut self.control.lock().wake_pending)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Handle
// ═══════════════════════════════════════════════════════════════

/// Owning handle. Dropping it stops the thread.
pub struct Thread {
    ctx: Arc<ThreadContext>,
    worker: Option<JoinHandle<()>>,
}

impl Thread {
    pub(crate) fn from_parts(ctx: Arc<ThreadContext>, worker: Option<JoinHandle<()>>) -> Self {
        Self { ctx, worker }
    }

    /// Native OS thread.
    pub fn spawn_native(
        name: &'static str,
        period_ms: u32,
        callback: impl FnMut() + Send + 'static,
    ) -> crate::Result<Self> {
        native::spawn(name, period_ms, None, callback)
    }

    /// RTOS task pinned per `rtos`.
    pub fn spawn_rtos(
        name: &'static str,
        period_ms: u32,
        rtos: RtosConfig,
        callback: impl FnMut() + Send + 'static,
    ) -> crate::Result<Self> {
        native::spawn(name, period_ms, Some(rtos), callback)
    }

    pub fn context(&self) -> &Arc<ThreadContext> {
        &self.ctx
    }

    pub fn id(&self) -> ThreadId {
        self.ctx.id
    }

    pub fn name(&self) -> &'static str {
        self.ctx.name
    }

    pub fn period_ms(&self) -> u32 {
        self.ctx.period_ms
    }

    pub fn state(&self) -> ThreadState {
        self.ctx.state()
    }

    pub fn is_enabled(&self) -> bool {
        self.ctx.is_enabled()
    }

    /// Resume the execution unit.
    pub fn enable(&self) {
        if self.ctx.set_state(ThreadState::Running) {
            info!("Thread[{}]: enabled", self.ctx.name);
        }
    }

    /// Suspend after the current callback, if any, returns.
    pub fn disable(&self) {
        if self.ctx.set_state(ThreadState::Suspended) {
            info!("Thread[{}]: disabled", self.ctx.name);
        }
    }

    /// Stop and join. An in-progress callback runs to completion first.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.ctx.set_state(ThreadState::Stopped) {
            info!("Thread[{}]: stopping", self.ctx.name);
        }

        if let Some(worker) = self.worker.take() {
            if worker.thread().id() == std::thread::current().id() {
                warn!("Thread[{}]: stop requested from its own callback", self.ctx.name);
                return;
            }
            if worker.join().is_err() {
                warn!("Thread[{}]: worker panicked", self.ctx.name);
            }
        }
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Tests ────────────────────────────────────────────────────
