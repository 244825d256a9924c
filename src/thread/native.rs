//! OS-thread and RTOS-task backends.
//!
//! Both run [`run_loop`]; they differ only in how the execution unit is
//! created. The loop blocks on the context's wait condition while
//! suspended, so a disabled thread costs nothing.

use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};

use super::task_pin::{self, RtosConfig};
use super::{Thread, ThreadContext, ThreadState, Wake};
use crate::error::Error;

/// Stack for native threads that do not ask for a specific one.
const NATIVE_STACK_KB: usize = 64;

pub(crate) fn spawn(
    name: &'static str,
    period_ms: u32,
    rtos: Option<RtosConfig>,
    mut callback: impl FnMut() + Send + 'static,
) -> crate::Result<Thread> {
    let ctx = ThreadContext::new(name, period_ms);
    let worker_ctx = Arc::clone(&ctx);
    let body = move || run_loop(&worker_ctx, &mut callback);

    let worker = match rtos {
        Some(rtos) => task_pin::spawn_on_core(rtos, name, body),
        None => std::thread::Builder::new()
            .name(name.into())
            .stack_size(NATIVE_STACK_KB * 1024)
            .spawn(body),
    }
    .map_err(|e| {
        warn!("Thread[{}]: spawn failed: {}", name, e);
        Error::ParameterInvalid("thread spawn failed")
    })?;

    Ok(Thread::from_parts(ctx, Some(worker)))
}

/// Body of a native or RTOS thread.
///
/// Periodic threads run the callback once per period and drain topic
/// deliveries as they arrive in between. Event-driven threads (period 0)
/// sleep until a delivery wakes them, drain, then run the callback once.
pub(crate) fn run_loop(ctx: &ThreadContext, callback: &mut dyn FnMut()) {
    info!("Thread[{}]: started (period {} ms)", ctx.name(), ctx.period_ms());
    let period = Duration::from_millis(u64::from(ctx.period_ms()));

    loop {
        if ctx.wait_enabled() == ThreadState::Stopped {
            break;
        }

        if period.is_zero() {
            match ctx.wait_for_work(None) {
                Wake::Stopped => break,
                Wake::Suspended | Wake::Timeout => continue,
                Wake::Work => {}
            }
            let delivered = ctx.drain_mailboxes();
            debug!("Thread[{}]: woke, {} deliveries", ctx.name(), delivered);
            callback();
            continue;
        }

        let deadline = Instant::now() + period;
        ctx.take_wake();
        ctx.drain_mailboxes();
        callback();

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match ctx.wait_for_work(Some(deadline - now)) {
                Wake::Work => {
                    ctx.drain_mailboxes();
                }
                Wake::Timeout | Wake::Suspended | Wake::Stopped => break,
            }
        }
    }

    info!("Thread[{}]: exited", ctx.name());
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    fn wait_until(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        cond()
    }

    #[test]
    fn periodic_thread_runs_only_while_enabled() {
        let runs = Arc::new(AtomicU32::new(0));
        let r = Arc::clone(&runs);
        let thread = Thread::spawn_native("periodic", 2, move || {
            r.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(runs.load(Ordering::SeqCst), 0, "starts suspended");

        thread.enable();
        assert!(wait_until(|| runs.load(Ordering::SeqCst) >= 3));

        thread.disable();
        std::thread::sleep(Duration::from_millis(10));
        let frozen = runs.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(runs.load(Ordering::SeqCst), frozen);

        thread.stop();
    }

    #[test]
    fn event_driven_thread_waits_for_notify() {
        let runs = Arc::new(AtomicU32::new(0));
        let r = Arc::clone(&runs);
        let thread = Thread::spawn_native("events", 0, move || {
            r.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        thread.enable();

        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        thread.context().notify();
        assert!(wait_until(|| runs.load(Ordering::SeqCst) == 1));
        assert_eq!(thread.state(), ThreadState::Running);
    }

    #[test]
    fn stop_joins_a_suspended_thread() {
        let thread = Thread::spawn_native("idle", 5, || {}).unwrap();
        let ctx = Arc::clone(thread.context());
        thread.stop();
        assert_eq!(ctx.state(), ThreadState::Stopped);
    }

    #[test]
    fn rtos_backend_falls_back_on_host() {
        let runs = Arc::new(AtomicU32::new(0));
        let r = Arc::clone(&runs);
        let thread = Thread::spawn_rtos("task", 1, RtosConfig::default(), move || {
            r.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        thread.enable();
        assert!(wait_until(|| runs.load(Ordering::SeqCst) > 0));
    }
}
