//! Core-pinned task spawning for the RTOS backend.
//!
//! Wraps `esp_pthread_set_cfg()` so that `std::thread::spawn` creates a
//! FreeRTOS task pinned to a specific CPU core with explicit priority
//! and stack size. Elsewhere, falls back to a plain OS thread.
//!
//! # ESP-IDF Threading Model
//!
//! ESP-IDF implements `std::thread` via pthreads, which are thin wrappers
//! around FreeRTOS tasks. `esp_pthread_set_cfg()` sets thread-local
//! configuration that applies to the *next* `pthread_create()` call from
//! the calling thread, so the config→spawn pair must not be interleaved
//! with other thread creation on the same thread.

use std::thread::JoinHandle;

/// CPU core identifiers for a dual-core part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// Core 0 (PRO_CPU): protocol stacks.
    Pro = 0,
    /// Core 1 (APP_CPU): application logic.
    App = 1,
}

/// Placement of one RTOS-backed thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtosConfig {
    pub core: Core,
    pub priority: u8,
    pub stack_kb: usize,
}

impl Default for RtosConfig {
    fn default() -> Self {
        Self {
            core: Core::App,
            priority: 5,
            stack_kb: 8,
        }
    }
}

/// Spawn a task pinned to `rtos.core` with its priority and stack.
#[cfg(all(target_os = "espidf", feature = "espidf"))]
pub fn spawn_on_core(
    rtos: RtosConfig,
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> std::io::Result<JoinHandle<()>> {
    let c_name = std::ffi::CString::new(name)
        .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;

    // SAFETY: the config struct and `c_name` outlive the spawn below, which
    // is the only pthread_create the config applies to.
    unsafe {
        let mut cfg = esp_idf_sys::esp_create_default_pthread_config();
        cfg.pin_to_core = rtos.core as i32;
        cfg.prio = i32::from(rtos.priority);
        cfg.stack_size = (rtos.stack_kb * 1024) as i32;
        cfg.thread_name = c_name.as_ptr();
        let ret = esp_idf_sys::esp_pthread_set_cfg(&cfg);
        if ret != esp_idf_sys::ESP_OK as i32 {
            return Err(std::io::Error::other(format!("esp_pthread_set_cfg failed: {ret}")));
        }
    }

    log::info!(
        "Spawning '{}' on {:?} (pri={}, stack={}KB)",
        name,
        rtos.core,
        rtos.priority,
        rtos.stack_kb
    );

    let handle = std::thread::Builder::new().name(name.into()).spawn(f);
    drop(c_name);
    handle
}

/// Host fallback: ignores core affinity and priority.
#[cfg(not(all(target_os = "espidf", feature = "espidf")))]
pub fn spawn_on_core(
    rtos: RtosConfig,
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> std::io::Result<JoinHandle<()>> {
    log::info!(
        "Spawning '{}' (host, no core pinning, stack={}KB)",
        name,
        rtos.stack_kb
    );

    std::thread::Builder::new()
        .name(name.into())
        .stack_size(rtos.stack_kb * 1024)
        .spawn(f)
}

// ── Tests ────────────────────────────────────────────────────
