//! corelink — embedded framework core.
//!
//! Binary framing protocol, topic/service messaging and a portable
//! concurrency substrate. Everything here runs on the host; the RTOS
//! backend's ESP-IDF specifics are guarded by
//! `#[cfg(all(target_os = "espidf", feature = "espidf"))]` inside
//! [`thread::task_pin`].

#![deny(unused_must_use)]

pub mod config;
pub mod context;
pub mod error;
pub mod messaging;
pub mod ports;
pub mod protocol;
pub mod scheduler;
pub mod sync;
pub mod thread;

pub use config::FrameworkConfig;
pub use context::{Backend, Context};
pub use error::{Error, Result};
