//! Synchronisation primitives shared by every backend.
//!
//! Any state that crosses a thread boundary goes through one of these,
//! or is handed off through a [`Queue`] or a topic.

pub mod mutex;
pub mod queue;

pub use mutex::{Mutex, MutexGuard, Semaphore, WaitCondition};
pub use queue::Queue;
