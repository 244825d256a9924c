//! In-process messaging: asynchronous topics and synchronous services.
//!
//! ```text
//! ┌──────────────────────────────┐   ┌──────────────────────────────┐
//! │ Topic<T>  (broadcast)        │   │ Service<Req, Resp>  (call)   │
//! │  publish ──▶ per-sub queues  │   │  call ──▶ handler, same      │
//! │  drained on owning thread    │   │  thread, returns Resp        │
//! └──────────────────────────────┘   └──────────────────────────────┘
//! ```

pub mod service;
pub mod topic;

pub use service::{Service, ServiceClient, ServiceId, ServiceRegistry};
pub use topic::{Topic, TopicId, TopicReceiver, TopicRegistry, TopicSubscription};
