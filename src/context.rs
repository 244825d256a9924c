//! Explicitly constructed framework context.
//!
//! One `Context` per process, built by the application entry point and
//! passed by reference to whatever needs registries or threads. It owns
//! the topic and service registries and selects the thread backend:
//!
//! ```text
//!   Context ─┬─ TopicRegistry
//!            ├─ ServiceRegistry
//!            ├─ FrameworkConfig
//!            └─ Backend ── Native | Rtos(RtosConfig) | Simulated(SimulationScheduler)
//! ```

use log::info;

use crate::config::FrameworkConfig;
use crate::messaging::service::ServiceRegistry;
use crate::messaging::topic::TopicRegistry;
use crate::scheduler::SimulationScheduler;
use crate::thread::{RtosConfig, Thread};

/// Where [`Context::spawn`] puts new threads.
#[derive(Clone)]
pub enum Backend {
    Native,
    Rtos(RtosConfig),
    Simulated(SimulationScheduler),
}

pub struct Context {
    config: FrameworkConfig,
    topics: TopicRegistry,
    services: ServiceRegistry,
    backend: Backend,
}

impl Context {
    /// Threads on OS threads.
    pub fn native(config: FrameworkConfig) -> crate::Result<Self> {
        Self::build(config, |_| Ok(Backend::Native))
    }

    /// Threads on core-pinned RTOS tasks.
    pub fn rtos(config: FrameworkConfig, placement: RtosConfig) -> crate::Result<Self> {
        Self::build(config, |_| Ok(Backend::Rtos(placement)))
    }

    /// Threads driven by a deterministic [`SimulationScheduler`].
    pub fn simulated(config: FrameworkConfig) -> crate::Result<Self> {
        let sim_config = config.clone();
        Self::build(config, move |topics| {
            Ok(Backend::Simulated(SimulationScheduler::new(topics, &sim_config)?))
        })
    }

    fn build(
        config: FrameworkConfig,
        backend: impl FnOnce(&TopicRegistry) -> crate::Result<Backend>,
    ) -> crate::Result<Self> {
        config.validate()?;
        let topics = TopicRegistry::new();
        let backend = backend(&topics)?;
        info!("Context: {} backend", backend.name());
        Ok(Self {
            config,
            topics,
            services: ServiceRegistry::new(),
            backend,
        })
    }

    pub fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    pub fn topics(&self) -> &TopicRegistry {
        &self.topics
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// The scheduler, when the backend is simulated.
    pub fn scheduler(&self) -> Option<&SimulationScheduler> {
        match &self.backend {
            Backend::Simulated(s) => Some(s),
            _ => None,
        }
    }

    /// Create a thread on this context's backend. It starts suspended.
    pub fn spawn(
        &self,
        name: &'static str,
        period_ms: u32,
        callback: impl FnMut() + Send + 'static,
    ) -> crate::Result<Thread> {
        match &self.backend {
            Backend::Native => Thread::spawn_native(name, period_ms, callback),
            Backend::Rtos(placement) => Thread::spawn_rtos(name, period_ms, *placement, callback),
            Backend::Simulated(scheduler) => scheduler.spawn(name, period_ms, callback),
        }
    }
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Rtos(_) => "rtos",
            Self::Simulated(_) => "simulated",
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
