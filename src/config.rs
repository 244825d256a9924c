//! Framework configuration parameters
//!
//! All tunable parameters for the protocol engine, thread backends and the
//! simulation scheduler. Values can be loaded from a JSON file during
//! bring-up or stored as a compact postcard blob in non-volatile storage.

use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Per-subscription inbound queue depth. Compile-time: it sizes the
/// fixed queue embedded in every subscription.
pub const SUBSCRIPTION_DEPTH: usize = 16;

/// Core framework configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    // --- Protocol ---
    /// Default deadline for a correlated request/response (milliseconds)
    pub response_timeout_ms: u32,
    /// Interval between transport polls while waiting for a response (microseconds)
    pub poll_interval_us: u32,
    /// Maximum frame handlers in one engine chain
    pub max_handlers: usize,

    // --- Simulation ---
    /// Simulated time advanced by one scheduler step (milliseconds)
    pub sim_step_ms: u32,
    /// Wall-clock bound on one step's rendezvous (milliseconds)
    pub sim_step_deadline_ms: u32,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            // Protocol
            response_timeout_ms: 100,
            poll_interval_us: 500,
            max_handlers: 8,

            // Simulation
            sim_step_ms: 1,
            sim_step_deadline_ms: 5_000,
        }
    }
}

impl FrameworkConfig {
    /// Reject values the runtime cannot honour.
    pub fn validate(&self) -> crate::Result<()> {
        if self.response_timeout_ms == 0 {
            return Err(Error::ParameterInvalid("response_timeout_ms must be > 0"));
        }
        if self.poll_interval_us == 0 {
            return Err(Error::ParameterInvalid("poll_interval_us must be > 0"));
        }
        if self.max_handlers == 0 {
            return Err(Error::ParameterInvalid("max_handlers must be > 0"));
        }
        if self.sim_step_ms == 0 {
            return Err(Error::ParameterInvalid("sim_step_ms must be > 0"));
        }
        if self.sim_step_deadline_ms == 0 {
            return Err(Error::ParameterInvalid("sim_step_deadline_ms must be > 0"));
        }
        Ok(())
    }

    /// Load and validate a JSON configuration file. Missing fields take
    /// their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("parsing config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("validating config {}", path.display()))?;
        Ok(config)
    }

    /// Compact binary form for non-volatile storage.
    pub fn to_blob(&self) -> crate::Result<Vec<u8>> {
        postcard::to_allocvec(self).map_err(|_| Error::ParameterInvalid("config blob encode"))
    }

    pub fn from_blob(bytes: &[u8]) -> crate::Result<Self> {
        let config: Self =
            postcard::from_bytes(bytes).map_err(|_| Error::ParameterInvalid("config blob decode"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn response_timeout(&self) -> core::time::Duration {
        core::time::Duration::from_millis(u64::from(self.response_timeout_ms))
    }

    pub fn poll_interval(&self) -> core::time::Duration {
        core::time::Duration::from_micros(u64::from(self.poll_interval_us))
    }
}
