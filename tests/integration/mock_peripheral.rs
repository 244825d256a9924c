//! Scripted peripherals for integration tests.
//!
//! `MockAdc` replays a fixed sample sequence through the capability
//! traits; `RecordingPin` records every level an output drives.

use std::convert::Infallible;
use std::sync::Arc;

use corelink::error::Error;
use corelink::ports::{Configure, Enable, ReadValue};
use corelink::sync::Mutex;
use embedded_hal::digital::{ErrorType, OutputPin};

// ── ADC ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdcConfig {
    pub gain: u16,
}

pub struct MockAdc {
    samples: Vec<u16>,
    next: usize,
    enabled: bool,
    config: AdcConfig,
}

#[allow(dead_code)]
impl MockAdc {
    pub fn new(samples: &[u16]) -> Self {
        Self {
            samples: samples.to_vec(),
            next: 0,
            enabled: false,
            config: AdcConfig { gain: 1 },
        }
    }

    pub fn reads(&self) -> usize {
        self.next
    }
}

impl Enable for MockAdc {
    fn enable(&mut self) -> corelink::Result<()> {
        self.enabled = true;
        Ok(())
    }

    fn disable(&mut self) -> corelink::Result<()> {
        self.enabled = false;
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Configure for MockAdc {
    type Config = AdcConfig;

    fn configure(&mut self, config: &AdcConfig) -> corelink::Result<()> {
        if config.gain == 0 {
            return Err(Error::ParameterInvalid("gain must be non-zero"));
        }
        self.config = *config;
        Ok(())
    }
}

impl ReadValue for MockAdc {
    type Value = u16;

    /// Cycles through the script once it runs out.
    fn read(&mut self) -> corelink::Result<u16> {
        if !self.enabled {
            return Err(Error::NotEnabled);
        }
        if self.samples.is_empty() {
            return Err(Error::CommunicationFailure);
        }
        let raw = self.samples[self.next % self.samples.len()];
        self.next += 1;
        Ok(raw.saturating_mul(self.config.gain))
    }
}

// ── Output pin ────────────────────────────────────────────────

/// Clonable handle onto a shared level history.
#[derive(Clone, Default)]
pub struct RecordingPin {
    pub levels: Arc<Mutex<Vec<bool>>>,
}

impl ErrorType for RecordingPin {
    type Error = Infallible;
}

impl OutputPin for RecordingPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.levels.lock().push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.levels.lock().push(true);
        Ok(())
    }
}
