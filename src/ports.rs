//! Peripheral capability traits — the boundary to concrete drivers.
//!
//! ```text
//!   MCU driver ──▶ capability traits ──▶ sensor server ──▶ Topic<T>
//! ```
//!
//! Concrete ADC/DAC/GPIO/bus drivers live outside this crate. Each one
//! implements only the small capabilities it has, instead of inheriting a
//! base class per peripheral category. [`DigitalOutput`] adapts any
//! `embedded-hal` output pin.

use embedded_hal::digital::OutputPin;
use log::warn;

use crate::error::Error;
use crate::messaging::topic::Topic;

// ───────────────────────────────────────────────────────────────
// Capabilities
// ───────────────────────────────────────────────────────────────

/// Power/clock gating. Other capabilities fail with
/// [`Error::NotEnabled`] while disabled.
pub trait Enable {
    fn enable(&mut self) -> crate::Result<()>;
    fn disable(&mut self) -> crate::Result<()>;
    fn is_enabled(&self) -> bool;
}

/// Apply a driver-specific configuration.
pub trait Configure {
    type Config;

    fn configure(&mut self, config: &Self::Config) -> crate::Result<()>;
}

/// Read one sample.
pub trait ReadValue {
    type Value;

    fn read(&mut self) -> crate::Result<Self::Value>;
}

/// Write one value.
pub trait WriteValue {
    type Value;

    fn write(&mut self, value: Self::Value) -> crate::Result<()>;
}

/// Read `sensor` once and publish the sample on `topic`. Returns how many
/// subscribers queued it.
pub fn publish_reading<S>(sensor: &mut S, topic: &Topic<S::Value>) -> crate::Result<usize>
where
    S: ReadValue,
    S::Value: Clone + Send + 'static,
{
    let sample = sensor.read()?;
    Ok(topic.publish(sample))
}

// ───────────────────────────────────────────────────────────────
// Digital output over embedded-hal
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputConfig {
    /// Logical `true` drives the pin low.
    pub active_low: bool,
}

/// Logical on/off output on top of an `embedded-hal` pin.
pub struct DigitalOutput<P> {
    pin: P,
    config: OutputConfig,
    enabled: bool,
    level: bool,
}

impl<P: OutputPin> DigitalOutput<P> {
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            config: OutputConfig::default(),
            enabled: false,
            level: false,
        }
    }

    pub fn release(self) -> P {
        self.pin
    }

    fn drive(&mut self, on: bool) -> crate::Result<()> {
        let high = on != self.config.active_low;
        let result = if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        result.map_err(|e| {
            warn!("DigitalOutput: pin write failed: {:?}", e);
            Error::CommunicationFailure
        })?;
        self.level = on;
        Ok(())
    }
}

impl<P: OutputPin> Enable for DigitalOutput<P> {
    fn enable(&mut self) -> crate::Result<()> {
        self.enabled = true;
        self.drive(self.level)
    }

    /// Drives the output to its inactive level before disabling.
    fn disable(&mut self) -> crate::Result<()> {
        self.drive(false)?;
        self.enabled = false;
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl<P: OutputPin> Configure for DigitalOutput<P> {
    type Config = OutputConfig;

    fn configure(&mut self, config: &OutputConfig) -> crate::Result<()> {
        self.config = *config;
        if self.enabled {
            self.drive(self.level)?;
        }
        Ok(())
    }
}

impl<P: OutputPin> WriteValue for DigitalOutput<P> {
    type Value = bool;

    fn write(&mut self, on: bool) -> crate::Result<()> {
        if !self.enabled {
            return Err(Error::NotEnabled);
        }
        self.drive(on)
    }
}

impl<P: OutputPin> ReadValue for DigitalOutput<P> {
    type Value = bool;

    /// The last logical level written.
    fn read(&mut self) -> crate::Result<bool> {
        if !self.enabled {
            return Err(Error::NotEnabled);
        }
        Ok(self.level)
    }
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::topic::TopicRegistry;
    use core::convert::Infallible;
    use embedded_hal::digital::ErrorType;

    #[derive(Default)]
    struct MockPin {
        high: bool,
    }

    impl ErrorType for MockPin {
        type Error = Infallible;
    }

    impl OutputPin for MockPin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.high = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.high = true;
            Ok(())
        }
    }

    #[test]
    fn writes_require_enable() {
        let mut out = DigitalOutput::new(MockPin::default());
        assert_eq!(out.write(true), Err(Error::NotEnabled));
        assert_eq!(out.read(), Err(Error::NotEnabled));
        out.enable().unwrap();
        out.write(true).unwrap();
        assert_eq!(out.read(), Ok(true));
        assert!(out.release().high);
    }

    #[test]
    fn active_low_inverts_the_pin() {
        let mut out = DigitalOutput::new(MockPin::default());
        out.configure(&OutputConfig { active_low: true }).unwrap();
        out.enable().unwrap();
        out.write(true).unwrap();
        let pin = out.release();
        assert!(!pin.high);
    }

    #[test]
    fn disable_drives_inactive_level() {
        let mut out = DigitalOutput::new(MockPin::default());
        out.enable().unwrap();
        out.write(true).unwrap();
        out.disable().unwrap();
        assert!(!out.is_enabled());
        assert!(!out.release().high);
    }

    struct Counter(u32);

    impl ReadValue for Counter {
        type Value = u32;

        fn read(&mut self) -> crate::Result<u32> {
            self.0 += 1;
            Ok(self.0)
        }
    }

    #[test]
    fn readings_are_published() {
        let topics = TopicRegistry::new();
        let topic = topics.topic::<u32>(30).unwrap();
        let rx = topic.subscribe_receiver();
        let mut sensor = Counter(0);
        assert_eq!(publish_reading(&mut sensor, &topic), Ok(1));
        assert_eq!(publish_reading(&mut sensor, &topic), Ok(1));
        assert_eq!(rx.try_recv(), Some(1));
        assert_eq!(rx.try_recv(), Some(2));
    }
}
