//! Misbehaving transports for integration tests.
//!
//! Both wrap a real [`LoopbackTransport`] end and distort it: one hands
//! received bytes over a single byte at a time, the other flips a bit in
//! selected outgoing writes.

use std::time::Duration;

use corelink::error::TransportError;
use corelink::protocol::transport::{LoopbackTransport, Transport};

// ── Byte trickle ──────────────────────────────────────────────

/// Never returns more than one byte per `receive`.
pub struct TrickleTransport {
    inner: LoopbackTransport,
    pub reads: usize,
}

impl TrickleTransport {
    pub fn new(inner: LoopbackTransport) -> Self {
        Self { inner, reads: 0 }
    }
}

impl Transport for TrickleTransport {
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.inner.transmit(bytes)
    }

    fn bytes_available(&mut self) -> usize {
        self.inner.bytes_available().min(1)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let Some(first) = buf.first_mut() else {
            return Ok(0);
        };
        let mut one = [0u8; 1];
        let n = self.inner.receive(&mut one)?;
        if n == 1 {
            *first = one[0];
            self.reads += 1;
        }
        Ok(n)
    }

    fn wait_readable(&mut self, timeout: Duration) -> Result<bool, TransportError> {
        self.inner.wait_readable(timeout)
    }
}

// ── Bit corruption ────────────────────────────────────────────

/// Flips the low bit of the last byte of every write whose index is in
/// `corrupt`. Indexes count from zero.
pub struct CorruptingTransport {
    inner: LoopbackTransport,
    corrupt: Vec<usize>,
    writes: usize,
}

impl CorruptingTransport {
    pub fn new(inner: LoopbackTransport, corrupt: &[usize]) -> Self {
        Self {
            inner,
            corrupt: corrupt.to_vec(),
            writes: 0,
        }
    }
}

impl Transport for CorruptingTransport {
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let index = self.writes;
        self.writes += 1;
        if self.corrupt.contains(&index) {
            let mut damaged = bytes.to_vec();
            if let Some(last) = damaged.last_mut() {
                *last ^= 0x01;
            }
            return self.inner.transmit(&damaged);
        }
        self.inner.transmit(bytes)
    }

    fn bytes_available(&mut self) -> usize {
        self.inner.bytes_available()
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.inner.receive(buf)
    }

    fn wait_readable(&mut self, timeout: Duration) -> Result<bool, TransportError> {
        self.inner.wait_readable(timeout)
    }
}
