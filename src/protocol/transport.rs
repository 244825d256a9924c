//! Transport abstraction — any byte-oriented channel.
//!
//! Concrete hardware transports (UART, SPI, I2C, USB) live outside this
//! crate and implement [`Transport`]. Provided here:
//!
//! - [`NullTransport`]: discards writes, never reads.
//! - [`LoopbackTransport`]: in-process pair for simulation and tests.
//! - [`PacketTransport`]: wraps any transport with sequence/length/CRC
//!   packets so frames survive a lossy byte stream.
//!
//! The protocol engine is generic over `Transport`, so adding a new
//! transport requires zero changes to the protocol logic.

use core::time::Duration;
use std::sync::Arc;

use heapless::{Deque, Vec};
use log::{debug, warn};

use super::packet::{MAX_PACKET_LEN, PacketFramer, PacketReceiver, PacketStats};
use crate::error::TransportError;
use crate::sync::{Mutex, WaitCondition};

/// Byte-oriented transport channel.
pub trait Transport {
    /// Queue `bytes` for transmission.
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Number of received bytes ready to read.
    fn bytes_available(&mut self) -> usize;

    /// Read up to `buf.len()` bytes. Returns 0 if nothing is available.
    ///
    /// A link that has gone away reports it here once its buffered bytes
    /// are drained, so callers may read even when nothing is available.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Block until the hardware reports the last transmit finished.
    fn wait_transmit_complete(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Block until data is readable or `timeout` passes.
    ///
    /// Returns `Ok(true)` if bytes are available, `Ok(false)` on timeout,
    /// and an error as soon as the link is known to be gone.
    fn wait_readable(&mut self, timeout: Duration) -> Result<bool, TransportError> {
        if self.bytes_available() > 0 {
            return Ok(true);
        }
        std::thread::sleep(timeout);
        Ok(self.bytes_available() > 0)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).transmit(bytes)
    }

    fn bytes_available(&mut self) -> usize {
        (**self).bytes_available()
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        (**self).receive(buf)
    }

    fn wait_transmit_complete(&mut self) -> Result<(), TransportError> {
        (**self).wait_transmit_complete()
    }

    fn wait_readable(&mut self, timeout: Duration) -> Result<bool, TransportError> {
        (**self).wait_readable(timeout)
    }
}

/// A null transport that discards all writes and never reads.
pub struct NullTransport;

impl Transport for NullTransport {
    fn transmit(&mut self, _bytes: &[u8]) -> Result<(), TransportError> {
        Ok(())
    }

    fn bytes_available(&mut self) -> usize {
        0
    }

    fn receive(&mut self, _buf: &mut [u8]) -> Result<usize, TransportError> {
        Ok(0)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Loopback
// ═══════════════════════════════════════════════════════════════

/// Units in flight per direction.
const PIPE_DEPTH: usize = 32;

type Unit = Vec<u8, MAX_PACKET_LEN>;

/// Unit-preserving byte queue: every `transmit` arrives as one unit and a
/// single `receive` never spans two units.
struct UnitQueue {
    units: Deque<Unit, PIPE_DEPTH>,
    /// Bytes of the front unit already handed out.
    offset: usize,
}

impl UnitQueue {
    const fn new() -> Self {
        Self {
            units: Deque::new(),
            offset: 0,
        }
    }

    fn push(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let unit = Vec::from_slice(bytes).map_err(|_| TransportError::Overflow)?;
        self.units.push_back(unit).map_err(|_| TransportError::Overflow)
    }

    fn available(&self) -> usize {
        self.units.iter().map(|u| u.len()).sum::<usize>() - self.offset
    }

    fn take(&mut self, buf: &mut [u8]) -> usize {
        let Some(front) = self.units.front() else {
            return 0;
        };
        let rest = &front[self.offset..];
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.offset += n;
        if self.offset == front.len() {
            self.units.pop_front();
            self.offset = 0;
        }
        n
    }
}

struct Pipe {
    state: Mutex<PipeState>,
    readable: WaitCondition,
}

struct PipeState {
    queue: UnitQueue,
    closed: bool,
}

impl Pipe {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PipeState {
                queue: UnitQueue::new(),
                closed: false,
            }),
            readable: WaitCondition::new(),
        })
    }
}

/// One end of an in-process link.
pub struct LoopbackTransport {
    tx: Arc<Pipe>,
    rx: Arc<Pipe>,
}

impl LoopbackTransport {
    /// Two connected ends: bytes written to one are read from the other.
    pub fn pair() -> (Self, Self) {
        let a_to_b = Pipe::new();
        let b_to_a = Pipe::new();
        (
            Self {
                tx: Arc::clone(&a_to_b),
                rx: Arc::clone(&b_to_a),
            },
            Self {
                tx: b_to_a,
                rx: a_to_b,
            },
        )
    }

    /// Tear the link down in both directions.
    pub fn disconnect(&self) {
        for pipe in [&self.tx, &self.rx] {
            pipe.state.lock().closed = true;
            pipe.readable.notify_all();
        }
    }
}

impl Transport for LoopbackTransport {
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.tx.state.lock();
        if state.closed {
            return Err(TransportError::Disconnected);
        }
        state.queue.push(bytes)?;
        drop(state);
        self.tx.readable.notify_all();
        Ok(())
    }

    fn bytes_available(&mut self) -> usize {
        self.rx.state.lock().queue.available()
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = self.rx.state.lock();
        let n = state.queue.take(buf);
        if n == 0 && state.closed {
            return Err(TransportError::Disconnected);
        }
        Ok(n)
    }

    fn wait_readable(&mut self, timeout: Duration) -> Result<bool, TransportError> {
        let state = self.rx.state.lock();
        let (state, _) = self.rx.readable.wait_timeout_while(state, timeout, |s| {
            s.queue.units.is_empty() && !s.closed
        });
        match (state.queue.units.is_empty(), state.closed) {
            (false, _) => Ok(true),
            (true, true) => Err(TransportError::Disconnected),
            (true, false) => Ok(false),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Packet transport
// ═══════════════════════════════════════════════════════════════

/// Frames decoded but not yet read by the engine.
const READY_DEPTH: usize = 8;

/// Read chunk when pulling from the inner transport.
const PULL_CHUNK: usize = 64;

/// Wraps every write in a packet and unwraps packets on the way in.
///
/// Corrupted packets are dropped and counted; sequence gaps are logged.
/// Each good packet is delivered as one unit, so a `Remaining` frame
/// schema sees exactly one frame per read.
pub struct PacketTransport<T: Transport> {
    inner: T,
    rx: PacketReceiver,
    ready: UnitQueue,
    ready_count: usize,
    next_seq: u8,
    expected_seq: Option<u8>,
    sequence_gaps: u32,
    /// Inner failure held until the frames read before it are consumed.
    failure: Option<TransportError>,
}

impl<T: Transport> PacketTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            rx: PacketReceiver::new(),
            ready: UnitQueue::new(),
            ready_count: 0,
            next_seq: 0,
            expected_seq: None,
            sequence_gaps: 0,
            failure: None,
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn packet_stats(&self) -> PacketStats {
        self.rx.stats()
    }

    pub fn sequence_gaps(&self) -> u32 {
        self.sequence_gaps
    }

    /// Move inner bytes through the packet receiver into `ready`.
    fn pump(&mut self) {
        let mut chunk = [0u8; PULL_CHUNK];
        while self.failure.is_none() && self.rx.free() > 0 {
            let want = self.rx.free().min(PULL_CHUNK);
            match self.inner.receive(&mut chunk[..want]) {
                Ok(0) => break,
                Ok(n) => {
                    self.rx.push(&chunk[..n]);
                }
                Err(e) => {
                    warn!("PacketTransport: inner receive failed: {e}");
                    self.failure = Some(e);
                }
            }
            self.drain_packets();
        }
        self.drain_packets();
    }

    /// Report a held failure once no decoded frame is left ahead of it.
    fn take_failure(&mut self) -> Result<(), TransportError> {
        if self.ready.units.is_empty() {
            if let Some(e) = self.failure.take() {
                return Err(e);
            }
        }
        Ok(())
    }

    fn drain_packets(&mut self) {
        while self.ready_count < READY_DEPTH {
            let Some(result) = self.rx.next_packet() else {
                break;
            };
            let Ok(packet) = result else {
                continue;
            };

            if let Some(expected) = self.expected_seq {
                if packet.sequence_number != expected {
                    self.sequence_gaps += 1;
                    warn!(
                        "PacketTransport: sequence gap (expected {}, got {})",
                        expected, packet.sequence_number
                    );
                }
            }
            self.expected_seq = Some(packet.sequence_number.wrapping_add(1));

            let mut unit = Unit::new();
            let _ = unit.push(packet.frame.identifier);
            let _ = unit.extend_from_slice(&packet.frame.payload);
            if self.ready.push(&unit).is_ok() {
                self.ready_count += 1;
            }
        }
    }

    fn take_ready(&mut self, buf: &mut [u8]) -> usize {
        let before = self.ready.units.len();
        let n = self.ready.take(buf);
        if self.ready.units.len() < before {
            self.ready_count -= 1;
        }
        n
    }
}

impl<T: Transport> Transport for PacketTransport<T> {
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let packet =
            PacketFramer::wrap_bytes(self.next_seq, bytes).map_err(|_| TransportError::Overflow)?;
        debug!(
            "PacketTransport: tx seq={} len={}",
            packet.sequence_number, packet.length
        );
        self.next_seq = self.next_seq.wrapping_add(1);
        self.inner.transmit(&packet.encode())
    }

    fn bytes_available(&mut self) -> usize {
        self.pump();
        self.ready.available()
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.pump();
        let n = self.take_ready(buf);
        if n == 0 {
            self.take_failure()?;
        }
        Ok(n)
    }

    fn wait_transmit_complete(&mut self) -> Result<(), TransportError> {
        self.inner.wait_transmit_complete()
    }

    fn wait_readable(&mut self, timeout: Duration) -> Result<bool, TransportError> {
        if self.bytes_available() > 0 {
            return Ok(true);
        }
        self.take_failure()?;
        let inner_ready = self.inner.wait_readable(timeout);
        if self.bytes_available() > 0 {
            return Ok(true);
        }
        self.take_failure()?;
        inner_ready.map(|_| false)
    }
}

// ── Tests ────────────────────────────────────────────────────
