//! Protocol engine — incremental parser and handler-chain dispatcher.
//!
//! The engine owns a [`Transport`] and a [`FrameCodec`]. Received bytes
//! accumulate in a fixed buffer; each parse attempt builds at most one
//! [`Frame`] and walks the handler chain in registration order.
//!
//! ```text
//!                 ┌──────┐  bytes   ┌─────────┐
//!                 │ Idle │─────────▶│ Parsing │
//!                 └──────┘          └────┬────┘
//!          ┌───────────────┬─────────────┼──────────────────┐
//!          ▼               ▼             ▼                  ▼
//!   ┌────────────┐  ┌──────────┐  ┌──────────────────┐  ┌───────┐
//!   │ FoundFrame │  │ MidFrame │  │ UnsupportedFrame │  │ Error │
//!   └────────────┘  └──────────┘  └──────────────────┘  └───────┘
//!                   (bytes kept)    (normal, logged)    (1 byte dropped)
//! ```
//!
//! Synchronous request/response: [`ProtocolEngine::transmit_receive_frame`]
//! arms a correlation slot, transmits, then polls the transport until a
//! frame satisfying the [`ResponseMatcher`] arrives or the deadline passes.
//! Correlation is by identifier plus payload prefix only; two outstanding
//! requests that match the same response cannot be told apart.
//!
//! Handlers never touch the transport directly. Replies go into an
//! [`Outbox`] that the engine flushes once dispatch returns.

use core::time::Duration;
use std::time::Instant;

use heapless::Vec;
use log::{debug, info, warn};

use super::frame::{Frame, FrameCodec, MAX_FRAME_LEN};
use super::transport::Transport;
use crate::config::FrameworkConfig;
use crate::error::{DecodeError, Error};

/// Receive buffer: one maximal frame plus the head of the next.
const RX_CAPACITY: usize = 2 * MAX_FRAME_LEN;

/// Bytes pulled from the transport per read. A whole frame fits, so a
/// unit-delimited transport hands over a `Remaining` frame in one read.
const RX_CHUNK: usize = MAX_FRAME_LEN;

/// Replies one dispatch may queue.
pub const OUTBOX_DEPTH: usize = 4;

/// Longest payload prefix a [`ResponseMatcher`] compares.
pub const MAX_MATCH_PREFIX: usize = 8;

// ═══════════════════════════════════════════════════════════════
//  Status and state
// ═══════════════════════════════════════════════════════════════

/// Result of one parse/dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// A frame was built and a handler (or the correlation slot) took it.
    FoundFrame,
    /// Not enough bytes yet; partial state is retained.
    MidFrame,
    /// A frame was built but no handler claimed it.
    UnsupportedFrame,
    /// Bytes could not form a frame and were discarded.
    Error,
}

/// Engine state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Parsing,
    FoundFrame,
    MidFrame,
    UnsupportedFrame,
    Error,
}

impl From<ParseStatus> for EngineState {
    fn from(status: ParseStatus) -> Self {
        match status {
            ParseStatus::FoundFrame => Self::FoundFrame,
            ParseStatus::MidFrame => Self::MidFrame,
            ParseStatus::UnsupportedFrame => Self::UnsupportedFrame,
            ParseStatus::Error => Self::Error,
        }
    }
}

/// Running counters, mainly for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub frames_parsed: u32,
    pub unsupported: u32,
    pub decode_errors: u32,
    pub responses: u32,
    pub timeouts: u32,
    pub tx_failures: u32,
}

// ═══════════════════════════════════════════════════════════════
//  Handlers
// ═══════════════════════════════════════════════════════════════

/// Frames queued by handlers for transmission after dispatch.
#[derive(Debug, Default)]
pub struct Outbox {
    frames: Vec<Frame, OUTBOX_DEPTH>,
}

impl Outbox {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Queue a reply. Fails with [`Error::QueueFull`] past [`OUTBOX_DEPTH`].
    pub fn push(&mut self, frame: Frame) -> crate::Result<()> {
        self.frames.push(frame).map_err(|_| Error::QueueFull)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    fn take(&mut self) -> Vec<Frame, OUTBOX_DEPTH> {
        core::mem::take(&mut self.frames)
    }
}

/// One link in the engine's handler chain.
///
/// Returning [`ParseStatus::FoundFrame`] or [`ParseStatus::MidFrame`]
/// stops the chain; anything else passes the frame to the next handler.
pub trait FrameHandler: Send {
    fn handle(&mut self, frame: &Frame, outbox: &mut Outbox) -> ParseStatus;
}

impl<F> FrameHandler for F
where
    F: FnMut(&Frame, &mut Outbox) -> ParseStatus + Send,
{
    fn handle(&mut self, frame: &Frame, outbox: &mut Outbox) -> ParseStatus {
        self(frame, outbox)
    }
}

/// Which incoming frame answers an outstanding request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMatcher {
    identifier: u8,
    prefix: Vec<u8, MAX_MATCH_PREFIX>,
}

impl ResponseMatcher {
    /// Match any frame with this identifier.
    pub fn identifier(identifier: u8) -> Self {
        Self {
            identifier,
            prefix: Vec::new(),
        }
    }

    /// Match frames with this identifier whose payload starts with `prefix`.
    pub fn with_prefix(identifier: u8, prefix: &[u8]) -> crate::Result<Self> {
        let prefix = Vec::from_slice(prefix)
            .map_err(|_| Error::ParameterInvalid("response prefix too long"))?;
        Ok(Self { identifier, prefix })
    }

    pub fn matches(&self, frame: &Frame) -> bool {
        frame.identifier == self.identifier && frame.payload.starts_with(&self.prefix)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Engine
// ═══════════════════════════════════════════════════════════════

pub struct ProtocolEngine<T: Transport> {
    transport: T,
    codec: FrameCodec,
    rx: Vec<u8, RX_CAPACITY>,
    handlers: std::vec::Vec<Box<dyn FrameHandler>>,
    max_handlers: usize,
    expected: Option<ResponseMatcher>,
    response: Option<Frame>,
    state: EngineState,
    response_timeout: Duration,
    poll_interval: Duration,
    stats: EngineStats,
}

impl<T: Transport> ProtocolEngine<T> {
    pub fn new(transport: T, codec: FrameCodec) -> Self {
        Self::with_config(transport, codec, &FrameworkConfig::default())
    }

    pub fn with_config(transport: T, codec: FrameCodec, config: &FrameworkConfig) -> Self {
        Self {
            transport,
            codec,
            rx: Vec::new(),
            handlers: std::vec::Vec::new(),
            max_handlers: config.max_handlers,
            expected: None,
            response: None,
            state: EngineState::Idle,
            response_timeout: config.response_timeout(),
            poll_interval: config.poll_interval(),
            stats: EngineStats::default(),
        }
    }

    /// Append a handler to the end of the chain.
    pub fn add_handler(&mut self, handler: impl FrameHandler + 'static) -> crate::Result<()> {
        if self.handlers.len() >= self.max_handlers {
            return Err(Error::ParameterInvalid("handler chain full"));
        }
        self.handlers.push(Box::new(handler));
        Ok(())
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    pub fn codec_mut(&mut self) -> &mut FrameCodec {
        &mut self.codec
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    pub fn set_response_timeout(&mut self, timeout: Duration) {
        self.response_timeout = timeout;
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn pending_bytes(&self) -> usize {
        self.rx.len()
    }

    /// Drop any partial frame and return to `Idle`.
    pub fn reset(&mut self) {
        self.rx.clear();
        self.state = EngineState::Idle;
    }

    // ── Receive path ─────────────────────────────────────────

    /// Append `bytes` to the receive buffer and try to build one frame.
    ///
    /// Call with an empty slice to keep draining frames already buffered.
    pub fn parse_received_data(&mut self, bytes: &[u8]) -> ParseStatus {
        if self.rx.extend_from_slice(bytes).is_err() {
            warn!(
                "Engine: rx buffer overflow ({} + {} bytes), discarding",
                self.rx.len(),
                bytes.len()
            );
            self.rx.clear();
            self.stats.decode_errors += 1;
            self.state = EngineState::Error;
            return ParseStatus::Error;
        }

        self.state = EngineState::Parsing;
        let status = self.parse_one();
        self.state = status.into();
        status
    }

    fn parse_one(&mut self) -> ParseStatus {
        let frame = match self.codec.deserialize(&self.rx) {
            Ok((frame, used)) => {
                self.consume(used);
                frame
            }
            Err(DecodeError::Incomplete) => return ParseStatus::MidFrame,
            Err(DecodeError::UnknownIdentifier(id)) => {
                warn!("Engine: unknown frame identifier 0x{:02X}, skipping byte", id);
                self.consume(1);
                self.stats.decode_errors += 1;
                return ParseStatus::Error;
            }
            Err(DecodeError::Oversized) => {
                warn!("Engine: oversized frame ({} bytes), discarding", self.rx.len());
                self.rx.clear();
                self.stats.decode_errors += 1;
                return ParseStatus::Error;
            }
        };

        self.stats.frames_parsed += 1;
        debug!(
            "Engine: frame 0x{:02X} ({} payload bytes)",
            frame.identifier,
            frame.payload.len()
        );
        self.dispatch(&frame)
    }

    fn consume(&mut self, n: usize) {
        let n = n.min(self.rx.len());
        self.rx.copy_within(n.., 0);
        self.rx.truncate(self.rx.len() - n);
    }

    fn dispatch(&mut self, frame: &Frame) -> ParseStatus {
        if self.response.is_none() && self.expected.as_ref().is_some_and(|m| m.matches(frame)) {
            self.expected = None;
            self.response = Some(frame.clone());
            self.stats.responses += 1;
            return ParseStatus::FoundFrame;
        }

        let mut outbox = Outbox::new();
        let mut status = ParseStatus::UnsupportedFrame;
        for handler in &mut self.handlers {
            match handler.handle(frame, &mut outbox) {
                s @ (ParseStatus::FoundFrame | ParseStatus::MidFrame) => {
                    status = s;
                    break;
                }
                ParseStatus::Error => status = ParseStatus::Error,
                ParseStatus::UnsupportedFrame => {}
            }
        }

        if status == ParseStatus::UnsupportedFrame {
            self.stats.unsupported += 1;
            warn!("Engine: no handler for frame 0x{:02X}", frame.identifier);
        }

        for reply in outbox.take() {
            if let Err(e) = self.transmit_frame(&reply, false) {
                warn!("Engine: reply 0x{:02X} dropped: {}", reply.identifier, e);
            }
        }
        status
    }

    /// Read everything the transport has and dispatch every complete
    /// frame. Returns the number of frames dispatched.
    pub fn poll(&mut self) -> crate::Result<usize> {
        let mut dispatched = 0;
        let mut chunk = [0u8; RX_CHUNK];

        loop {
            // Read without asking `bytes_available` first: a closed link
            // only says so from `receive`.
            let want = RX_CHUNK.min(RX_CAPACITY - self.rx.len());
            if want == 0 {
                break;
            }
            let n = self.transport.receive(&mut chunk[..want]).map_err(|e| {
                warn!("Engine: transport receive failed: {}", e);
                Error::from(e)
            })?;
            if n == 0 {
                break;
            }

            let mut status = self.parse_received_data(&chunk[..n]);
            loop {
                if matches!(status, ParseStatus::FoundFrame | ParseStatus::UnsupportedFrame) {
                    dispatched += 1;
                }
                if status == ParseStatus::MidFrame || self.rx.is_empty() {
                    break;
                }
                status = self.parse_received_data(&[]);
            }
        }

        if self.rx.is_empty() && self.state != EngineState::Error {
            self.state = EngineState::Idle;
        }
        Ok(dispatched)
    }

    // ── Transmit path ────────────────────────────────────────

    /// Serialize `frame` and hand it to the transport, optionally waiting
    /// for the hardware to finish sending.
    pub fn transmit_frame(&mut self, frame: &Frame, wait_until_done: bool) -> crate::Result<()> {
        let bytes = self.codec.serialize(frame)?;
        let sent = self.transport.transmit(&bytes).and_then(|()| {
            if wait_until_done {
                self.transport.wait_transmit_complete()
            } else {
                Ok(())
            }
        });
        if let Err(e) = sent {
            self.stats.tx_failures += 1;
            warn!("Engine: transmit 0x{:02X} failed: {}", frame.identifier, e);
            return Err(e.into());
        }
        debug!("Engine: sent frame 0x{:02X} ({} bytes)", frame.identifier, bytes.len());
        Ok(())
    }

    /// Transmit `request` and block until a matching response arrives or
    /// the configured response timeout passes.
    pub fn transmit_receive_frame(
        &mut self,
        request: &Frame,
        matcher: ResponseMatcher,
    ) -> crate::Result<Frame> {
        let timeout = self.response_timeout;
        self.transmit_receive_frame_timeout(request, matcher, timeout)
    }

    pub fn transmit_receive_frame_timeout(
        &mut self,
        request: &Frame,
        matcher: ResponseMatcher,
        timeout: Duration,
    ) -> crate::Result<Frame> {
        self.response = None;
        self.expected = Some(matcher);

        let deadline = Instant::now() + timeout;
        if let Err(e) = self.transmit_frame(request, true) {
            self.expected = None;
            return Err(e);
        }

        loop {
            if let Some(response) = self.response.take() {
                return Ok(response);
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let waited = self
                .transport
                .wait_readable(self.poll_interval.min(deadline - now))
                .map_err(|e| {
                    warn!("Engine: link lost awaiting 0x{:02X}: {}", request.identifier, e);
                    Error::from(e)
                });
            if let Err(e) = waited.and_then(|_| self.poll()) {
                self.expected = None;
                return Err(e);
            }
        }

        self.expected = None;
        self.stats.timeouts += 1;
        warn!(
            "Engine: no response to frame 0x{:02X} within {:?}",
            request.identifier, timeout
        );
        Err(Error::Timeout)
    }
}

impl<T: Transport> Drop for ProtocolEngine<T> {
    fn drop(&mut self) {
        if self.stats.frames_parsed > 0 {
            info!(
                "Engine: closing after {} frames ({} unsupported, {} decode errors)",
                self.stats.frames_parsed, self.stats.unsupported, self.stats.decode_errors
            );
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
