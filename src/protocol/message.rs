//! Binary messages routed by `(group id, message id)`.
//!
//! A message rides inside a frame whose identifier is
//! [`MESSAGE_FRAME_ID`]:
//!
//! ```text
//! ┌──────────┬─────────────────┬────────────────┬──────────────────────┐
//! │ 0x4D (1B)│ group id (2B BE)│ message id (1B)│ payload (remaining)  │
//! └──────────┴─────────────────┴────────────────┴──────────────────────┘
//! ```
//!
//! Dispatch is two-level. The [`MessageRouter`] installs a
//! [`MessageDispatcher`] in its engine's handler chain; the dispatcher
//! finds the first [`MessageHandlerGroup`] whose group id matches and
//! walks that group's handlers in registration order. A later group with
//! the same id is shadowed and never sees traffic.

use std::sync::Arc;

use heapless::Vec;
use log::{debug, info, warn};

use super::engine::{FrameHandler, Outbox, ParseStatus, ProtocolEngine, ResponseMatcher};
use super::frame::{Frame, FrameCodec, FrameSchema, MAX_PAYLOAD};
use super::transport::Transport;
use crate::config::FrameworkConfig;
use crate::error::EncodeError;
use crate::sync::Mutex;

/// Frame identifier carrying a binary message.
pub const MESSAGE_FRAME_ID: u8 = 0x4D;

/// Group id (2) + message id (1).
pub const MESSAGE_HEADER_LEN: usize = 3;

/// Largest message payload that fits in one frame.
pub const MAX_MESSAGE_PAYLOAD: usize = MAX_PAYLOAD - MESSAGE_HEADER_LEN;

pub type MessagePayload = Vec<u8, MAX_MESSAGE_PAYLOAD>;

// ═══════════════════════════════════════════════════════════════
//  BinaryMessage
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMessage {
    pub group_id: u16,
    pub message_id: u8,
    pub payload: MessagePayload,
}

impl BinaryMessage {
    pub fn new(group_id: u16, message_id: u8, payload: &[u8]) -> Result<Self, EncodeError> {
        Ok(Self {
            group_id,
            message_id,
            payload: Vec::from_slice(payload).map_err(|_| EncodeError::CapacityExceeded)?,
        })
    }

    /// Extract a message from a frame. `None` if the frame is not a
    /// message frame or is too short to hold the header.
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        if frame.identifier != MESSAGE_FRAME_ID || frame.payload.len() < MESSAGE_HEADER_LEN {
            return None;
        }
        let group_id = u16::from_be_bytes([frame.payload[0], frame.payload[1]]);
        let message_id = frame.payload[2];
        let payload = Vec::from_slice(&frame.payload[MESSAGE_HEADER_LEN..]).ok()?;
        Some(Self {
            group_id,
            message_id,
            payload,
        })
    }

    pub fn to_frame(&self) -> Frame {
        let mut frame = Frame::empty(MESSAGE_FRAME_ID);
        // Header plus MAX_MESSAGE_PAYLOAD fits a frame payload exactly.
        let _ = frame.payload.extend_from_slice(&self.group_id.to_be_bytes());
        let _ = frame.payload.push(self.message_id);
        let _ = frame.payload.extend_from_slice(&self.payload);
        frame
    }

    /// A message with the same group and id carrying `payload`.
    pub fn reply(&self, payload: &[u8]) -> Result<Self, EncodeError> {
        Self::new(self.group_id, self.message_id, payload)
    }

    /// Payload prefix that identifies this message's (group, id).
    pub fn identity(&self) -> [u8; MESSAGE_HEADER_LEN] {
        let [hi, lo] = self.group_id.to_be_bytes();
        [hi, lo, self.message_id]
    }
}

// ═══════════════════════════════════════════════════════════════
//  Handlers and groups
// ═══════════════════════════════════════════════════════════════

/// Member of a [`MessageHandlerGroup`].
pub trait MessageHandler: Send {
    fn handle(&mut self, message: &BinaryMessage, outbox: &mut Outbox) -> ParseStatus;
}

impl<F> MessageHandler for F
where
    F: FnMut(&BinaryMessage, &mut Outbox) -> ParseStatus + Send,
{
    fn handle(&mut self, message: &BinaryMessage, outbox: &mut Outbox) -> ParseStatus {
        self(message, outbox)
    }
}

/// Handler bound to one message id. Built with [`on_message`].
pub struct OnMessage<F> {
    message_id: u8,
    callback: F,
}

/// Handle `message_id` with `callback`. `Ok` claims the message; `Err` is
/// logged and reported as [`ParseStatus::Error`].
pub fn on_message<F>(message_id: u8, callback: F) -> OnMessage<F>
where
    F: FnMut(&BinaryMessage, &mut Outbox) -> crate::Result<()> + Send,
{
    OnMessage {
        message_id,
        callback,
    }
}

impl<F> MessageHandler for OnMessage<F>
where
    F: FnMut(&BinaryMessage, &mut Outbox) -> crate::Result<()> + Send,
{
    fn handle(&mut self, message: &BinaryMessage, outbox: &mut Outbox) -> ParseStatus {
        if message.message_id != self.message_id {
            return ParseStatus::UnsupportedFrame;
        }
        match (self.callback)(message, outbox) {
            Ok(()) => ParseStatus::FoundFrame,
            Err(e) => {
                warn!(
                    "Router[{}:{}]: handler failed: {}",
                    message.group_id, message.message_id, e
                );
                ParseStatus::Error
            }
        }
    }
}

/// Ordered handlers sharing one group id.
pub struct MessageHandlerGroup {
    group_id: u16,
    handlers: std::vec::Vec<Box<dyn MessageHandler>>,
}

impl MessageHandlerGroup {
    pub fn new(group_id: u16) -> Self {
        Self {
            group_id,
            handlers: std::vec::Vec::new(),
        }
    }

    pub fn group_id(&self) -> u16 {
        self.group_id
    }

    pub fn add(&mut self, handler: impl MessageHandler + 'static) {
        self.handlers.push(Box::new(handler));
    }

    /// Builder-style [`add`](Self::add).
    #[must_use]
    pub fn with(mut self, handler: impl MessageHandler + 'static) -> Self {
        self.add(handler);
        self
    }

    /// Offer `message` to each handler until one claims it. The caller has
    /// already checked the group id.
    fn dispatch(&mut self, message: &BinaryMessage, outbox: &mut Outbox) -> ParseStatus {
        let mut status = ParseStatus::UnsupportedFrame;
        for handler in &mut self.handlers {
            match handler.handle(message, outbox) {
                s @ (ParseStatus::FoundFrame | ParseStatus::MidFrame) => return s,
                ParseStatus::Error => status = ParseStatus::Error,
                ParseStatus::UnsupportedFrame => {}
            }
        }
        status
    }
}

type SharedGroups = Arc<Mutex<std::vec::Vec<MessageHandlerGroup>>>;

/// Frame handler that demultiplexes message frames onto groups.
pub struct MessageDispatcher {
    groups: SharedGroups,
}

impl MessageDispatcher {
    fn new(groups: SharedGroups) -> Self {
        Self { groups }
    }
}

impl FrameHandler for MessageDispatcher {
    fn handle(&mut self, frame: &Frame, outbox: &mut Outbox) -> ParseStatus {
        if frame.identifier != MESSAGE_FRAME_ID {
            return ParseStatus::UnsupportedFrame;
        }
        let Some(message) = BinaryMessage::from_frame(frame) else {
            warn!("Router: message frame too short ({} bytes)", frame.payload.len());
            return ParseStatus::Error;
        };
        debug!(
            "Router[{}:{}]: {} payload bytes",
            message.group_id,
            message.message_id,
            message.payload.len()
        );

        let mut groups = self.groups.lock();
        match groups.iter_mut().find(|g| g.group_id == message.group_id) {
            Some(group) => group.dispatch(&message, outbox),
            None => ParseStatus::UnsupportedFrame,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Router
// ═══════════════════════════════════════════════════════════════

/// Binary-message layer over a [`ProtocolEngine`].
pub struct MessageRouter<T: Transport> {
    engine: ProtocolEngine<T>,
    groups: SharedGroups,
}

impl<T: Transport> MessageRouter<T> {
    /// Router with a codec that only knows message frames.
    pub fn new(transport: T, config: &FrameworkConfig) -> crate::Result<Self> {
        Self::with_codec(transport, FrameCodec::new(), config)
    }

    /// Router sharing the engine with other frame types already in `codec`.
    /// The message schema is added if `codec` lacks it.
    pub fn with_codec(
        transport: T,
        mut codec: FrameCodec,
        config: &FrameworkConfig,
    ) -> crate::Result<Self> {
        if codec.schema(MESSAGE_FRAME_ID).is_none() {
            codec.register(FrameSchema::remaining(MESSAGE_FRAME_ID))?;
        }
        let groups: SharedGroups = Arc::new(Mutex::new(std::vec::Vec::new()));
        let mut engine = ProtocolEngine::with_config(transport, codec, config);
        engine.add_handler(MessageDispatcher::new(Arc::clone(&groups)))?;
        Ok(Self { engine, groups })
    }

    /// Append a group. A group whose id is already present is kept but
    /// never receives dispatch.
    pub fn add_group(&mut self, group: MessageHandlerGroup) {
        let mut groups = self.groups.lock();
        if groups.iter().any(|g| g.group_id == group.group_id) {
            warn!(
                "Router: group {} already registered, new group is shadowed",
                group.group_id
            );
        } else {
            info!("Router: group {} registered", group.group_id);
        }
        groups.push(group);
    }

    pub fn group_count(&self) -> usize {
        self.groups.lock().len()
    }

    pub fn build_message_frame(
        group_id: u16,
        message_id: u8,
        payload: &[u8],
    ) -> crate::Result<Frame> {
        Ok(BinaryMessage::new(group_id, message_id, payload)?.to_frame())
    }

    /// Fire-and-forget send.
    pub fn send(&mut self, group_id: u16, message_id: u8, payload: &[u8]) -> crate::Result<()> {
        let frame = Self::build_message_frame(group_id, message_id, payload)?;
        self.engine.transmit_frame(&frame, true)
    }

    /// Send and block for the response carrying the same (group, id).
    pub fn request(
        &mut self,
        group_id: u16,
        message_id: u8,
        payload: &[u8],
    ) -> crate::Result<BinaryMessage> {
        let message = BinaryMessage::new(group_id, message_id, payload)?;
        let matcher = ResponseMatcher::with_prefix(MESSAGE_FRAME_ID, &message.identity())?;
        let response = self.engine.transmit_receive_frame(&message.to_frame(), matcher)?;
        BinaryMessage::from_frame(&response)
            .ok_or(crate::Error::Decoding(crate::error::DecodeError::Incomplete))
    }

    /// Dispatch everything the transport has delivered.
    pub fn poll(&mut self) -> crate::Result<usize> {
        self.engine.poll()
    }

    pub fn engine(&self) -> &ProtocolEngine<T> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ProtocolEngine<T> {
        &mut self.engine
    }
}

// ── Tests ────────────────────────────────────────────────────
