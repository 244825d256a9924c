//! Unified error types for the corelink framework.
//!
//! A single `Error` enum that every subsystem converts into, so the code
//! sitting above the protocol and messaging layers handles failures
//! uniformly. All variants are `Copy` so they can be passed across
//! queues and threads without allocation.
//!
//! "No handler matched" is not an error: it is a normal dispatch
//! outcome ([`ParseStatus::UnsupportedFrame`](crate::protocol::engine::ParseStatus))
//! and never surfaces as an error.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the framework funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The target (thread, peripheral, engine) is disabled.
    NotEnabled,
    /// An argument was outside its valid range.
    ParameterInvalid(&'static str),
    /// The transport or driver underneath failed.
    CommunicationFailure,
    /// A packet's recomputed CRC did not match the transmitted CRC.
    ChecksumMismatch,
    /// A blocking call exceeded its deadline.
    Timeout,
    /// A service id already has a handler.
    AlreadyRegistered(u16),
    /// No service is registered under this id.
    NotFound(u16),
    /// A topic or service id is already bound to a different sample type.
    TypeMismatch(u16),
    /// A frame could not be serialized.
    Encoding(EncodeError),
    /// A frame could not be deserialized.
    Decoding(DecodeError),
    /// A packet declared a length outside the accepted range.
    Length,
    /// A bounded queue had no free slot.
    QueueFull,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotEnabled => write!(f, "not enabled"),
            Self::ParameterInvalid(what) => write!(f, "invalid parameter: {what}"),
            Self::CommunicationFailure => write!(f, "communication failure"),
            Self::ChecksumMismatch => write!(f, "checksum mismatch"),
            Self::Timeout => write!(f, "timed out"),
            Self::AlreadyRegistered(id) => write!(f, "id {id} already registered"),
            Self::NotFound(id) => write!(f, "id {id} not found"),
            Self::TypeMismatch(id) => write!(f, "id {id} bound to a different type"),
            Self::Encoding(e) => write!(f, "encoding: {e}"),
            Self::Decoding(e) => write!(f, "decoding: {e}"),
            Self::Length => write!(f, "length out of range"),
            Self::QueueFull => write!(f, "queue full"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Codec errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// Payload does not fit the fixed output capacity.
    CapacityExceeded,
    /// Payload length disagrees with the identifier's schema.
    SchemaMismatch,
    /// No schema is registered for the identifier.
    UnknownIdentifier(u8),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded => write!(f, "payload exceeds output capacity"),
            Self::SchemaMismatch => write!(f, "payload length does not match schema"),
            Self::UnknownIdentifier(id) => write!(f, "unknown identifier 0x{id:02X}"),
        }
    }
}

impl From<EncodeError> for Error {
    fn from(e: EncodeError) -> Self {
        Self::Encoding(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Not enough bytes have arrived to build a frame yet.
    Incomplete,
    /// The identifier byte matches no registered schema.
    UnknownIdentifier(u8),
    /// A length field exceeds the payload capacity.
    Oversized,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomplete => write!(f, "insufficient bytes"),
            Self::UnknownIdentifier(id) => write!(f, "unknown identifier 0x{id:02X}"),
            Self::Oversized => write!(f, "declared length exceeds capacity"),
        }
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Self::Decoding(e)
    }
}

// ---------------------------------------------------------------------------
// Packet errors
// ---------------------------------------------------------------------------

/// Outcome of unwrapping a packet that did not yield a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    /// Fewer bytes than the header declares; keep them buffered.
    Length,
    /// Declared length can never fit; the leading byte is discarded.
    Oversized,
    /// CRC mismatch; the packet is dropped.
    ChecksumMismatch,
    /// CRC matched but the inner frame did not decode.
    Frame(DecodeError),
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Length => write!(f, "incomplete packet"),
            Self::Oversized => write!(f, "declared packet length too large"),
            Self::ChecksumMismatch => write!(f, "checksum mismatch"),
            Self::Frame(e) => write!(f, "frame: {e}"),
        }
    }
}

impl From<PacketError> for Error {
    fn from(e: PacketError) -> Self {
        match e {
            PacketError::Length | PacketError::Oversized => Self::Length,
            PacketError::ChecksumMismatch => Self::ChecksumMismatch,
            PacketError::Frame(d) => Self::Decoding(d),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The peer end is gone.
    Disconnected,
    /// The underlying bus reported a fault.
    Bus,
    /// The transmit path could not accept the bytes.
    Overflow,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "peer disconnected"),
            Self::Bus => write!(f, "bus fault"),
            Self::Overflow => write!(f, "transmit overflow"),
        }
    }
}

/// Transport failures surface to callers as a communication failure.
impl From<TransportError> for Error {
    fn from(_: TransportError) -> Self {
        Self::CommunicationFailure
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Framework-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

// ── Tests ────────────────────────────────────────────────────
