//! Tagged frame envelope and its schema-driven codec.
//!
//! Wire format:
//! ```text
//! Fixed(n)   ┌────────┬──────────────────────┐
//!            │ id (1B)│ payload (exactly n B) │
//!            └────────┴──────────────────────┘
//! Prefixed   ┌────────┬──────────┬────────────────┐
//!            │ id (1B)│ len (1B) │ payload (len B) │
//!            └────────┴──────────┴────────────────┘
//! Remaining  ┌────────┬────────────────────────────────────┐
//!            │ id (1B)│ payload (rest of the delimited unit) │
//!            └────────┴────────────────────────────────────┘
//! ```
//!
//! The identifier byte selects a [`FrameSchema`], and the schema says how
//! many payload bytes follow. `Remaining` is only meaningful when something
//! underneath delimits units (a packet, or a transport that delivers each
//! write whole).
//!
//! Serialization never grows a buffer: output goes into a fixed-capacity
//! [`FrameBytes`] or a caller-supplied slice.

use heapless::Vec;

use crate::error::{DecodeError, EncodeError};

/// Maximum payload bytes carried by one frame.
pub const MAX_PAYLOAD: usize = 256;

/// Largest payload a `Prefixed` frame can describe with its 1-byte length.
pub const MAX_PREFIXED_PAYLOAD: usize = u8::MAX as usize;

/// Maximum serialized frame size (identifier + optional length + payload).
pub const MAX_FRAME_LEN: usize = 2 + MAX_PAYLOAD;

/// Maximum number of schemas one codec can hold.
const MAX_SCHEMAS: usize = 16;

/// Bounded frame payload.
pub type Payload = Vec<u8, MAX_PAYLOAD>;

/// Serialized frame bytes.
pub type FrameBytes = Vec<u8, MAX_FRAME_LEN>;

// ═══════════════════════════════════════════════════════════════
//  Frame
// ═══════════════════════════════════════════════════════════════

/// Self-describing unit exchanged at the protocol boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub identifier: u8,
    pub payload: Payload,
}

impl Frame {
    /// Build a frame, copying `payload`.
    pub fn new(identifier: u8, payload: &[u8]) -> Result<Self, EncodeError> {
        let payload = Vec::from_slice(payload).map_err(|_| EncodeError::CapacityExceeded)?;
        Ok(Self {
            identifier,
            payload,
        })
    }

    /// A frame with no payload.
    pub fn empty(identifier: u8) -> Self {
        Self {
            identifier,
            payload: Vec::new(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Schema
// ═══════════════════════════════════════════════════════════════

/// How the payload length of a frame is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSize {
    /// Exactly this many payload bytes.
    Fixed(usize),
    /// A 1-byte length follows the identifier.
    Prefixed,
    /// Everything after the identifier in a delimited unit.
    Remaining,
}

/// Binds an identifier to its payload layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSchema {
    pub identifier: u8,
    pub size: PayloadSize,
}

impl FrameSchema {
    pub const fn fixed(identifier: u8, len: usize) -> Self {
        Self {
            identifier,
            size: PayloadSize::Fixed(len),
        }
    }

    pub const fn prefixed(identifier: u8) -> Self {
        Self {
            identifier,
            size: PayloadSize::Prefixed,
        }
    }

    pub const fn remaining(identifier: u8) -> Self {
        Self {
            identifier,
            size: PayloadSize::Remaining,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Codec
// ═══════════════════════════════════════════════════════════════

/// Schema table plus the serialize/deserialize rules.
#[derive(Debug, Clone, Default)]
pub struct FrameCodec {
    schemas: Vec<FrameSchema, MAX_SCHEMAS>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            schemas: Vec::new(),
        }
    }

    /// Register a schema. Each identifier may be registered once.
    pub fn register(&mut self, schema: FrameSchema) -> crate::Result<()> {
        if self.schema(schema.identifier).is_some() {
            return Err(crate::Error::ParameterInvalid("frame identifier already has a schema"));
        }
        if let PayloadSize::Fixed(len) = schema.size {
            if len > MAX_PAYLOAD {
                return Err(crate::Error::ParameterInvalid("fixed payload exceeds MAX_PAYLOAD"));
            }
        }
        self.schemas
            .push(schema)
            .map_err(|_| crate::Error::ParameterInvalid("schema table full"))
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_schema(mut self, schema: FrameSchema) -> crate::Result<Self> {
        self.register(schema)?;
        Ok(self)
    }

    pub fn schema(&self, identifier: u8) -> Option<&FrameSchema> {
        self.schemas.iter().find(|s| s.identifier == identifier)
    }

    /// Serialize into a fixed-capacity buffer.
    pub fn serialize(&self, frame: &Frame) -> Result<FrameBytes, EncodeError> {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = self.serialize_into(frame, &mut buf)?;
        // n <= MAX_FRAME_LEN by construction.
        Vec::from_slice(&buf[..n]).map_err(|_| EncodeError::CapacityExceeded)
    }

    /// Serialize into `out`. Returns the number of bytes written.
    ///
    /// Fails with [`EncodeError::CapacityExceeded`] when `out` (or the
    /// 1-byte length of a `Prefixed` frame) cannot hold the payload.
    pub fn serialize_into(&self, frame: &Frame, out: &mut [u8]) -> Result<usize, EncodeError> {
        let schema = self
            .schema(frame.identifier)
            .ok_or(EncodeError::UnknownIdentifier(frame.identifier))?;
        let payload = frame.payload.as_slice();

        let header_len = match schema.size {
            PayloadSize::Fixed(len) => {
                if payload.len() != len {
                    return Err(EncodeError::SchemaMismatch);
                }
                1
            }
            PayloadSize::Prefixed => {
                if payload.len() > MAX_PREFIXED_PAYLOAD {
                    return Err(EncodeError::CapacityExceeded);
                }
                2
            }
            PayloadSize::Remaining => 1,
        };

        let total = header_len + payload.len();
        if total > out.len() {
            return Err(EncodeError::CapacityExceeded);
        }

        out[0] = frame.identifier;
        if header_len == 2 {
            out[1] = payload.len() as u8;
        }
        out[header_len..total].copy_from_slice(payload);
        Ok(total)
    }

    /// Build one frame from the front of `bytes`.
    ///
    /// Returns the frame and the number of bytes consumed. Fails with
    /// [`DecodeError::Incomplete`] while the frame is still arriving and
    /// [`DecodeError::UnknownIdentifier`] when no schema matches.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<(Frame, usize), DecodeError> {
        let (&identifier, rest) = bytes.split_first().ok_or(DecodeError::Incomplete)?;
        let schema = self
            .schema(identifier)
            .ok_or(DecodeError::UnknownIdentifier(identifier))?;

        let (start, len) = match schema.size {
            PayloadSize::Fixed(len) => (1, len),
            PayloadSize::Prefixed => {
                let &len = rest.first().ok_or(DecodeError::Incomplete)?;
                (2, len as usize)
            }
            PayloadSize::Remaining => {
                if rest.len() > MAX_PAYLOAD {
                    return Err(DecodeError::Oversized);
                }
                (1, rest.len())
            }
        };

        let end = start + len;
        if bytes.len() < end {
            return Err(DecodeError::Incomplete);
        }

        let payload = Vec::from_slice(&bytes[start..end]).map_err(|_| DecodeError::Oversized)?;
        Ok((
            Frame {
                identifier,
                payload,
            },
            end,
        ))
    }
}

// ── Tests ────────────────────────────────────────────────────
