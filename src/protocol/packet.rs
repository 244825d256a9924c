//! Sequence/length/CRC wrapper for unreliable or streaming transports.
//!
//! Wire format (big-endian):
//! ```text
//! ┌──────────┬────────────┬──────────┬──────────────────────────┐
//! │ seq (1B) │ length (2B)│ crc (2B) │ frame bytes (length B)   │
//! └──────────┴────────────┴──────────┴──────────────────────────┘
//! ```
//!
//! The frame bytes are the identifier followed by the payload; the packet
//! length delimits them, so no inner length byte is needed. The CRC
//! (CRC-16/CCITT-FALSE) covers sequence, length and frame bytes.
//!
//! A packet whose CRC does not match is dropped. Resending is the business
//! of whoever sits above this layer.

use heapless::Vec;
use log::warn;

use super::frame::{Frame, MAX_PAYLOAD};
use crate::error::{DecodeError, EncodeError, PacketError};

/// Header: sequence (1) + length (2) + crc (2).
pub const PACKET_HEADER_LEN: usize = 5;

/// Largest frame body a packet may carry (identifier + payload).
pub const MAX_PACKET_BODY: usize = 1 + MAX_PAYLOAD;

/// Largest encoded packet.
pub const MAX_PACKET_LEN: usize = PACKET_HEADER_LEN + MAX_PACKET_BODY;

/// Receive buffer: room for one full packet plus the start of the next.
const RX_BUF_SIZE: usize = 2 * MAX_PACKET_LEN;

/// Encoded packet bytes.
pub type PacketBytes = Vec<u8, MAX_PACKET_LEN>;

// ═══════════════════════════════════════════════════════════════
//  CRC
// ═══════════════════════════════════════════════════════════════

/// CRC-16/CCITT-FALSE accumulator.
#[derive(Debug, Clone, Copy)]
pub struct Crc16(u16);

impl Default for Crc16 {
    fn default() -> Self {
        Self(Self::INIT_VALUE)
    }
}

impl Crc16 {
    const INIT_VALUE: u16 = 0xFFFF;
    const POLYNOMIAL: u16 = 0x1021;

    pub fn add(&mut self, byte: u8) {
        self.0 ^= u16::from(byte) << 8;
        for _bit in 0..8 {
            if (self.0 & 0x8000) != 0 {
                self.0 = (self.0 << 1) ^ Self::POLYNOMIAL;
            } else {
                self.0 <<= 1;
            }
        }
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        bytes.iter().for_each(|&byte| self.add(byte));
    }

    pub fn get(&self) -> u16 {
        self.0
    }

    /// One-shot checksum of the packet fields.
    pub fn packet(seq: u8, length: u16, body: &[u8]) -> u16 {
        let mut crc = Self::default();
        crc.add(seq);
        crc.add_bytes(&length.to_be_bytes());
        crc.add_bytes(body);
        crc.get()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Packet
// ═══════════════════════════════════════════════════════════════

/// A frame wrapped for transit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub sequence_number: u8,
    pub length: u16,
    pub crc: u16,
    pub frame: Frame,
}

impl Packet {
    /// Encode header and frame bytes.
    pub fn encode(&self) -> PacketBytes {
        let mut out = PacketBytes::new();
        // Capacity holds a maximal packet; these pushes cannot fail.
        let _ = out.push(self.sequence_number);
        let _ = out.extend_from_slice(&self.length.to_be_bytes());
        let _ = out.extend_from_slice(&self.crc.to_be_bytes());
        let _ = out.push(self.frame.identifier);
        let _ = out.extend_from_slice(&self.frame.payload);
        out
    }
}

/// Stateless wrap/unwrap rules.
pub struct PacketFramer;

impl PacketFramer {
    /// Wrap `frame` under sequence number `seq`, computing the CRC.
    pub fn wrap(seq: u8, frame: &Frame) -> Packet {
        let length = (1 + frame.payload.len()) as u16;
        let mut crc = Crc16::default();
        crc.add(seq);
        crc.add_bytes(&length.to_be_bytes());
        crc.add(frame.identifier);
        crc.add_bytes(&frame.payload);

        Packet {
            sequence_number: seq,
            length,
            crc: crc.get(),
            frame: frame.clone(),
        }
    }

    /// Wrap raw frame bytes (identifier first) as produced by a codec.
    pub fn wrap_bytes(seq: u8, frame_bytes: &[u8]) -> Result<Packet, EncodeError> {
        let (&identifier, payload) = frame_bytes
            .split_first()
            .ok_or(EncodeError::SchemaMismatch)?;
        let frame = Frame::new(identifier, payload)?;
        Ok(Self::wrap(seq, &frame))
    }

    /// Unwrap one packet from the front of `bytes`.
    ///
    /// Returns the packet and the bytes it occupied. On
    /// [`PacketError::Length`] nothing is consumed; the caller keeps the
    /// bytes buffered until more arrive.
    pub fn unwrap(bytes: &[u8]) -> Result<(Packet, usize), PacketError> {
        if bytes.len() < PACKET_HEADER_LEN {
            return Err(PacketError::Length);
        }

        let seq = bytes[0];
        let length = u16::from_be_bytes([bytes[1], bytes[2]]);
        let crc = u16::from_be_bytes([bytes[3], bytes[4]]);

        let body_len = length as usize;
        if body_len == 0 || body_len > MAX_PACKET_BODY {
            return Err(PacketError::Oversized);
        }

        let total = PACKET_HEADER_LEN + body_len;
        if bytes.len() < total {
            return Err(PacketError::Length);
        }

        let body = &bytes[PACKET_HEADER_LEN..total];
        if Crc16::packet(seq, length, body) != crc {
            return Err(PacketError::ChecksumMismatch);
        }

        let frame = Frame::new(body[0], &body[1..])
            .map_err(|_| PacketError::Frame(DecodeError::Oversized))?;

        Ok((
            Packet {
                sequence_number: seq,
                length,
                crc,
                frame,
            },
            total,
        ))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Streaming receiver
// ═══════════════════════════════════════════════════════════════

/// Drop counters kept by [`PacketReceiver`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketStats {
    pub packets: u32,
    pub checksum_errors: u32,
    pub resyncs: u32,
}

/// Accumulates transport bytes and yields whole packets.
///
/// Handles partial reads: a single read may carry part of a header, part
/// of a body, or several packets back to back.
///
/// After a bad header or CRC mismatch the receiver hunts byte by byte for
/// the next packet. The declared length of a rejected packet is never
/// trusted, since the corrupted bit may sit in the length field itself.
pub struct PacketReceiver {
    buf: Vec<u8, RX_BUF_SIZE>,
    stats: PacketStats,
    hunting: bool,
}

impl PacketReceiver {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            stats: PacketStats::default(),
            hunting: false,
        }
    }

    /// Append bytes. Returns how many were accepted; the rest must be
    /// offered again after [`next_packet`](Self::next_packet) drains.
    pub fn push(&mut self, data: &[u8]) -> usize {
        let room = self.buf.capacity() - self.buf.len();
        let n = room.min(data.len());
        // n fits by construction.
        let _ = self.buf.extend_from_slice(&data[..n]);
        n
    }

    /// Try to take one packet off the front of the buffer.
    ///
    /// `None` means more bytes are needed. `Some(Err(..))` reports a
    /// dropped packet or a resync; call again to continue.
    pub fn next_packet(&mut self) -> Option<Result<Packet, PacketError>> {
        match PacketFramer::unwrap(&self.buf) {
            Ok((packet, used)) => Some(Ok(self.accept(packet, used))),
            Err(PacketError::Length) => {
                if !self.hunting {
                    return None;
                }
                // A false header may claim more bytes than have arrived;
                // a complete packet further on takes precedence.
                let (skip, packet, used) = self.find_complete_packet()?;
                self.consume(skip);
                self.stats.resyncs += 1;
                Some(Ok(self.accept(packet, used)))
            }
            Err(PacketError::Oversized) => {
                // Header cannot be real; slide one byte to resync.
                self.consume(1);
                self.stats.resyncs += 1;
                self.hunting = true;
                Some(Err(PacketError::Oversized))
            }
            Err(PacketError::ChecksumMismatch) => {
                if self.hunting {
                    self.stats.resyncs += 1;
                } else {
                    warn!("Packet: CRC mismatch on seq {}, resyncing", self.buf[0]);
                    self.stats.checksum_errors += 1;
                    self.hunting = true;
                }
                self.consume(1);
                Some(Err(PacketError::ChecksumMismatch))
            }
            Err(e @ PacketError::Frame(_)) => {
                self.consume(1);
                self.hunting = true;
                Some(Err(e))
            }
        }
    }

    /// Discard buffered bytes (e.g. after a transport reconnect).
    pub fn reset(&mut self) {
        self.buf.clear();
        self.hunting = false;
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Bytes that [`push`](Self::push) can still accept.
    pub fn free(&self) -> usize {
        self.buf.capacity() - self.buf.len()
    }

    pub fn stats(&self) -> PacketStats {
        self.stats
    }

    fn accept(&mut self, packet: Packet, used: usize) -> Packet {
        self.consume(used);
        self.stats.packets += 1;
        self.hunting = false;
        packet
    }

    /// First offset past the front at which a whole, valid packet sits.
    fn find_complete_packet(&self) -> Option<(usize, Packet, usize)> {
        (1..self.buf.len()).find_map(|at| {
            PacketFramer::unwrap(&self.buf[at..])
                .ok()
                .map(|(packet, used)| (at, packet, used))
        })
    }

    fn consume(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.copy_within(n.., 0);
        self.buf.truncate(self.buf.len() - n);
    }
}

impl Default for PacketReceiver {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────
