//! Transport-agnostic binary protocol.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Protocol Stack                            │
//! │                                                                  │
//! │  ┌───────────┐   ┌──────────────┐   ┌──────────────────────────┐ │
//! │  │ Transport │──▶│ PacketFramer │──▶│ FrameCodec               │ │
//! │  │ (trait)   │   │ (seq/len/CRC)│   │ (identifier → schema)    │ │
//! │  └───────────┘   └──────────────┘   └────────────┬─────────────┘ │
//! │       ▲            (optional)                    ▼               │
//! │       │                             ┌──────────────────────────┐ │
//! │       │          Outbox replies     │ ProtocolEngine           │ │
//! │       └─────────────────────────────│ handler chain + response │ │
//! │                                     │ correlation              │ │
//! │                                     └────────────┬─────────────┘ │
//! │                                                  ▼               │
//! │                                     ┌──────────────────────────┐ │
//! │                                     │ MessageRouter            │ │
//! │                                     │ (group id → message id)  │ │
//! │                                     └──────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod engine;
pub mod frame;
pub mod message;
pub mod packet;
pub mod transport;

pub use engine::{EngineState, EngineStats, FrameHandler, Outbox, ParseStatus, ProtocolEngine, ResponseMatcher};
pub use frame::{Frame, FrameCodec, FrameSchema, PayloadSize};
pub use message::{BinaryMessage, MessageHandler, MessageHandlerGroup, MessageRouter, on_message};
pub use packet::{Packet, PacketFramer, PacketReceiver};
pub use transport::{LoopbackTransport, NullTransport, PacketTransport, Transport};
