//! Fuzz target: `ProtocolEngine::parse_received_data`
//!
//! Drives arbitrary byte sequences through the frame codec and the engine's
//! incremental parser, split at an input-chosen point. The parser must
//! never panic, never hold more than its receive buffer, and every frame it
//! builds must re-serialize to the bytes it came from.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use corelink::protocol::engine::{Outbox, ParseStatus, ProtocolEngine};
use corelink::protocol::frame::{Frame, FrameCodec, FrameSchema, MAX_FRAME_LEN};
use corelink::protocol::transport::NullTransport;
use libfuzzer_sys::fuzz_target;

fn codec() -> FrameCodec {
    let mut codec = FrameCodec::new();
    let _ = codec.register(FrameSchema::fixed(0x01, 4));
    let _ = codec.register(FrameSchema::prefixed(0x02));
    let _ = codec.register(FrameSchema::remaining(0x03));
    codec
}

fuzz_target!(|data: &[u8]| {
    let codec = codec();

    // Stateless decode: whatever comes out must encode back to the input prefix.
    if let Ok((frame, used)) = codec.deserialize(data) {
        assert!(used <= data.len());
        let bytes = codec.serialize(&frame).expect("decoded frame must re-encode");
        assert_eq!(bytes.as_slice(), &data[..used]);
    }

    // Incremental parse across two reads.
    let split = data.first().map_or(0, |b| usize::from(*b) % (data.len() + 1));
    let mut engine = ProtocolEngine::new(NullTransport, codec);
    engine
        .add_handler(|_: &Frame, _: &mut Outbox| ParseStatus::FoundFrame)
        .expect("one handler fits");

    for chunk in [&data[..split], &data[split..]] {
        let mut status = engine.parse_received_data(chunk);
        while status != ParseStatus::MidFrame && engine.pending_bytes() > 0 {
            status = engine.parse_received_data(&[]);
        }
        assert!(engine.pending_bytes() <= 2 * MAX_FRAME_LEN);
    }
});
