//! Protocol stack against misbehaving transports.

use std::sync::Arc;

use corelink::protocol::engine::{EngineState, Outbox, ParseStatus, ProtocolEngine};
use corelink::protocol::frame::{Frame, FrameCodec, FrameSchema};
use corelink::protocol::message::{BinaryMessage, MessageHandlerGroup, MessageRouter, on_message};
use corelink::protocol::transport::{LoopbackTransport, PacketTransport, Transport};
use corelink::sync::Mutex;
use corelink::{Context, Error, FrameworkConfig};

use crate::mock_transport::{CorruptingTransport, TrickleTransport};

const STATUS_ID: u8 = 0x01;
const LOG_ID: u8 = 0x02;

fn codec() -> FrameCodec {
    FrameCodec::new()
        .with_schema(FrameSchema::fixed(STATUS_ID, 2))
        .and_then(|c| c.with_schema(FrameSchema::prefixed(LOG_ID)))
        .unwrap()
}

type Seen = Arc<Mutex<Vec<Frame>>>;

fn recorder(seen: &Seen) -> impl FnMut(&Frame, &mut Outbox) -> ParseStatus + Send + 'static {
    let seen = Arc::clone(seen);
    move |frame: &Frame, _: &mut Outbox| {
        seen.lock().push(frame.clone());
        ParseStatus::FoundFrame
    }
}

// ── Partial reads ─────────────────────────────────────────────

#[test]
fn frames_survive_byte_at_a_time_delivery() {
    let (peer_end, local_end) = LoopbackTransport::pair();
    let mut peer = ProtocolEngine::new(peer_end, codec());
    let mut engine = ProtocolEngine::new(TrickleTransport::new(local_end), codec());
    let seen: Seen = Arc::default();
    engine.add_handler(recorder(&seen)).unwrap();

    let frames = [
        Frame::new(LOG_ID, b"boot ok").unwrap(),
        Frame::new(STATUS_ID, &[0x12, 0x34]).unwrap(),
        Frame::new(LOG_ID, b"").unwrap(),
    ];
    for f in &frames {
        peer.transmit_frame(f, true).unwrap();
    }

    assert_eq!(engine.poll(), Ok(3));
    assert_eq!(seen.lock().as_slice(), &frames);
    assert_eq!(engine.transport().reads, 9 + 3 + 2);
    assert_eq!(engine.state(), EngineState::Idle);
    assert_eq!(engine.pending_bytes(), 0);
}

#[test]
fn garbage_before_a_frame_is_skipped() {
    let (mut raw, local_end) = LoopbackTransport::pair();
    let mut engine = ProtocolEngine::new(local_end, codec());
    let seen: Seen = Arc::default();
    engine.add_handler(recorder(&seen)).unwrap();

    raw.transmit(&[0xEE, 0xEF, STATUS_ID, 0xAA, 0xBB]).unwrap();

    assert_eq!(engine.poll(), Ok(1));
    assert_eq!(engine.stats().decode_errors, 2);
    assert_eq!(seen.lock()[0], Frame::new(STATUS_ID, &[0xAA, 0xBB]).unwrap());
}

// ── Shared codec ──────────────────────────────────────────────

#[test]
fn router_shares_the_engine_with_raw_frames() {
    let config = FrameworkConfig::default();
    let (peer_end, local_end) = LoopbackTransport::pair();

    let mut router = MessageRouter::with_codec(local_end, codec(), &config).unwrap();
    let raw: Seen = Arc::default();
    router.engine_mut().add_handler(recorder(&raw)).unwrap();

    let messages: Arc<Mutex<Vec<BinaryMessage>>> = Arc::default();
    let sink = Arc::clone(&messages);
    router.add_group(MessageHandlerGroup::new(4).with(on_message(
        1,
        move |m: &BinaryMessage, _: &mut Outbox| {
            sink.lock().push(m.clone());
            Ok(())
        },
    )));

    let mut peer = MessageRouter::with_codec(peer_end, codec(), &config).unwrap();
    peer.send(4, 1, b"hi").unwrap();
    peer.engine_mut()
        .transmit_frame(&Frame::new(STATUS_ID, &[1, 2]).unwrap(), true)
        .unwrap();

    assert_eq!(router.poll(), Ok(2));
    assert_eq!(messages.lock().len(), 1);
    assert_eq!(messages.lock()[0].payload.as_slice(), b"hi");
    // The message dispatcher sits first in the chain and claims message frames.
    assert_eq!(raw.lock().as_slice(), &[Frame::new(STATUS_ID, &[1, 2]).unwrap()]);
}

// ── Corruption ────────────────────────────────────────────────

#[test]
fn corrupted_request_times_out_then_link_recovers() {
    let ctx = Context::native(FrameworkConfig {
        response_timeout_ms: 200,
        ..FrameworkConfig::default()
    })
    .unwrap();
    let (a, b) = LoopbackTransport::pair();

    let mut server = MessageRouter::new(PacketTransport::new(b), ctx.config()).unwrap();
    server.add_group(MessageHandlerGroup::new(9).with(on_message(
        2,
        |m: &BinaryMessage, out: &mut Outbox| out.push(m.reply(&m.payload)?.to_frame()),
    )));
    let responder = ctx
        .spawn("server", 1, move || {
            let _ = server.poll();
        })
        .unwrap();
    responder.enable();

    let corrupting = CorruptingTransport::new(a, &[0]);
    let mut client = MessageRouter::new(PacketTransport::new(corrupting), ctx.config()).unwrap();

    assert_eq!(client.request(9, 2, &[7, 7]), Err(Error::Timeout));
    let reply = client.request(9, 2, &[8, 8]).unwrap();
    assert_eq!(reply.payload.as_slice(), &[8, 8]);
    assert_eq!(client.engine().stats().timeouts, 1);
    responder.stop();
}
