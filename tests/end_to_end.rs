//! End-to-end: two routers talking over in-process transports.
//!
//! The responder runs on a native framework thread that polls its router;
//! the requester blocks in `MessageRouter::request` on the test thread.

use std::time::{Duration, Instant};

use corelink::protocol::engine::Outbox;
use corelink::protocol::message::{BinaryMessage, MessageHandlerGroup, MessageRouter, on_message};
use corelink::protocol::transport::{LoopbackTransport, PacketTransport, Transport};
use corelink::thread::Thread;
use corelink::{Context, Error, FrameworkConfig};

const GROUP: u16 = 7;
const ECHO: u8 = 3;

fn echo_group() -> MessageHandlerGroup {
    MessageHandlerGroup::new(GROUP).with(on_message(ECHO, |m: &BinaryMessage, out: &mut Outbox| {
        let byte = m.payload.first().copied().unwrap_or(0);
        out.push(m.reply(&[byte.wrapping_add(1)])?.to_frame())
    }))
}

/// Spawn a thread that polls a router holding `echo_group`.
fn spawn_responder<T: Transport + Send + 'static>(ctx: &Context, transport: T) -> Thread {
    let mut router = MessageRouter::new(transport, ctx.config()).unwrap();
    router.add_group(echo_group());
    let thread = ctx
        .spawn("responder", 1, move || {
            let _ = router.poll();
        })
        .unwrap();
    thread.enable();
    thread
}

#[test]
fn echo_over_loopback() {
    let ctx = Context::native(FrameworkConfig {
        response_timeout_ms: 2_000,
        ..FrameworkConfig::default()
    })
    .unwrap();
    let (client_end, server_end) = LoopbackTransport::pair();
    let responder = spawn_responder(&ctx, server_end);

    let mut client = MessageRouter::new(client_end, ctx.config()).unwrap();
    let response = client.request(GROUP, ECHO, &[0x05]).unwrap();

    assert_eq!(response.group_id, 7);
    assert_eq!(response.message_id, 3);
    assert_eq!(response.payload.as_slice(), &[0x06]);
    assert_eq!(client.engine().stats().responses, 1);
    responder.stop();
}

#[test]
fn echo_over_packet_transport() {
    let ctx = Context::native(FrameworkConfig {
        response_timeout_ms: 2_000,
        ..FrameworkConfig::default()
    })
    .unwrap();
    let (a, b) = LoopbackTransport::pair();
    let responder = spawn_responder(&ctx, PacketTransport::new(b));

    let mut client = MessageRouter::new(PacketTransport::new(a), ctx.config()).unwrap();
    for value in [0x05u8, 0x10, 0xFF] {
        let response = client.request(GROUP, ECHO, &[value]).unwrap();
        assert_eq!(response.payload.as_slice(), &[value.wrapping_add(1)]);
    }
    assert_eq!(client.engine().transport().sequence_gaps(), 0);
    responder.stop();
}

#[test]
fn unhandled_message_gets_no_reply() {
    let ctx = Context::native(FrameworkConfig {
        response_timeout_ms: 50,
        ..FrameworkConfig::default()
    })
    .unwrap();
    let (client_end, server_end) = LoopbackTransport::pair();
    let responder = spawn_responder(&ctx, server_end);

    let mut client = MessageRouter::new(client_end, ctx.config()).unwrap();
    assert_eq!(client.request(GROUP, 99, &[1]), Err(Error::Timeout));
    assert_eq!(client.request(8, ECHO, &[1]), Err(Error::Timeout));
    responder.stop();
}

#[test]
fn timeout_fires_near_the_configured_deadline() {
    let config = FrameworkConfig {
        response_timeout_ms: 60,
        ..FrameworkConfig::default()
    };
    let (client_end, _silent_peer) = LoopbackTransport::pair();
    let mut client = MessageRouter::new(client_end, &config).unwrap();

    let start = Instant::now();
    let result = client.request(GROUP, ECHO, &[0x05]);
    let elapsed = start.elapsed();

    assert_eq!(result, Err(Error::Timeout));
    assert!(elapsed >= Duration::from_millis(60), "fired early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(400), "fired late: {elapsed:?}");
    assert_eq!(client.engine().stats().timeouts, 1);
}

#[test]
fn disconnected_peer_is_a_communication_failure() {
    let (client_end, server_end) = LoopbackTransport::pair();
    server_end.disconnect();
    let mut client = MessageRouter::new(client_end, &FrameworkConfig::default()).unwrap();
    assert_eq!(
        client.send(GROUP, ECHO, &[1]),
        Err(Error::CommunicationFailure)
    );
}

#[test]
fn peer_hanging_up_mid_request_is_a_communication_failure() {
    let config = FrameworkConfig {
        response_timeout_ms: 300,
        ..FrameworkConfig::default()
    };
    for packets in [false, true] {
        let (client_end, server_end) = LoopbackTransport::pair();
        let hangup = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            server_end.disconnect();
        });

        let start = Instant::now();
        let result = if packets {
            MessageRouter::new(PacketTransport::new(client_end), &config)
                .unwrap()
                .request(GROUP, ECHO, &[1])
        } else {
            MessageRouter::new(client_end, &config)
                .unwrap()
                .request(GROUP, ECHO, &[1])
        };

        assert_eq!(result, Err(Error::CommunicationFailure), "packets: {packets}");
        assert!(
            start.elapsed() < Duration::from_millis(250),
            "waited out the timeout: {:?}",
            start.elapsed()
        );
        hangup.join().unwrap();
    }
}
