//! Fuzz target: `PacketReceiver`
//!
//! Pushes arbitrary bytes into the streaming packet receiver and drains it.
//! Every packet it accepts must carry a valid CRC and re-encode to a
//! packet that unwraps to itself. Draining must always terminate.
//!
//! cargo fuzz run fuzz_packet_receiver

#![no_main]

use corelink::protocol::packet::{PacketFramer, PacketReceiver};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut rx = PacketReceiver::new();
    let mut offset = 0;

    while offset < data.len() {
        offset += rx.push(&data[offset..]);
        let before = rx.buffered();
        let mut made_progress = false;
        while let Some(result) = rx.next_packet() {
            made_progress = true;
            if let Ok(packet) = result {
                let bytes = packet.encode();
                let (again, used) = PacketFramer::unwrap(&bytes).expect("accepted packet must unwrap");
                assert_eq!(used, bytes.len());
                assert_eq!(again, packet);
            }
        }
        if !made_progress && rx.free() == 0 {
            // A full buffer that yields nothing would stall the stream.
            panic!("receiver stalled with {} bytes buffered", before);
        }
    }
});
