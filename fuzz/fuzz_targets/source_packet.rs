#![no_main]
use std::io::Cursor;

use libfuzzer_sys::fuzz_target;
use rcon::source::Packet;

fuzz_target!(|data: &[u8]| {
    let mut r = Cursor::new(data);
    if let Ok(packet) = Packet::read_from(&mut r) {
        let buf = packet.serialise().expect("should be able to serialise");
        let mut r = Cursor::new(buf.as_slice());
        let got = Packet::read_from(&mut r).expect("must be valid");
        assert_eq!(packet, got);
    }
});
