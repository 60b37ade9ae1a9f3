#![no_main]
use libfuzzer_sys::fuzz_target;
use rcon::battleye::Response;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary datagrams must never panic.
    let _ = Response::from_datagram(data);
});
