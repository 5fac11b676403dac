#![no_main]
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: Vec<u8>| {
    let mut archive = Vec::new();
    arcodec::compress(Cursor::new(&data), &mut archive).unwrap();

    let mut restored = Vec::new();
    arcodec::decompress(Cursor::new(&archive), &mut restored).unwrap();

    assert_eq!(data, restored);
});
