//! Feed arbitrary bytes to the streaming decoder in fuzzer-chosen chunks and
//! check it agrees with decoding the whole buffer at once.

#![no_main]

use hoststream_proto::{DataStream, FrameDecoder};
use libfuzzer_sys::fuzz_target;

const MAX_LEN: usize = 64 * 1024;

fuzz_target!(|input: (u8, &[u8])| {
    let (chunk, data) = input;
    let chunk = usize::from(chunk).max(1);

    let mut decoder = FrameDecoder::with_max_length(MAX_LEN);
    let mut streamed = Vec::new();
    for piece in data.chunks(chunk) {
        match decoder.push(piece) {
            Ok(frames) => streamed.extend(frames),
            Err(_) => return,
        }
    }

    let mut whole = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        match DataStream::decode_prefix(&data[offset..], MAX_LEN) {
            Ok((ds, used)) => {
                whole.push(ds);
                offset += used;
            },
            Err(_) => break,
        }
    }
    assert_eq!(streamed, whole);
});
