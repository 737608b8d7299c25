//! Decode arbitrary bytes as a data stream, then as every reply type the
//! client parses. Nothing may panic.

#![no_main]

use bytes::Bytes;
use hoststream_proto::{
    DataStream, central, dataqueue, header::DEFAULT_MAX_LENGTH, ifs, print, signon,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(ds) = DataStream::decode(Bytes::copy_from_slice(data), DEFAULT_MAX_LENGTH) else {
        return;
    };

    // A decoded frame must re-encode to the same bytes.
    assert_eq!(ds.encode().as_ref(), data);

    let _ = ds.optional_section();
    let _ = ds.parse_reply::<signon::ExchangeAttributesReply>();
    let _ = ds.parse_reply::<signon::SignonInfoReply>();
    let _ = ds.parse_reply::<signon::StartServerReply>();
    let _ = ds.parse_reply::<central::ExchangeAttributesReply>();
    let _ = ds.parse_reply::<central::RetrieveConversionMapReply>();
    let _ = ds.parse_reply::<ifs::OpenReply>();
    let _ = ds.parse_reply::<ifs::ReadReply>();
    let _ = ds.parse_reply::<ifs::ListEntryReply>();
    let _ = ds.parse_reply::<dataqueue::ReadReply>();
    let _ = ds.parse_reply::<dataqueue::QueryAttributesReply>();
    let _ = ds.parse_reply::<print::PrintReply>();
});
