//! Decode arbitrary bytes as DSS segments and the DDM objects inside them.

#![no_main]

use hoststream_proto::{
    ddm::{AccessSecurityReply, DdmMessage, DdmObject, ExchangeServerAttributesReply, SecurityCheckReply},
    dss::DssSegment,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut offset = 0;
    while offset < data.len() {
        let Ok((segment, used)) = DssSegment::decode_prefix(&data[offset..]) else {
            return;
        };
        assert!(used > 0);
        offset += used;

        let _ = DdmObject::parse_all(segment.payload.clone());
        let _ = ExchangeServerAttributesReply::decode(segment.payload.clone());
        let _ = AccessSecurityReply::decode(segment.payload.clone());
        let _ = SecurityCheckReply::decode(segment.payload.clone());
    }
});
