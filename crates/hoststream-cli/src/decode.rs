//! Human-readable dumps of captured data streams and DSS segments.

use std::fmt::Write;

use hoststream_proto::{
    DataStream, OptionalSection, ProtocolError,
    ddm::DdmObject,
    dss::DssSegment,
};

use crate::error::CliError;

/// Hex text to bytes. Whitespace, `:` separators and a `0x` prefix are ignored.
pub fn parse_hex(text: &str) -> Result<Vec<u8>, CliError> {
    let text = text.trim();
    let text = text.strip_prefix("0x").unwrap_or(text);
    let digits: String = text.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
    Ok(hex::decode(digits)?)
}

/// Describe every data stream in `input`.
pub fn describe_data_streams(input: &[u8], max_len: usize) -> Result<String, ProtocolError> {
    let mut out = String::new();
    let mut offset = 0;
    while offset < input.len() {
        let (ds, used) = DataStream::decode_prefix(&input[offset..], max_len)?;
        describe_frame(&mut out, offset, &ds)?;
        offset += used;
    }
    Ok(out)
}

fn describe_frame(out: &mut String, offset: usize, ds: &DataStream) -> Result<(), ProtocolError> {
    let header = ds.header();
    let _ = writeln!(
        out,
        "@{offset}: {} request 0x{:04X} correlation {} length {}",
        ds.server(),
        ds.request_id(),
        ds.correlation_id(),
        header.length(),
    );
    let _ = writeln!(out, "  template ({} bytes): {}", ds.template().len(), hex::encode(ds.template()));
    let section = ds.optional_section()?;
    describe_items(out, &section, "  ");
    Ok(())
}

/// Describe every DSS segment in `input`, with the DDM objects it carries.
pub fn describe_dss(input: &[u8]) -> Result<String, ProtocolError> {
    let mut out = String::new();
    let mut offset = 0;
    while offset < input.len() {
        let (segment, used) = DssSegment::decode_prefix(&input[offset..])?;
        describe_segment(&mut out, offset, &segment)?;
        offset += used;
    }
    Ok(out)
}

fn describe_segment(out: &mut String, offset: usize, segment: &DssSegment) -> Result<(), ProtocolError> {
    let _ = writeln!(
        out,
        "@{offset}: DSS {:?} correlation {} flags {:?}",
        segment.dss_type, segment.correlation_id, segment.flags,
    );
    for object in DdmObject::parse_all(segment.payload.clone())? {
        let _ = writeln!(out, "  object 0x{:04X}", object.code_point);
        describe_items(out, &object.params, "    ");
    }
    Ok(())
}

fn describe_items(out: &mut String, section: &OptionalSection, indent: &str) {
    for item in section.items() {
        let _ = writeln!(
            out,
            "{indent}cp 0x{:04X} ({} bytes): {}",
            item.code_point,
            item.payload.len(),
            hex::encode(&item.payload),
        );
    }
}
