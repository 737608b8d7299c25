//! Data-stream frames and the request/reply traits.
//!
//! A [`DataStream`] is the unit exchanged with every Client Access server:
//! header, template and optional section. Subsystem messages implement
//! [`Request`] (how to fill the template and optional section) and [`Reply`]
//! (how to read them back); the framing itself lives only here.

use bytes::{Bytes, BytesMut};

use crate::{
    errors::{ProtocolError, Result},
    header::{DEFAULT_MAX_LENGTH, DataStreamHeader},
    optional::{LlWidth, OptionalSection, OptionalWriter},
    server::ServerId,
    template::{TemplateReader, TemplateWriter},
};

/// How many replies a request produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    /// Exactly one reply
    Single,
    /// Replies whose leading template `u16` (chain indicator) is 1 are
    /// followed by more replies with the same correlation id; the first
    /// reply with indicator 0 ends the exchange
    Chained,
}

/// An outbound message.
pub trait Request {
    /// Server this request is addressed to.
    fn server(&self) -> ServerId;

    /// Request id written into the header.
    fn request_id(&self) -> u16;

    /// Reply ids the server may answer with.
    fn reply_ids(&self) -> &'static [u16];

    /// Number of replies expected.
    fn reply_mode(&self) -> ReplyMode {
        ReplyMode::Single
    }

    /// Header id (client attributes). Zero for almost every request.
    fn header_id(&self) -> u16 {
        0
    }

    /// Fill the fixed-width template.
    fn write_template(&self, w: &mut TemplateWriter) -> Result<()>;

    /// Fill the optional section.
    fn write_optional(&self, _w: &mut OptionalWriter) -> Result<()> {
        Ok(())
    }
}

/// A reply with a fixed reply id.
///
/// Clients only parse replies; the encode half exists so in-process servers
/// and tests can produce them with the same field layout.
pub trait Reply: Sized {
    /// Reply id this type parses.
    const REPLY_ID: u16;

    /// Parse the template and optional section.
    fn parse(ds: &DataStream) -> Result<Self>;

    /// Fill the template.
    fn write_template(&self, w: &mut TemplateWriter) -> Result<()>;

    /// Fill the optional section.
    fn write_optional(&self, _w: &mut OptionalWriter) -> Result<()> {
        Ok(())
    }
}

/// A complete data stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataStream {
    header: DataStreamHeader,
    server: ServerId,
    template: Bytes,
    optional: Bytes,
}

impl DataStream {
    /// Assemble a data stream, computing the length fields.
    pub fn new(
        server: ServerId,
        request_id: u16,
        template: impl Into<Bytes>,
        optional: impl Into<Bytes>,
    ) -> Result<Self> {
        let template = template.into();
        let optional = optional.into();
        let template_len = u16::try_from(template.len()).map_err(|_| ProtocolError::InvalidField {
            field: "template",
            reason: format!("{} bytes exceeds 65535", template.len()),
        })?;
        let total = DataStreamHeader::SIZE + template.len() + optional.len();
        let total = u32::try_from(total)
            .map_err(|_| ProtocolError::FrameTooLarge { size: total, max: u32::MAX as usize })?;
        let header = DataStreamHeader::new(server, request_id, template_len, total);
        Ok(Self { header, server, template, optional })
    }

    /// Encode a [`Request`] with correlation id 0.
    pub fn from_request<R: Request + ?Sized>(request: &R) -> Result<Self> {
        let mut template = TemplateWriter::new();
        request.write_template(&mut template)?;
        let mut optional = OptionalWriter::new(LlWidth::Four);
        request.write_optional(&mut optional)?;
        let mut ds = Self::new(
            request.server(),
            request.request_id(),
            template.into_inner().freeze(),
            optional.into_inner().freeze(),
        )?;
        ds.header = ds.header.with_header_id(request.header_id());
        Ok(ds)
    }

    /// Encode a [`Reply`] from `server` with correlation id 0.
    pub fn from_reply<R: Reply>(server: ServerId, reply: &R) -> Result<Self> {
        let mut template = TemplateWriter::new();
        reply.write_template(&mut template)?;
        let mut optional = OptionalWriter::new(LlWidth::Four);
        reply.write_optional(&mut optional)?;
        Self::new(server, R::REPLY_ID, template.into_inner().freeze(), optional.into_inner().freeze())
    }

    /// Header.
    pub fn header(&self) -> &DataStreamHeader {
        &self.header
    }

    /// Server id.
    pub fn server(&self) -> ServerId {
        self.server
    }

    /// Request or reply id.
    pub fn request_id(&self) -> u16 {
        self.header.request_id()
    }

    /// Correlation id.
    pub fn correlation_id(&self) -> u32 {
        self.header.correlation_id()
    }

    /// Stamp a correlation id.
    pub fn set_correlation_id(&mut self, correlation_id: u32) {
        self.header = self.header.with_correlation(correlation_id);
    }

    /// Builder-style [`Self::set_correlation_id`].
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: u32) -> Self {
        self.set_correlation_id(correlation_id);
        self
    }

    /// Template bytes.
    pub fn template(&self) -> &Bytes {
        &self.template
    }

    /// Cursor over the template.
    pub fn template_reader(&self) -> TemplateReader<'_> {
        TemplateReader::new(&self.template)
    }

    /// Raw optional section.
    pub fn optional_bytes(&self) -> &Bytes {
        &self.optional
    }

    /// Parsed optional section.
    pub fn optional_section(&self) -> Result<OptionalSection> {
        OptionalSection::parse(self.optional.clone(), LlWidth::Four)
    }

    /// Leading `u16` of the template, used by chained replies.
    pub fn chain_indicator(&self) -> Option<u16> {
        self.template.get(..2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        self.header.length()
    }

    /// Append the wire form to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.extend_from_slice(&self.header.to_bytes());
        buf.extend_from_slice(&self.template);
        buf.extend_from_slice(&self.optional);
    }

    /// Wire form.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Length of the frame at the start of `buf`, once enough is buffered.
    ///
    /// Returns `Ok(None)` while fewer than 20 bytes are available.
    pub fn peek_length(buf: &[u8], max_len: usize) -> Result<Option<usize>> {
        if buf.len() < DataStreamHeader::SIZE {
            return Ok(None);
        }
        let header = DataStreamHeader::from_bytes(buf)?;
        header.validate(max_len)?;
        Ok(Some(header.length()))
    }

    /// Decode a buffer holding exactly one data stream.
    pub fn decode(frame: Bytes, max_len: usize) -> Result<Self> {
        let header = DataStreamHeader::from_bytes(&frame)?;
        header.validate(max_len)?;
        let length = header.length();
        if frame.len() < length {
            return Err(ProtocolError::Incomplete { needed: length - frame.len() });
        }
        if frame.len() > length {
            return Err(ProtocolError::InvalidField {
                field: "frame",
                reason: format!("{} trailing bytes after a {length}-byte data stream", frame.len() - length),
            });
        }
        Self::from_validated(header, &frame)
    }

    /// Decode the data stream at the start of `buf`.
    ///
    /// Returns the frame and the number of bytes it occupied, or
    /// [`ProtocolError::Incomplete`] if `buf` ends early.
    pub fn decode_prefix(buf: &[u8], max_len: usize) -> Result<(Self, usize)> {
        if buf.len() < DataStreamHeader::SIZE {
            return Err(ProtocolError::Incomplete { needed: DataStreamHeader::SIZE - buf.len() });
        }
        let header = DataStreamHeader::from_bytes(buf)?;
        header.validate(max_len)?;
        let length = header.length();
        if buf.len() < length {
            return Err(ProtocolError::Incomplete { needed: length - buf.len() });
        }
        let frame = Bytes::copy_from_slice(&buf[..length]);
        Ok((Self::from_validated(header, &frame)?, length))
    }

    fn from_validated(header: DataStreamHeader, frame: &Bytes) -> Result<Self> {
        let server = header.server()?;
        let template_end = DataStreamHeader::SIZE + header.template_len();
        Ok(Self {
            header,
            server,
            template: frame.slice(DataStreamHeader::SIZE..template_end),
            optional: frame.slice(template_end..header.length()),
        })
    }

    /// Parse as reply type `R`, checking the reply id first.
    pub fn parse_reply<R: Reply>(&self) -> Result<R> {
        if self.request_id() != R::REPLY_ID {
            return Err(ProtocolError::UnexpectedReplyId {
                server: self.server,
                reply_id: self.request_id(),
            });
        }
        R::parse(self)
    }
}

/// Incremental decoder for a byte stream carrying back-to-back data streams.
///
/// Bytes may arrive in arbitrary chunks; complete frames are returned as soon
/// as their last byte is pushed. A decode error leaves the stream unusable
/// since there is no way to find the next frame boundary.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    max_len: usize,
}

impl FrameDecoder {
    /// Decoder using the default maximum frame length.
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LENGTH)
    }

    /// Decoder with a custom maximum frame length.
    pub fn with_max_length(max_len: usize) -> Self {
        Self { buf: BytesMut::with_capacity(8 * 1024), max_len }
    }

    /// Buffer `data` and return every frame it completes.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<DataStream>> {
        self.buf.extend_from_slice(data);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Pop one complete frame if buffered.
    pub fn next_frame(&mut self) -> Result<Option<DataStream>> {
        let Some(length) = DataStream::peek_length(&self.buf, self.max_len)? else {
            return Ok(None);
        };
        if self.buf.len() < length {
            return Ok(None);
        }
        let frame = self.buf.split_to(length).freeze();
        DataStream::decode(frame, self.max_len).map(Some)
    }

    /// Bytes buffered but not yet returned as frames.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    struct Probe;

    impl Request for Probe {
        fn server(&self) -> ServerId {
            ServerId::Central
        }

        fn request_id(&self) -> u16 {
            0x1234
        }

        fn reply_ids(&self) -> &'static [u16] {
            &[0x2234]
        }

        fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
            w.u16(0xABCD).u8(1);
            Ok(())
        }

        fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
            w.u16(0x0001, 0x0203)?;
            Ok(())
        }
    }

    struct ProbeReply {
        value: u16,
    }

    impl Reply for ProbeReply {
        const REPLY_ID: u16 = 0x1234;

        fn parse(ds: &DataStream) -> Result<Self> {
            Ok(Self { value: ds.template_reader().u16()? })
        }

        fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
            w.u16(self.value);
            Ok(())
        }
    }

    #[test]
    fn request_encoding() {
        let ds = DataStream::from_request(&Probe).unwrap().with_correlation_id(9);
        insta::assert_snapshot!(
            hex::encode(ds.encode()),
            @"0000001f0000e000000000000000000900031234abcd010000000800010203"
        );
    }

    #[test]
    fn decode_splits_template_and_optional() {
        let ds = DataStream::from_request(&Probe).unwrap();
        let decoded = DataStream::decode(ds.encode(), DEFAULT_MAX_LENGTH).unwrap();
        assert_eq!(decoded, ds);
        assert_eq!(&decoded.template()[..], &[0xAB, 0xCD, 0x01]);
        let section = decoded.optional_section().unwrap();
        assert_eq!(section.require(0x0001).unwrap().as_u16().unwrap(), 0x0203);
        assert_eq!(decoded.parse_reply::<ProbeReply>().unwrap().value, 0xABCD);
    }

    #[test]
    fn wrong_reply_id_rejected() {
        let ds = DataStream::new(ServerId::File, 0x8001, vec![0, 0, 0, 2], Bytes::new()).unwrap();
        assert_eq!(
            ds.parse_reply::<ProbeReply>().err(),
            Some(ProtocolError::UnexpectedReplyId { server: ServerId::File, reply_id: 0x8001 })
        );
    }

    #[test]
    fn trailing_bytes_rejected() {
        let ds = DataStream::new(ServerId::File, 1, Bytes::new(), Bytes::new()).unwrap();
        let mut bytes = BytesMut::from(&ds.encode()[..]);
        bytes.extend_from_slice(&[0xFF]);
        assert!(matches!(
            DataStream::decode(bytes.freeze(), DEFAULT_MAX_LENGTH),
            Err(ProtocolError::InvalidField { field: "frame", .. })
        ));
    }

    #[test]
    fn prefix_decode_reports_missing_bytes() {
        let encoded = DataStream::from_request(&Probe).unwrap().encode();
        assert_eq!(
            DataStream::decode_prefix(&encoded[..10], DEFAULT_MAX_LENGTH).err(),
            Some(ProtocolError::Incomplete { needed: 10 })
        );
        assert_eq!(
            DataStream::decode_prefix(&encoded[..25], DEFAULT_MAX_LENGTH).err(),
            Some(ProtocolError::Incomplete { needed: encoded.len() - 25 })
        );
        let (_, used) = DataStream::decode_prefix(&encoded, DEFAULT_MAX_LENGTH).unwrap();
        assert_eq!(used, encoded.len());
    }

    #[test]
    fn decoder_handles_split_and_coalesced_frames() {
        let a = DataStream::from_request(&Probe).unwrap().with_correlation_id(1).encode();
        let b = DataStream::from_request(&Probe).unwrap().with_correlation_id(2).encode();
        let mut stream = Vec::new();
        stream.extend_from_slice(&a);
        stream.extend_from_slice(&b);

        let mut decoder = FrameDecoder::new();
        // Header split across pushes
        assert!(decoder.push(&stream[..7]).unwrap().is_empty());
        // Completes the first frame and half of the second
        let frames = decoder.push(&stream[7..a.len() + 5]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].correlation_id(), 1);
        assert_eq!(decoder.buffered(), 5);

        let frames = decoder.push(&stream[a.len() + 5..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].correlation_id(), 2);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn decoder_rejects_oversize_frame_before_buffering_it() {
        let mut decoder = FrameDecoder::with_max_length(64);
        let header = DataStreamHeader::new(ServerId::File, 1, 0, 1_000_000);
        assert_eq!(
            decoder.push(&header.to_bytes()).err(),
            Some(ProtocolError::FrameTooLarge { size: 1_000_000, max: 64 })
        );
    }

    proptest! {
        #[test]
        fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
            let _ = DataStream::decode(Bytes::from(bytes.clone()), 4096);
            let _ = DataStream::decode_prefix(&bytes, 4096);
            let mut decoder = FrameDecoder::with_max_length(4096);
            let _ = decoder.push(&bytes);
        }
    }
}
