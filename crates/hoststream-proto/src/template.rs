//! Fixed-width template fields.
//!
//! The template sits between the header and the optional section. Its layout
//! is fixed per request/reply id, so writers append fields in order and
//! readers pull them back out at a cursor. Reads are bounds-checked and report
//! the offset of the failing field, which is usually enough to tell which
//! field of which message was truncated.

use bytes::{BufMut, BytesMut};

use crate::{
    errors::{ProtocolError, Result},
    text::TextCodec,
};

/// Appends template fields in wire order.
#[derive(Debug, Default)]
pub struct TemplateWriter {
    buf: BytesMut,
}

impl TemplateWriter {
    /// Empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a byte.
    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    /// Append a big-endian `u16`.
    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16(value);
        self
    }

    /// Append a big-endian `u32`.
    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32(value);
        self
    }

    /// Append a big-endian `i32`.
    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.buf.put_i32(value);
        self
    }

    /// Append a big-endian `u64`.
    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.buf.put_u64(value);
        self
    }

    /// Append raw bytes.
    pub fn bytes(&mut self, value: &[u8]) -> &mut Self {
        self.buf.put_slice(value);
        self
    }

    /// Append `count` zero bytes.
    pub fn zeros(&mut self, count: usize) -> &mut Self {
        self.buf.put_bytes(0, count);
        self
    }

    /// Append text encoded with `codec`, padded to exactly `width` bytes.
    pub fn text(&mut self, codec: &TextCodec, value: &str, width: usize) -> Result<&mut Self> {
        let encoded = codec.encode_padded(value, width)?;
        self.buf.put_slice(&encoded);
        Ok(self)
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish and return the template bytes.
    pub fn into_inner(self) -> BytesMut {
        self.buf
    }
}

/// Reads template fields at a cursor.
#[derive(Debug, Clone)]
pub struct TemplateReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> TemplateReader<'a> {
    /// Reader positioned at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8]> {
        let available = self.buf.len() - self.pos;
        if needed > available {
            return Err(ProtocolError::TemplateTooShort { offset: self.pos, needed, available });
        }
        let out = &self.buf[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read a byte.
    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a big-endian `u16`.
    pub fn u16(&mut self) -> Result<u16> {
        self.array().map(u16::from_be_bytes)
    }

    /// Read a big-endian `u32`.
    pub fn u32(&mut self) -> Result<u32> {
        self.array().map(u32::from_be_bytes)
    }

    /// Read a big-endian `i32`.
    pub fn i32(&mut self) -> Result<i32> {
        self.array().map(i32::from_be_bytes)
    }

    /// Read a big-endian `u64`.
    pub fn u64(&mut self) -> Result<u64> {
        self.array().map(u64::from_be_bytes)
    }

    /// Read `len` raw bytes.
    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len)
    }

    /// Read a fixed-size array.
    pub fn fixed<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.array()
    }

    /// Read a `width`-byte text field and strip its padding.
    pub fn text(&mut self, codec: &TextCodec, width: usize) -> Result<String> {
        let raw = self.take(width)?;
        codec.decode_trimmed(raw)
    }

    /// Skip `len` bytes.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    /// Current offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_and_reader_agree_on_field_order() {
        let mut w = TemplateWriter::new();
        w.u16(0x0102).u32(0x0304_0506).u8(7).u64(8).i32(-1);
        assert_eq!(w.len(), 2 + 4 + 1 + 8 + 4);

        let bytes = w.into_inner();
        let mut r = TemplateReader::new(&bytes);
        assert_eq!(r.u16().unwrap(), 0x0102);
        assert_eq!(r.u32().unwrap(), 0x0304_0506);
        assert_eq!(r.u8().unwrap(), 7);
        assert_eq!(r.u64().unwrap(), 8);
        assert_eq!(r.i32().unwrap(), -1);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn short_read_reports_offset() {
        let bytes = [0u8; 5];
        let mut r = TemplateReader::new(&bytes);
        r.u32().unwrap();
        assert_eq!(
            r.u16(),
            Err(ProtocolError::TemplateTooShort { offset: 4, needed: 2, available: 1 })
        );
        // Cursor does not move on failure
        assert_eq!(r.position(), 4);
    }

    #[test]
    fn padded_text_fields() {
        let codec = TextCodec::ebcdic();
        let mut w = TemplateWriter::new();
        w.text(&codec, "QGPL", 10).unwrap();
        let bytes = w.into_inner();
        assert_eq!(&bytes[..], &[0xD8, 0xC7, 0xD7, 0xD3, 0x40, 0x40, 0x40, 0x40, 0x40, 0x40]);

        let mut r = TemplateReader::new(&bytes);
        assert_eq!(r.text(&codec, 10).unwrap(), "QGPL");
    }
}
