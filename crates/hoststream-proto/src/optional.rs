//! LL/CP optional sections.
//!
//! Variable-length fields after the template are a sequence of items:
//!
//! ```text
//! Client Access          DDM
//! LL  4 bytes            LL  2 bytes   (length including the prefix)
//! CP  2 bytes            CP  2 bytes   (code point)
//! payload LL-6 bytes     payload LL-4 bytes
//! ```
//!
//! Items may repeat and may nest: the payload of one item can itself be a
//! section. Parsing validates every length before slicing and never reads
//! outside the section.

use bytes::{BufMut, Bytes, BytesMut};

use crate::errors::{ProtocolError, Result};

/// Width of the LL field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlWidth {
    /// Two-byte LL (DDM)
    Two,
    /// Four-byte LL (Client Access data streams)
    Four,
}

impl LlWidth {
    /// Size of the LL + CP prefix.
    pub const fn prefix_len(self) -> usize {
        match self {
            Self::Two => 4,
            Self::Four => 6,
        }
    }

    /// Largest LL value the width can express.
    pub const fn max_len(self) -> usize {
        match self {
            // High bit of a DDM LL flags the extended-length form
            Self::Two => 0x7FFF,
            Self::Four => u32::MAX as usize,
        }
    }
}

/// One LL/CP item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodePointItem {
    /// Code point
    pub code_point: u16,
    /// Payload (without the LL/CP prefix)
    pub payload: Bytes,
}

impl CodePointItem {
    /// Item from a code point and payload.
    pub fn new(code_point: u16, payload: impl Into<Bytes>) -> Self {
        Self { code_point, payload: payload.into() }
    }

    /// First payload byte.
    pub fn as_u8(&self) -> Result<u8> {
        self.payload.first().copied().ok_or_else(|| ProtocolError::InvalidField {
            field: "code point payload",
            reason: format!("0x{:04X} is empty", self.code_point),
        })
    }

    /// Payload as a big-endian `u16`.
    pub fn as_u16(&self) -> Result<u16> {
        let bytes: [u8; 2] = self.payload.get(..2).and_then(|s| s.try_into().ok()).ok_or_else(|| {
            ProtocolError::InvalidField {
                field: "code point payload",
                reason: format!("0x{:04X} needs 2 bytes, has {}", self.code_point, self.payload.len()),
            }
        })?;
        Ok(u16::from_be_bytes(bytes))
    }

    /// Payload as a big-endian `u32`.
    pub fn as_u32(&self) -> Result<u32> {
        let bytes: [u8; 4] = self.payload.get(..4).and_then(|s| s.try_into().ok()).ok_or_else(|| {
            ProtocolError::InvalidField {
                field: "code point payload",
                reason: format!("0x{:04X} needs 4 bytes, has {}", self.code_point, self.payload.len()),
            }
        })?;
        Ok(u32::from_be_bytes(bytes))
    }

    /// Parse the payload as a nested section.
    pub fn nested(&self, width: LlWidth) -> Result<OptionalSection> {
        OptionalSection::parse(self.payload.clone(), width)
    }
}

/// A parsed optional section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionalSection {
    items: Vec<CodePointItem>,
}

impl OptionalSection {
    /// Parse every item in `bytes`.
    ///
    /// Takes `Bytes` so item payloads share the frame's buffer.
    pub fn parse(bytes: Bytes, width: LlWidth) -> Result<Self> {
        let prefix = width.prefix_len();
        let mut items = Vec::new();
        let mut offset = 0;

        while offset < bytes.len() {
            let available = bytes.len() - offset;
            if available < prefix {
                return Err(ProtocolError::ItemOverrun { offset, length: prefix, available });
            }
            let rest = &bytes[offset..];
            let (length, code_point) = match width {
                LlWidth::Two => (
                    usize::from(u16::from_be_bytes([rest[0], rest[1]])),
                    u16::from_be_bytes([rest[2], rest[3]]),
                ),
                LlWidth::Four => (
                    u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize,
                    u16::from_be_bytes([rest[4], rest[5]]),
                ),
            };
            if length < prefix || length > width.max_len() {
                return Err(ProtocolError::InvalidItemLength { offset, length });
            }
            if length > available {
                return Err(ProtocolError::ItemOverrun { offset, length, available });
            }
            let payload = bytes.slice(offset + prefix..offset + length);
            items.push(CodePointItem { code_point, payload });
            offset += length;
        }

        Ok(Self { items })
    }

    /// First item with `code_point`.
    pub fn find(&self, code_point: u16) -> Option<&CodePointItem> {
        self.items.iter().find(|item| item.code_point == code_point)
    }

    /// Every item with `code_point`, in wire order.
    pub fn find_all(&self, code_point: u16) -> impl Iterator<Item = &CodePointItem> {
        self.items.iter().filter(move |item| item.code_point == code_point)
    }

    /// First item with `code_point`, or [`ProtocolError::MissingCodePoint`].
    pub fn require(&self, code_point: u16) -> Result<&CodePointItem> {
        self.find(code_point).ok_or(ProtocolError::MissingCodePoint(code_point))
    }

    /// All items in wire order.
    pub fn items(&self) -> &[CodePointItem] {
        &self.items
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the section has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a> IntoIterator for &'a OptionalSection {
    type Item = &'a CodePointItem;
    type IntoIter = std::slice::Iter<'a, CodePointItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Builds an optional section.
#[derive(Debug)]
pub struct OptionalWriter {
    width: LlWidth,
    buf: BytesMut,
}

impl OptionalWriter {
    /// Empty section using `width`-sized LL fields.
    pub fn new(width: LlWidth) -> Self {
        Self { width, buf: BytesMut::new() }
    }

    fn put_prefix(&mut self, length: usize, code_point: u16) {
        match self.width {
            LlWidth::Two => self.buf.put_u16(length as u16),
            LlWidth::Four => self.buf.put_u32(length as u32),
        }
        self.buf.put_u16(code_point);
    }

    /// Append an item with raw payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::FieldTooLong`] if the payload cannot be
    /// expressed in the LL width.
    pub fn item(&mut self, code_point: u16, payload: &[u8]) -> Result<&mut Self> {
        let length = self.width.prefix_len() + payload.len();
        if length > self.width.max_len() {
            return Err(ProtocolError::FieldTooLong {
                len: payload.len(),
                width: self.width.max_len() - self.width.prefix_len(),
            });
        }
        self.put_prefix(length, code_point);
        self.buf.put_slice(payload);
        Ok(self)
    }

    /// Append a one-byte item.
    pub fn u8(&mut self, code_point: u16, value: u8) -> Result<&mut Self> {
        self.item(code_point, &[value])
    }

    /// Append a big-endian `u16` item.
    pub fn u16(&mut self, code_point: u16, value: u16) -> Result<&mut Self> {
        self.item(code_point, &value.to_be_bytes())
    }

    /// Append a big-endian `u32` item.
    pub fn u32(&mut self, code_point: u16, value: u32) -> Result<&mut Self> {
        self.item(code_point, &value.to_be_bytes())
    }

    /// Append an item whose payload is a nested section built by `build`.
    pub fn nested<F>(&mut self, code_point: u16, build: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let mut inner = Self::new(self.width);
        build(&mut inner)?;
        let inner = inner.into_inner();
        self.item(code_point, &inner)
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish and return the encoded section.
    pub fn into_inner(self) -> BytesMut {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn four_byte_items_encode_length_including_prefix() {
        let mut w = OptionalWriter::new(LlWidth::Four);
        w.item(0x1103, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        w.u16(0x1102, 2).unwrap();
        let bytes = w.into_inner();
        assert_eq!(
            &bytes[..],
            hex!("0000000E 1103 0102030405060708  00000008 1102 0002")
        );
    }

    #[test]
    fn parse_repeated_and_nested_items() {
        let mut w = OptionalWriter::new(LlWidth::Two);
        w.nested(0x1404, |inner| {
            inner.u16(0x1403, 7)?;
            inner.u16(0x1440, 7)?;
            Ok(())
        })
        .unwrap();
        w.item(0x11A0, b"USER").unwrap();
        w.item(0x11A0, b"OTHER").unwrap();

        let section = OptionalSection::parse(w.into_inner().freeze(), LlWidth::Two).unwrap();
        assert_eq!(section.len(), 3);
        assert_eq!(section.find_all(0x11A0).count(), 2);

        let levels = section.require(0x1404).unwrap().nested(LlWidth::Two).unwrap();
        assert_eq!(levels.require(0x1440).unwrap().as_u16().unwrap(), 7);
        assert_eq!(section.require(0x9999), Err(ProtocolError::MissingCodePoint(0x9999)));
    }

    #[test]
    fn length_below_prefix_rejected() {
        let bytes = Bytes::copy_from_slice(&hex!("00000004 1101"));
        assert_eq!(
            OptionalSection::parse(bytes, LlWidth::Four),
            Err(ProtocolError::InvalidItemLength { offset: 0, length: 4 })
        );
    }

    #[test]
    fn item_past_end_rejected() {
        let bytes = Bytes::copy_from_slice(&hex!("0006 1101 00 00 0010 1102 00"));
        assert_eq!(
            OptionalSection::parse(bytes, LlWidth::Two),
            Err(ProtocolError::ItemOverrun { offset: 6, length: 16, available: 5 })
        );
    }

    #[test]
    fn trailing_partial_prefix_rejected() {
        let bytes = Bytes::copy_from_slice(&hex!("0004 1101 00"));
        assert_eq!(
            OptionalSection::parse(bytes, LlWidth::Two),
            Err(ProtocolError::ItemOverrun { offset: 4, length: 4, available: 1 })
        );
    }

    #[test]
    fn short_integer_payload_rejected() {
        let item = CodePointItem::new(0x1119, vec![2u8]);
        assert!(item.as_u16().is_err());
        assert!(item.as_u32().is_err());
    }

    #[test]
    fn two_byte_ll_overflow_rejected() {
        let mut w = OptionalWriter::new(LlWidth::Two);
        let big = vec![0u8; 0x8000];
        assert!(matches!(w.item(0x11A0, &big), Err(ProtocolError::FieldTooLong { .. })));
    }

    proptest! {
        #[test]
        fn parse_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = OptionalSection::parse(Bytes::from(bytes.clone()), LlWidth::Two);
            let _ = OptionalSection::parse(Bytes::from(bytes), LlWidth::Four);
        }

        #[test]
        fn written_items_parse_back(items in proptest::collection::vec(
            (any::<u16>(), proptest::collection::vec(any::<u8>(), 0..64)), 0..8)
        ) {
            let mut w = OptionalWriter::new(LlWidth::Four);
            for (cp, payload) in &items {
                w.item(*cp, payload).unwrap();
            }
            let section = OptionalSection::parse(w.into_inner().freeze(), LlWidth::Four).unwrap();
            prop_assert_eq!(section.len(), items.len());
            for (parsed, (cp, payload)) in section.items().iter().zip(&items) {
                prop_assert_eq!(parsed.code_point, *cp);
                prop_assert_eq!(&parsed.payload[..], &payload[..]);
            }
        }
    }
}
