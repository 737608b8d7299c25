//! Fixed 20-byte data-stream header.
//!
//! ```text
//! Offset  Len  Field
//! 0       4    Total length (header + template + optional section)
//! 4       2    Header id (client attributes, normally 0)
//! 6       2    Server id
//! 8       4    CS instance
//! 12      4    Correlation id
//! 16      2    Template length
//! 18      2    Request / reply id
//! ```
//!
//! The layout is verified at compile time by `zerocopy`; every field is a
//! big-endian wrapper so the struct has alignment 1 and can be read straight
//! out of a socket buffer.

use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{BigEndian, U16, U32},
};

use crate::{
    errors::{ProtocolError, Result},
    server::ServerId,
};

/// Default upper bound on a single data stream (16 MiB).
pub const DEFAULT_MAX_LENGTH: usize = 16 * 1024 * 1024;

/// Data-stream header as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct DataStreamHeader {
    length: U32<BigEndian>,
    header_id: U16<BigEndian>,
    server_id: U16<BigEndian>,
    cs_instance: U32<BigEndian>,
    correlation_id: U32<BigEndian>,
    template_len: U16<BigEndian>,
    request_id: U16<BigEndian>,
}

const _: () = assert!(size_of::<DataStreamHeader>() == DataStreamHeader::SIZE);

impl DataStreamHeader {
    /// Encoded size.
    pub const SIZE: usize = 20;

    /// Header for a new data stream with correlation id 0.
    ///
    /// `total_len` covers header, template and optional section.
    pub fn new(server: ServerId, request_id: u16, template_len: u16, total_len: u32) -> Self {
        Self {
            length: U32::new(total_len),
            header_id: U16::new(0),
            server_id: U16::new(server.to_u16()),
            cs_instance: U32::new(0),
            correlation_id: U32::new(0),
            template_len: U16::new(template_len),
            request_id: U16::new(request_id),
        }
    }

    /// Parse the first [`Self::SIZE`] bytes of `bytes`.
    ///
    /// Only the layout is checked here; call [`Self::validate`] for the
    /// semantic invariants.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Some(prefix) = bytes.get(..Self::SIZE) else {
            return Err(ProtocolError::FrameTooShort { expected: Self::SIZE, actual: bytes.len() });
        };
        Self::read_from_bytes(prefix)
            .map_err(|_| ProtocolError::FrameTooShort { expected: Self::SIZE, actual: bytes.len() })
    }

    /// Wire bytes of this header.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }

    /// Check the length fields and server id.
    pub fn validate(&self, max_len: usize) -> Result<()> {
        let length = self.length();
        if length < Self::SIZE {
            return Err(ProtocolError::LengthTooSmall { length, minimum: Self::SIZE });
        }
        if length > max_len {
            return Err(ProtocolError::FrameTooLarge { size: length, max: max_len });
        }
        let available = length - Self::SIZE;
        if self.template_len() > available {
            return Err(ProtocolError::TemplateOverrun {
                template_len: self.template_len(),
                available,
            });
        }
        ServerId::from_u16(self.server_id.get())?;
        Ok(())
    }

    /// Total length in bytes.
    pub fn length(&self) -> usize {
        self.length.get() as usize
    }

    /// Header id (client attributes).
    pub fn header_id(&self) -> u16 {
        self.header_id.get()
    }

    /// Raw server id.
    pub fn raw_server_id(&self) -> u16 {
        self.server_id.get()
    }

    /// Server id, if known.
    pub fn server(&self) -> Result<ServerId> {
        ServerId::from_u16(self.server_id.get())
    }

    /// CS instance.
    pub fn cs_instance(&self) -> u32 {
        self.cs_instance.get()
    }

    /// Correlation id.
    pub fn correlation_id(&self) -> u32 {
        self.correlation_id.get()
    }

    /// Template length in bytes.
    pub fn template_len(&self) -> usize {
        usize::from(self.template_len.get())
    }

    /// Request or reply id.
    pub fn request_id(&self) -> u16 {
        self.request_id.get()
    }

    /// Length of the optional section implied by the length fields.
    pub fn optional_len(&self) -> usize {
        self.length().saturating_sub(Self::SIZE + self.template_len())
    }

    /// Copy with a different correlation id.
    #[must_use]
    pub fn with_correlation(mut self, correlation_id: u32) -> Self {
        self.correlation_id = U32::new(correlation_id);
        self
    }

    /// Copy with a different header id.
    #[must_use]
    pub fn with_header_id(mut self, header_id: u16) -> Self {
        self.header_id = U16::new(header_id);
        self
    }

    /// Copy with a different CS instance.
    #[must_use]
    pub fn with_cs_instance(mut self, cs_instance: u32) -> Self {
        self.cs_instance = U32::new(cs_instance);
        self
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn header_layout_is_big_endian() {
        let header = DataStreamHeader::new(ServerId::Signon, 0x7003, 0, 0x34).with_correlation(7);
        assert_eq!(header.to_bytes(), hex!("00000034 0000 E009 00000000 00000007 0000 7003"));
    }

    #[test]
    fn parse_reads_every_field() {
        let bytes = hex!("00000030 0001 E002 00000002 00000011 000A 8002 FFFF");
        let header = DataStreamHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.length(), 0x30);
        assert_eq!(header.header_id(), 1);
        assert_eq!(header.server(), Ok(ServerId::File));
        assert_eq!(header.cs_instance(), 2);
        assert_eq!(header.correlation_id(), 0x11);
        assert_eq!(header.template_len(), 10);
        assert_eq!(header.request_id(), 0x8002);
        assert_eq!(header.optional_len(), 0x30 - 30);
    }

    #[test]
    fn short_buffer_rejected() {
        let err = DataStreamHeader::from_bytes(&[0u8; 19]).unwrap_err();
        assert_eq!(err, ProtocolError::FrameTooShort { expected: 20, actual: 19 });
    }

    #[test]
    fn length_smaller_than_header_rejected() {
        let header = DataStreamHeader::new(ServerId::File, 1, 0, 12);
        assert_eq!(
            header.validate(DEFAULT_MAX_LENGTH),
            Err(ProtocolError::LengthTooSmall { length: 12, minimum: 20 })
        );
    }

    #[test]
    fn oversize_frame_rejected() {
        let header = DataStreamHeader::new(ServerId::File, 1, 0, 4096);
        assert_eq!(header.validate(1024), Err(ProtocolError::FrameTooLarge { size: 4096, max: 1024 }));
    }

    #[test]
    fn template_must_fit_inside_frame() {
        let header = DataStreamHeader::new(ServerId::File, 1, 8, 24);
        assert_eq!(
            header.validate(DEFAULT_MAX_LENGTH),
            Err(ProtocolError::TemplateOverrun { template_len: 8, available: 4 })
        );
    }

    #[test]
    fn unknown_server_fails_validation() {
        let mut bytes = DataStreamHeader::new(ServerId::File, 1, 0, 20).to_bytes();
        bytes[6..8].copy_from_slice(&0x1234u16.to_be_bytes());
        let header = DataStreamHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.validate(DEFAULT_MAX_LENGTH), Err(ProtocolError::UnknownServer(0x1234)));
    }
}
