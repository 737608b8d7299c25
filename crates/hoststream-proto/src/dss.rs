//! DSS (Data Stream Structure) segments used by the DDM listener.
//!
//! ```text
//! Offset  Len  Field
//! 0       2    Length (includes this 6-byte header, at most 32767)
//! 2       1    Magic 0xD0
//! 3       1    Format: type in the low nibble, chain bits above
//! 4       2    Correlation id
//! ```

use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};

use crate::errors::{ProtocolError, Result};

/// Header size.
pub const DSS_HEADER_LEN: usize = 6;

/// Largest segment, header included.
pub const DSS_MAX_LENGTH: usize = 0x7FFF;

/// Magic byte at offset 2.
pub const DSS_MAGIC: u8 = 0xD0;

/// Segment type, the low nibble of the format byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DssType {
    /// Request
    Request = 1,
    /// Reply
    Reply = 2,
    /// Object
    Object = 3,
    /// Communication
    Communication = 4,
}

impl DssType {
    fn from_nibble(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Request),
            2 => Ok(Self::Reply),
            3 => Ok(Self::Object),
            4 => Ok(Self::Communication),
            other => Err(ProtocolError::InvalidField { field: "DSS type", reason: other.to_string() }),
        }
    }
}

bitflags! {
    /// Chaining bits of the format byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DssFlags: u8 {
        /// Same correlation id as the next chained segment
        const SAME_CORRELATOR = 0x10;
        /// Continuation of the previous segment
        const CONTINUATION = 0x20;
        /// Another segment follows
        const CHAINED = 0x40;
    }
}

/// One DSS segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DssSegment {
    /// Segment type
    pub dss_type: DssType,
    /// Chaining bits
    pub flags: DssFlags,
    /// Correlation id
    pub correlation_id: u16,
    /// DDM objects
    pub payload: Bytes,
}

impl DssSegment {
    /// Unchained request segment.
    pub fn request(correlation_id: u16, payload: impl Into<Bytes>) -> Self {
        Self { dss_type: DssType::Request, flags: DssFlags::empty(), correlation_id, payload: payload.into() }
    }

    /// Unchained reply segment.
    pub fn reply(correlation_id: u16, payload: impl Into<Bytes>) -> Self {
        Self { dss_type: DssType::Reply, flags: DssFlags::empty(), correlation_id, payload: payload.into() }
    }

    /// Builder-style flag setter.
    #[must_use]
    pub fn with_flags(mut self, flags: DssFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Whether another segment follows.
    pub fn is_chained(&self) -> bool {
        self.flags.contains(DssFlags::CHAINED)
    }

    /// Encoded size.
    pub fn encoded_len(&self) -> usize {
        DSS_HEADER_LEN + self.payload.len()
    }

    /// Wire form.
    pub fn encode(&self) -> Result<Bytes> {
        let length = self.encoded_len();
        if length > DSS_MAX_LENGTH {
            return Err(ProtocolError::FrameTooLarge { size: length, max: DSS_MAX_LENGTH });
        }
        let mut buf = BytesMut::with_capacity(length);
        buf.put_u16(length as u16);
        buf.put_u8(DSS_MAGIC);
        buf.put_u8(self.dss_type as u8 | self.flags.bits());
        buf.put_u16(self.correlation_id);
        buf.extend_from_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Segment length declared by the header at the start of `buf`, once
    /// six bytes are available.
    pub fn peek_length(buf: &[u8]) -> Result<Option<usize>> {
        let Some(header) = buf.get(..DSS_HEADER_LEN) else {
            return Ok(None);
        };
        if header[2] != DSS_MAGIC {
            return Err(ProtocolError::InvalidDssMagic(header[2]));
        }
        let length = usize::from(u16::from_be_bytes([header[0], header[1]]));
        if length < DSS_HEADER_LEN {
            return Err(ProtocolError::LengthTooSmall { length, minimum: DSS_HEADER_LEN });
        }
        if length > DSS_MAX_LENGTH {
            return Err(ProtocolError::FrameTooLarge { size: length, max: DSS_MAX_LENGTH });
        }
        Ok(Some(length))
    }

    /// Decode the segment at the start of `buf`, returning it and the bytes
    /// consumed.
    pub fn decode_prefix(buf: &[u8]) -> Result<(Self, usize)> {
        let Some(length) = Self::peek_length(buf)? else {
            return Err(ProtocolError::Incomplete { needed: DSS_HEADER_LEN - buf.len() });
        };
        if buf.len() < length {
            return Err(ProtocolError::Incomplete { needed: length - buf.len() });
        }
        let format = buf[3];
        let segment = Self {
            dss_type: DssType::from_nibble(format & 0x0F)?,
            flags: DssFlags::from_bits_truncate(format & 0xF0),
            correlation_id: u16::from_be_bytes([buf[4], buf[5]]),
            payload: Bytes::copy_from_slice(&buf[DSS_HEADER_LEN..length]),
        };
        Ok((segment, length))
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn header_layout() {
        let segment = DssSegment::request(1, Bytes::copy_from_slice(&hex!("0004 1041")))
            .with_flags(DssFlags::CHAINED | DssFlags::SAME_CORRELATOR);
        assert_eq!(&segment.encode().unwrap()[..], &hex!("000A D0 51 0001 0004 1041")[..]);
    }

    #[test]
    fn decode_reads_flags_and_type() {
        let (segment, used) = DssSegment::decode_prefix(&hex!("0008 D0 42 0003 ABCD FFFF")).unwrap();
        assert_eq!(used, 8);
        assert_eq!(segment.dss_type, DssType::Reply);
        assert!(segment.is_chained());
        assert_eq!(segment.correlation_id, 3);
        assert_eq!(&segment.payload[..], &[0xAB, 0xCD]);
    }

    #[test]
    fn bad_magic_rejected() {
        assert_eq!(
            DssSegment::decode_prefix(&hex!("0006 C0 01 0001")).unwrap_err(),
            ProtocolError::InvalidDssMagic(0xC0)
        );
    }

    #[test]
    fn short_length_rejected() {
        assert_eq!(
            DssSegment::decode_prefix(&hex!("0004 D0 01 0001")).unwrap_err(),
            ProtocolError::LengthTooSmall { length: 4, minimum: 6 }
        );
    }

    #[test]
    fn oversize_payload_cannot_be_encoded() {
        let segment = DssSegment::request(1, vec![0u8; DSS_MAX_LENGTH]);
        assert!(matches!(segment.encode(), Err(ProtocolError::FrameTooLarge { .. })));
    }

    #[test]
    fn truncated_segment_reports_missing_bytes() {
        assert_eq!(
            DssSegment::decode_prefix(&hex!("0010 D0 01 0001 00")).unwrap_err(),
            ProtocolError::Incomplete { needed: 9 }
        );
        assert_eq!(
            DssSegment::decode_prefix(&hex!("0010")).unwrap_err(),
            ProtocolError::Incomplete { needed: 4 }
        );
    }

    proptest! {
        #[test]
        fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = DssSegment::decode_prefix(&bytes);
        }
    }
}
