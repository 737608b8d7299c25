//! Protocol error types.

use thiserror::Error;

use crate::server::ServerId;

/// Convenience alias for results in this crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding data streams.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Buffer shorter than a fixed-size structure.
    #[error("frame too short: need {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Bytes required
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// A prefix decode needs more bytes before a complete frame is available.
    #[error("incomplete frame: {needed} more bytes needed")]
    Incomplete {
        /// Additional bytes required
        needed: usize,
    },

    /// Length field smaller than the header it describes.
    #[error("length field {length} is smaller than the {minimum}-byte header")]
    LengthTooSmall {
        /// Declared length
        length: usize,
        /// Minimum legal length
        minimum: usize,
    },

    /// Frame exceeds the configured maximum.
    #[error("frame of {size} bytes exceeds maximum {max}")]
    FrameTooLarge {
        /// Declared size
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Template length points past the end of the frame.
    #[error("template length {template_len} exceeds the {available} bytes after the header")]
    TemplateOverrun {
        /// Declared template length
        template_len: usize,
        /// Bytes available after the header
        available: usize,
    },

    /// Server id not recognised.
    #[error("unknown server id 0x{0:04X}")]
    UnknownServer(u16),

    /// Reply id that the caller did not expect.
    #[error("unexpected reply id 0x{reply_id:04X} from {server}")]
    UnexpectedReplyId {
        /// Server that sent the reply
        server: ServerId,
        /// Reply id received
        reply_id: u16,
    },

    /// Template read past its end.
    #[error("template too short at offset {offset}: need {needed} bytes, have {available}")]
    TemplateTooShort {
        /// Offset of the failed read within the template
        offset: usize,
        /// Bytes requested
        needed: usize,
        /// Bytes left
        available: usize,
    },

    /// LL/CP item whose length is smaller than its own prefix.
    #[error("LL/CP item at offset {offset} has invalid length {length}")]
    InvalidItemLength {
        /// Offset of the item within its section
        offset: usize,
        /// Declared LL
        length: usize,
    },

    /// LL/CP item that runs past the end of its section.
    #[error("LL/CP item at offset {offset} declares {length} bytes, only {available} remain")]
    ItemOverrun {
        /// Offset of the item within its section
        offset: usize,
        /// Declared LL
        length: usize,
        /// Bytes remaining in the section
        available: usize,
    },

    /// Required code point absent from an optional section.
    #[error("required code point 0x{0:04X} missing")]
    MissingCodePoint(u16),

    /// Field present but with an illegal value.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// What was wrong
        reason: String,
    },

    /// Character not representable in the target CCSID.
    #[error("character {ch:?} cannot be represented in CCSID {ccsid}")]
    Unmappable {
        /// Target CCSID
        ccsid: u16,
        /// Offending character
        ch: char,
    },

    /// Text does not fit a fixed-width field.
    #[error("value of {len} bytes does not fit a {width}-byte field")]
    FieldTooLong {
        /// Encoded length
        len: usize,
        /// Field width
        width: usize,
    },

    /// Downloaded conversion table with the wrong shape.
    #[error("conversion table for CCSID {ccsid} has {len} bytes, expected 512")]
    InvalidTable {
        /// CCSID the table claims to describe
        ccsid: u16,
        /// Table length received
        len: usize,
    },

    /// UTF-16 data with an odd byte count or unpaired surrogate.
    #[error("invalid UTF-16 data")]
    InvalidUtf16,

    /// DSS segment without the 0xD0 magic byte.
    #[error("invalid DSS magic 0x{0:02X}")]
    InvalidDssMagic(u8),
}
