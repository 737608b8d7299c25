//! CCSID text conversion.
//!
//! Names and identifiers on the wire are either single-byte EBCDIC (data-queue
//! names, user ids, DDM strings) or UTF-16BE (IFS path names). CCSID 37 ships
//! built in; other single-byte pages are downloaded from the central server as
//! a 256-entry table of UTF-16BE code units and turned into a [`CodePage`]
//! with [`CodePage::from_unicode_table`].

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, LazyLock},
};

use crate::errors::{ProtocolError, Result};

/// Coded character set identifier.
pub type Ccsid = u16;

/// US/Canada EBCDIC.
pub const CCSID_EBCDIC_US: Ccsid = 37;
/// UTF-16 big endian.
pub const CCSID_UTF16: Ccsid = 1200;
/// UCS-2 big endian (treated as UTF-16).
pub const CCSID_UCS2: Ccsid = 13488;
/// UCS-2 as used by the file server (treated as UTF-16).
pub const CCSID_UCS2_FILE: Ccsid = 61952;

/// Size of a downloaded single-byte table in bytes.
pub const TABLE_LEN: usize = 512;

/// CCSID 37 to ISO-8859-1, indexed by EBCDIC byte.
#[rustfmt::skip]
const CP037_TO_LATIN1: [u8; 256] = [
    0x00, 0x01, 0x02, 0x03, 0x9C, 0x09, 0x86, 0x7F, 0x97, 0x8D, 0x8E, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
    0x10, 0x11, 0x12, 0x13, 0x9D, 0x85, 0x08, 0x87, 0x18, 0x19, 0x92, 0x8F, 0x1C, 0x1D, 0x1E, 0x1F,
    0x80, 0x81, 0x82, 0x83, 0x84, 0x0A, 0x17, 0x1B, 0x88, 0x89, 0x8A, 0x8B, 0x8C, 0x05, 0x06, 0x07,
    0x90, 0x91, 0x16, 0x93, 0x94, 0x95, 0x96, 0x04, 0x98, 0x99, 0x9A, 0x9B, 0x14, 0x15, 0x9E, 0x1A,
    0x20, 0xA0, 0xE2, 0xE4, 0xE0, 0xE1, 0xE3, 0xE5, 0xE7, 0xF1, 0xA2, 0x2E, 0x3C, 0x28, 0x2B, 0x7C,
    0x26, 0xE9, 0xEA, 0xEB, 0xE8, 0xED, 0xEE, 0xEF, 0xEC, 0xDF, 0x21, 0x24, 0x2A, 0x29, 0x3B, 0xAC,
    0x2D, 0x2F, 0xC2, 0xC4, 0xC0, 0xC1, 0xC3, 0xC5, 0xC7, 0xD1, 0xA6, 0x2C, 0x25, 0x5F, 0x3E, 0x3F,
    0xF8, 0xC9, 0xCA, 0xCB, 0xC8, 0xCD, 0xCE, 0xCF, 0xCC, 0x60, 0x3A, 0x23, 0x40, 0x27, 0x3D, 0x22,
    0xD8, 0x61, 0x62, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0xAB, 0xBB, 0xF0, 0xFD, 0xFE, 0xB1,
    0xB0, 0x6A, 0x6B, 0x6C, 0x6D, 0x6E, 0x6F, 0x70, 0x71, 0x72, 0xAA, 0xBA, 0xE6, 0xB8, 0xC6, 0xA4,
    0xB5, 0x7E, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7A, 0xA1, 0xBF, 0xD0, 0xDD, 0xDE, 0xAE,
    0x5E, 0xA3, 0xA5, 0xB7, 0xA9, 0xA7, 0xB6, 0xBC, 0xBD, 0xBE, 0x5B, 0x5D, 0xAF, 0xA8, 0xB4, 0xD7,
    0x7B, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0xAD, 0xF4, 0xF6, 0xF2, 0xF3, 0xF5,
    0x7D, 0x4A, 0x4B, 0x4C, 0x4D, 0x4E, 0x4F, 0x50, 0x51, 0x52, 0xB9, 0xFB, 0xFC, 0xF9, 0xFA, 0xFF,
    0x5C, 0xF7, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5A, 0xB2, 0xD4, 0xD6, 0xD2, 0xD3, 0xD5,
    0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0xB3, 0xDB, 0xDC, 0xD9, 0xDA, 0x9F,
];

static CP037: LazyLock<Arc<CodePage>> = LazyLock::new(|| {
    let mut to_unicode = ['\0'; 256];
    for (slot, &latin1) in to_unicode.iter_mut().zip(CP037_TO_LATIN1.iter()) {
        *slot = char::from(latin1);
    }
    Arc::new(CodePage::from_chars(CCSID_EBCDIC_US, to_unicode))
});

/// Whether `ccsid` is one of the Unicode CCSIDs handled as UTF-16BE.
pub fn is_unicode(ccsid: Ccsid) -> bool {
    matches!(ccsid, CCSID_UTF16 | CCSID_UCS2 | CCSID_UCS2_FILE)
}

/// A single-byte code page.
#[derive(Clone)]
pub struct CodePage {
    ccsid: Ccsid,
    to_unicode: [char; 256],
    from_unicode: HashMap<char, u8>,
}

impl CodePage {
    fn from_chars(ccsid: Ccsid, to_unicode: [char; 256]) -> Self {
        let mut from_unicode = HashMap::with_capacity(256);
        for (byte, &ch) in to_unicode.iter().enumerate() {
            // Substitution characters can appear more than once; the lowest
            // byte wins so encoding is deterministic.
            from_unicode.entry(ch).or_insert(byte as u8);
        }
        Self { ccsid, to_unicode, from_unicode }
    }

    /// The built-in CCSID 37 page.
    pub fn cp037() -> Arc<Self> {
        Arc::clone(&CP037)
    }

    /// Build a page from a downloaded table of 256 UTF-16BE code units.
    pub fn from_unicode_table(ccsid: Ccsid, table: &[u8]) -> Result<Self> {
        if table.len() != TABLE_LEN {
            return Err(ProtocolError::InvalidTable { ccsid, len: table.len() });
        }
        let mut to_unicode = ['\0'; 256];
        for (slot, unit) in to_unicode.iter_mut().zip(table.chunks_exact(2)) {
            let code = u16::from_be_bytes([unit[0], unit[1]]);
            *slot = char::from_u32(u32::from(code)).unwrap_or(char::REPLACEMENT_CHARACTER);
        }
        Ok(Self::from_chars(ccsid, to_unicode))
    }

    /// Serialize to the 512-byte table format used by the central server.
    pub fn to_unicode_table(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(TABLE_LEN);
        for ch in self.to_unicode {
            let mut units = [0u16; 2];
            let code = ch.encode_utf16(&mut units).first().copied().unwrap_or(0xFFFD);
            out.extend_from_slice(&code.to_be_bytes());
        }
        out
    }

    /// CCSID of this page.
    pub fn ccsid(&self) -> Ccsid {
        self.ccsid
    }

    /// Decode one byte.
    pub fn decode_byte(&self, byte: u8) -> char {
        self.to_unicode[usize::from(byte)]
    }

    /// Encode one character, if representable.
    pub fn encode_char(&self, ch: char) -> Option<u8> {
        self.from_unicode.get(&ch).copied()
    }
}

impl fmt::Debug for CodePage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodePage").field("ccsid", &self.ccsid).finish_non_exhaustive()
    }
}

/// Converts between Rust strings and one host CCSID.
#[derive(Debug, Clone)]
pub enum TextCodec {
    /// Single-byte EBCDIC page
    SingleByte(Arc<CodePage>),
    /// UTF-16BE under one of the Unicode CCSIDs
    Utf16 {
        /// Which Unicode CCSID this codec reports
        ccsid: Ccsid,
    },
}

impl TextCodec {
    /// CCSID 37.
    pub fn ebcdic() -> Self {
        Self::SingleByte(CodePage::cp037())
    }

    /// UTF-16BE (CCSID 1200).
    pub fn utf16() -> Self {
        Self::Utf16 { ccsid: CCSID_UTF16 }
    }

    /// Codec for a CCSID that needs no downloaded table.
    pub fn builtin(ccsid: Ccsid) -> Option<Self> {
        match ccsid {
            CCSID_EBCDIC_US => Some(Self::ebcdic()),
            c if is_unicode(c) => Some(Self::Utf16 { ccsid: c }),
            _ => None,
        }
    }

    /// CCSID handled by this codec.
    pub fn ccsid(&self) -> Ccsid {
        match self {
            Self::SingleByte(page) => page.ccsid(),
            Self::Utf16 { ccsid } => *ccsid,
        }
    }

    /// Encode `value`; unmappable characters are an error.
    pub fn encode(&self, value: &str) -> Result<Vec<u8>> {
        match self {
            Self::SingleByte(page) => value
                .chars()
                .map(|ch| {
                    page.encode_char(ch).ok_or(ProtocolError::Unmappable { ccsid: page.ccsid(), ch })
                })
                .collect(),
            Self::Utf16 { .. } => {
                Ok(value.encode_utf16().flat_map(u16::to_be_bytes).collect())
            },
        }
    }

    /// Decode host bytes.
    pub fn decode(&self, bytes: &[u8]) -> Result<String> {
        match self {
            Self::SingleByte(page) => Ok(bytes.iter().map(|&b| page.decode_byte(b)).collect()),
            Self::Utf16 { .. } => {
                if bytes.len() % 2 != 0 {
                    return Err(ProtocolError::InvalidUtf16);
                }
                let units = bytes.chunks_exact(2).map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
                char::decode_utf16(units)
                    .collect::<std::result::Result<String, _>>()
                    .map_err(|_| ProtocolError::InvalidUtf16)
            },
        }
    }

    /// Decode and strip trailing blanks and NULs.
    pub fn decode_trimmed(&self, bytes: &[u8]) -> Result<String> {
        let text = self.decode(bytes)?;
        Ok(text.trim_end_matches([' ', '\0']).to_string())
    }

    /// Encode into exactly `width` bytes, padding with blanks.
    pub fn encode_padded(&self, value: &str, width: usize) -> Result<Vec<u8>> {
        let mut out = self.encode(value)?;
        if out.len() > width {
            return Err(ProtocolError::FieldTooLong { len: out.len(), width });
        }
        let pad = self.encode(" ")?;
        while out.len() + pad.len() <= width {
            out.extend_from_slice(&pad);
        }
        out.resize(width, 0);
        Ok(out)
    }
}
