//! Central server (0xE000) messages: attribute exchange and conversion-table
//! download.

use bytes::Bytes;

use crate::{
    errors::{ProtocolError, Result},
    frame::{DataStream, Reply, Request},
    optional::OptionalWriter,
    retcode::{ErrorKind, HostError, ReplyError},
    server::ServerId,
    template::TemplateWriter,
    text::{CCSID_UTF16, Ccsid, TABLE_LEN, TextCodec},
};

/// Request ids.
pub mod id {
    /// Exchange attributes
    pub const EXCHANGE_ATTRIBUTES: u16 = 0x1001;
    /// Exchange attributes reply
    pub const EXCHANGE_ATTRIBUTES_REPLY: u16 = 0x2001;
    /// Retrieve conversion map
    pub const RETRIEVE_CONVERSION_MAP: u16 = 0x1201;
    /// Retrieve conversion map reply
    pub const RETRIEVE_CONVERSION_MAP_REPLY: u16 = 0x2201;
}

/// Code point of the downloaded table.
pub const CP_CONVERSION_TABLE: u16 = 0x110B;

/// Map type of a single-byte table.
pub const MAP_SINGLE_BYTE: u16 = 1;

/// Return codes.
pub mod rc {
    /// Success
    pub const OK: u16 = 0x0000;
    /// Malformed request
    pub const INVALID_REQUEST: u16 = 0x0001;
    /// No table for the requested CCSID pair
    pub const TABLE_NOT_AVAILABLE: u16 = 0x0003;
    /// Host resource limit
    pub const RESOURCE_LIMIT: u16 = 0x0004;
}

/// Classify a central-server return code. `None` means success.
pub fn classify(return_code: u16) -> Option<ErrorKind> {
    match return_code {
        rc::OK => None,
        rc::INVALID_REQUEST => Some(ErrorKind::InvalidRequest),
        rc::TABLE_NOT_AVAILABLE => Some(ErrorKind::ObjectNotFound),
        rc::RESOURCE_LIMIT => Some(ErrorKind::ResourceLimit),
        _ => Some(ErrorKind::ServerError),
    }
}

/// Turn a non-zero return code into a [`HostError`].
pub fn check(return_code: u16) -> std::result::Result<(), HostError> {
    match classify(return_code) {
        None => Ok(()),
        Some(kind) => Err(HostError::new(ServerId::Central, u32::from(return_code), kind)),
    }
}

/// Width of the national language version field.
const NLV_LEN: usize = 4;

/// Central-server attribute exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeAttributesRequest {
    /// CCSID the client works in
    pub client_ccsid: u32,
    /// National language version, four digits such as `2924`
    pub nlv: String,
}

impl Request for ExchangeAttributesRequest {
    fn server(&self) -> ServerId {
        ServerId::Central
    }

    fn request_id(&self) -> u16 {
        id::EXCHANGE_ATTRIBUTES
    }

    fn reply_ids(&self) -> &'static [u16] {
        &[id::EXCHANGE_ATTRIBUTES_REPLY]
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u32(self.client_ccsid).text(&TextCodec::ebcdic(), &self.nlv, NLV_LEN)?;
        Ok(())
    }
}

impl ExchangeAttributesRequest {
    /// Decode on the server side.
    pub fn parse(ds: &DataStream) -> Result<Self> {
        let mut r = ds.template_reader();
        Ok(Self { client_ccsid: r.u32()?, nlv: r.text(&TextCodec::ebcdic(), NLV_LEN)? })
    }
}

/// Reply to [`ExchangeAttributesRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeAttributesReply {
    /// Return code
    pub return_code: u16,
    /// Server job CCSID
    pub server_ccsid: u32,
    /// Server national language version
    pub server_nlv: String,
}

impl Reply for ExchangeAttributesReply {
    const REPLY_ID: u16 = id::EXCHANGE_ATTRIBUTES_REPLY;

    fn parse(ds: &DataStream) -> Result<Self> {
        let mut r = ds.template_reader();
        Ok(Self {
            return_code: r.u16()?,
            server_ccsid: r.u32()?,
            server_nlv: r.text(&TextCodec::ebcdic(), NLV_LEN)?,
        })
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u16(self.return_code)
            .u32(self.server_ccsid)
            .text(&TextCodec::ebcdic(), &self.server_nlv, NLV_LEN)?;
        Ok(())
    }
}

/// Download the Unicode table of a single-byte CCSID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveConversionMapRequest {
    /// Host CCSID
    pub source_ccsid: Ccsid,
    /// Always 1200 for the tables used here
    pub target_ccsid: Ccsid,
    /// Map type
    pub map_type: u16,
}

impl RetrieveConversionMapRequest {
    /// Single-byte table for `ccsid`.
    pub fn single_byte(ccsid: Ccsid) -> Self {
        Self { source_ccsid: ccsid, target_ccsid: CCSID_UTF16, map_type: MAP_SINGLE_BYTE }
    }

    /// Decode on the server side.
    pub fn parse(ds: &DataStream) -> Result<Self> {
        let mut r = ds.template_reader();
        Ok(Self { source_ccsid: r.u16()?, target_ccsid: r.u16()?, map_type: r.u16()? })
    }
}

impl Request for RetrieveConversionMapRequest {
    fn server(&self) -> ServerId {
        ServerId::Central
    }

    fn request_id(&self) -> u16 {
        id::RETRIEVE_CONVERSION_MAP
    }

    fn reply_ids(&self) -> &'static [u16] {
        &[id::RETRIEVE_CONVERSION_MAP_REPLY]
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u16(self.source_ccsid).u16(self.target_ccsid).u16(self.map_type);
        Ok(())
    }
}

/// Reply to [`RetrieveConversionMapRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveConversionMapReply {
    /// Return code
    pub return_code: u16,
    /// 512-byte UTF-16BE table, present on success
    pub table: Option<Bytes>,
}

impl Reply for RetrieveConversionMapReply {
    const REPLY_ID: u16 = id::RETRIEVE_CONVERSION_MAP_REPLY;

    fn parse(ds: &DataStream) -> Result<Self> {
        let return_code = ds.template_reader().u16()?;
        let table = ds.optional_section()?.find(CP_CONVERSION_TABLE).map(|i| i.payload.clone());
        Ok(Self { return_code, table })
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u16(self.return_code);
        Ok(())
    }

    fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
        if let Some(table) = &self.table {
            w.item(CP_CONVERSION_TABLE, table)?;
        }
        Ok(())
    }
}

impl RetrieveConversionMapReply {
    /// Table bytes, checked for the expected size.
    pub fn into_table(self) -> std::result::Result<Bytes, ReplyError> {
        check(self.return_code)?;
        let table = self.table.ok_or(ProtocolError::MissingCodePoint(CP_CONVERSION_TABLE))?;
        if table.len() != TABLE_LEN {
            return Err(ProtocolError::InvalidField {
                field: "conversion table",
                reason: format!("{} bytes, expected {TABLE_LEN}", table.len()),
            }
            .into());
        }
        Ok(table)
    }
}
