//! Network print server (0xE003) messages for spooled files.
//!
//! The request id names the object type and the template carries the action,
//! so one reply shape (0x8001) serves every request. Spooled files are
//! identified by job name, job user, job number, file name and file number.

use std::fmt;

use crate::{
    errors::{ProtocolError, Result},
    frame::{DataStream, Reply, Request},
    optional::{LlWidth, OptionalSection, OptionalWriter},
    retcode::{ErrorKind, HostError, ReplyResult},
    server::ServerId,
    template::TemplateWriter,
    text::TextCodec,
};

/// The only reply id the print server uses.
pub const REPLY_ID: u16 = 0x8001;

/// Optional-section code points.
pub mod cp {
    /// Job name
    pub const JOB_NAME: u16 = 0x0001;
    /// Job user; also the user filter of a list request
    pub const JOB_USER: u16 = 0x0002;
    /// Job number
    pub const JOB_NUMBER: u16 = 0x0003;
    /// Spooled file name
    pub const FILE_NAME: u16 = 0x0004;
    /// Spooled file number (u32)
    pub const FILE_NUMBER: u16 = 0x0005;
    /// Status
    pub const STATUS: u16 = 0x0010;
    /// Total pages (u32)
    pub const TOTAL_PAGES: u16 = 0x0011;
    /// Output queue; also the queue filter of a list request
    pub const OUTPUT_QUEUE: u16 = 0x0012;
    /// User data
    pub const USER_DATA: u16 = 0x0013;
    /// One list entry (nested)
    pub const LIST_ENTRY: u16 = 0x0100;
}

/// Return codes.
pub mod rc {
    /// Success
    pub const OK: u16 = 0;
    /// Invalid datastream
    pub const INVALID_DATASTREAM: u16 = 1;
    /// Invalid action for the object type
    pub const INVALID_ACTION: u16 = 2;
    /// Object not found
    pub const NOT_FOUND: u16 = 3;
    /// Not authorized
    pub const NOT_AUTHORIZED: u16 = 4;
    /// Object in use
    pub const IN_USE: u16 = 5;
    /// No more entries
    pub const NO_MORE_ENTRIES: u16 = 6;
}

/// Classify a print-server return code. `None` means success.
pub fn classify(return_code: u16) -> Option<ErrorKind> {
    let kind = match return_code {
        rc::OK => return None,
        rc::INVALID_DATASTREAM | rc::INVALID_ACTION => ErrorKind::InvalidRequest,
        rc::NOT_FOUND => ErrorKind::ObjectNotFound,
        rc::NOT_AUTHORIZED => ErrorKind::AccessDenied,
        rc::IN_USE => ErrorKind::InUse,
        rc::NO_MORE_ENTRIES => ErrorKind::EndOfData,
        _ => ErrorKind::ServerError,
    };
    Some(kind)
}

/// Turn a non-zero return code into a [`HostError`].
pub fn check(return_code: u16) -> std::result::Result<(), HostError> {
    match classify(return_code) {
        None => Ok(()),
        Some(kind) => Err(HostError::new(ServerId::NetPrint, u32::from(return_code), kind)),
    }
}

/// Parse a print reply and fail on a non-zero return code.
pub fn expect(ds: &DataStream) -> ReplyResult<PrintReply> {
    let reply = ds.parse_reply::<PrintReply>()?;
    check(reply.return_code)?;
    Ok(reply)
}

/// Object type, carried as the request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ObjectType {
    /// The print server itself
    Server = 0x0000,
    /// A spooled file
    SpooledFile = 0x0001,
}

impl ObjectType {
    /// Parse a request id.
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            0x0000 => Ok(Self::Server),
            0x0001 => Ok(Self::SpooledFile),
            other => Err(ProtocolError::InvalidField { field: "object type", reason: format!("0x{other:04X}") }),
        }
    }
}

/// Action, the first template field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Action {
    /// Exchange attributes (server object)
    ExchangeAttributes = 0x0000,
    /// Delete
    Delete = 0x0005,
    /// List
    List = 0x0007,
    /// Retrieve attributes
    RetrieveAttributes = 0x000A,
    /// Hold
    Hold = 0x000B,
    /// Release
    Release = 0x000C,
}

impl Action {
    /// Parse the wire value.
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            0x0000 => Ok(Self::ExchangeAttributes),
            0x0005 => Ok(Self::Delete),
            0x0007 => Ok(Self::List),
            0x000A => Ok(Self::RetrieveAttributes),
            0x000B => Ok(Self::Hold),
            0x000C => Ok(Self::Release),
            other => Err(ProtocolError::InvalidField { field: "action", reason: format!("0x{other:04X}") }),
        }
    }
}

/// Object type and action of an incoming request, for server-side dispatch.
pub fn parse_request_kind(ds: &DataStream) -> Result<(ObjectType, Action)> {
    Ok((ObjectType::from_u16(ds.request_id())?, Action::from_u16(ds.template_reader().u16()?)?))
}

fn text(section: &OptionalSection, code_point: u16) -> Result<String> {
    TextCodec::ebcdic().decode_trimmed(&section.require(code_point)?.payload)
}

fn optional_text(section: &OptionalSection, code_point: u16) -> Result<Option<String>> {
    section.find(code_point).map(|i| TextCodec::ebcdic().decode_trimmed(&i.payload)).transpose()
}

fn put_text(w: &mut OptionalWriter, code_point: u16, value: &str, width: Option<usize>) -> Result<()> {
    let codec = TextCodec::ebcdic();
    let bytes = match width {
        Some(width) => codec.encode_padded(value, width)?,
        None => codec.encode(value)?,
    };
    w.item(code_point, &bytes)?;
    Ok(())
}

/// Identity of a spooled file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpooledFileId {
    /// Job name
    pub job_name: String,
    /// Job user
    pub job_user: String,
    /// Job number (six digits)
    pub job_number: String,
    /// Spooled file name
    pub file_name: String,
    /// Spooled file number within the job
    pub file_number: u32,
}

impl SpooledFileId {
    fn write(&self, w: &mut OptionalWriter) -> Result<()> {
        put_text(w, cp::JOB_NAME, &self.job_name, Some(10))?;
        put_text(w, cp::JOB_USER, &self.job_user, Some(10))?;
        put_text(w, cp::JOB_NUMBER, &self.job_number, Some(6))?;
        put_text(w, cp::FILE_NAME, &self.file_name, Some(10))?;
        w.u32(cp::FILE_NUMBER, self.file_number)?;
        Ok(())
    }

    fn read(section: &OptionalSection) -> Result<Self> {
        Ok(Self {
            job_name: text(section, cp::JOB_NAME)?,
            job_user: text(section, cp::JOB_USER)?,
            job_number: text(section, cp::JOB_NUMBER)?,
            file_name: text(section, cp::FILE_NAME)?,
            file_number: section.require(cp::FILE_NUMBER)?.as_u32()?,
        })
    }
}

impl fmt::Display for SpooledFileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{} {} #{}",
            self.job_number, self.job_user, self.job_name, self.file_name, self.file_number
        )
    }
}

/// Attributes reported for a spooled file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpooledFileAttributes {
    /// Status such as `*READY` or `*HELD`
    pub status: String,
    /// Total pages
    pub total_pages: u32,
    /// Output queue
    pub output_queue: String,
    /// User data
    pub user_data: String,
}

impl SpooledFileAttributes {
    fn write(&self, w: &mut OptionalWriter) -> Result<()> {
        put_text(w, cp::STATUS, &self.status, None)?;
        w.u32(cp::TOTAL_PAGES, self.total_pages)?;
        put_text(w, cp::OUTPUT_QUEUE, &self.output_queue, None)?;
        put_text(w, cp::USER_DATA, &self.user_data, None)?;
        Ok(())
    }

    fn read(section: &OptionalSection) -> Result<Self> {
        Ok(Self {
            status: optional_text(section, cp::STATUS)?.unwrap_or_default(),
            total_pages: section.find(cp::TOTAL_PAGES).map(|i| i.as_u32()).transpose()?.unwrap_or(0),
            output_queue: optional_text(section, cp::OUTPUT_QUEUE)?.unwrap_or_default(),
            user_data: optional_text(section, cp::USER_DATA)?.unwrap_or_default(),
        })
    }
}

/// A listed spooled file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpooledFile {
    /// Identity
    pub id: SpooledFileId,
    /// Attributes
    pub attributes: SpooledFileAttributes,
}

/// Print-server attribute exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeAttributesRequest;

impl Request for ExchangeAttributesRequest {
    fn server(&self) -> ServerId {
        ServerId::NetPrint
    }

    fn request_id(&self) -> u16 {
        ObjectType::Server as u16
    }

    fn reply_ids(&self) -> &'static [u16] {
        &[REPLY_ID]
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u16(Action::ExchangeAttributes as u16).u16(0);
        Ok(())
    }
}

/// List spooled files, optionally filtered.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListSpooledFilesRequest {
    /// Only files owned by this user
    pub user: Option<String>,
    /// Only files on this output queue
    pub output_queue: Option<String>,
}

impl Request for ListSpooledFilesRequest {
    fn server(&self) -> ServerId {
        ServerId::NetPrint
    }

    fn request_id(&self) -> u16 {
        ObjectType::SpooledFile as u16
    }

    fn reply_ids(&self) -> &'static [u16] {
        &[REPLY_ID]
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u16(Action::List as u16).u16(0);
        Ok(())
    }

    fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
        if let Some(user) = &self.user {
            put_text(w, cp::JOB_USER, &user.to_uppercase(), None)?;
        }
        if let Some(queue) = &self.output_queue {
            put_text(w, cp::OUTPUT_QUEUE, &queue.to_uppercase(), None)?;
        }
        Ok(())
    }
}

impl ListSpooledFilesRequest {
    /// Decode on the server side.
    pub fn parse(ds: &DataStream) -> Result<Self> {
        let section = ds.optional_section()?;
        Ok(Self {
            user: optional_text(&section, cp::JOB_USER)?,
            output_queue: optional_text(&section, cp::OUTPUT_QUEUE)?,
        })
    }
}

/// Hold, release, delete or retrieve the attributes of one spooled file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpooledFileRequest {
    /// Action
    pub action: Action,
    /// Target file
    pub id: SpooledFileId,
}

impl Request for SpooledFileRequest {
    fn server(&self) -> ServerId {
        ServerId::NetPrint
    }

    fn request_id(&self) -> u16 {
        ObjectType::SpooledFile as u16
    }

    fn reply_ids(&self) -> &'static [u16] {
        &[REPLY_ID]
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u16(self.action as u16).u16(0);
        Ok(())
    }

    fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
        self.id.write(w)
    }
}

impl SpooledFileRequest {
    /// Decode on the server side.
    pub fn parse(ds: &DataStream) -> Result<Self> {
        let action = Action::from_u16(ds.template_reader().u16()?)?;
        Ok(Self { action, id: SpooledFileId::read(&ds.optional_section()?)? })
    }
}

/// The print server's reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrintReply {
    /// Return code
    pub return_code: u16,
    /// Entries of a list reply
    pub entries: Vec<SpooledFile>,
    /// Attributes of a retrieve-attributes reply
    pub attributes: Option<SpooledFileAttributes>,
}

impl PrintReply {
    /// Reply with only a return code.
    pub fn with_return_code(return_code: u16) -> Self {
        Self { return_code, ..Self::default() }
    }
}

impl Reply for PrintReply {
    const REPLY_ID: u16 = REPLY_ID;

    fn parse(ds: &DataStream) -> Result<Self> {
        let return_code = ds.template_reader().u16()?;
        let section = ds.optional_section()?;
        let entries = section
            .find_all(cp::LIST_ENTRY)
            .map(|item| {
                let nested = item.nested(LlWidth::Four)?;
                Ok(SpooledFile {
                    id: SpooledFileId::read(&nested)?,
                    attributes: SpooledFileAttributes::read(&nested)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let attributes = if section.find(cp::STATUS).is_some() {
            Some(SpooledFileAttributes::read(&section)?)
        } else {
            None
        };
        Ok(Self { return_code, entries, attributes })
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u16(self.return_code).u16(0);
        Ok(())
    }

    fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
        for entry in &self.entries {
            w.nested(cp::LIST_ENTRY, |inner| {
                entry.id.write(inner)?;
                entry.attributes.write(inner)
            })?;
        }
        if let Some(attributes) = &self.attributes {
            attributes.write(w)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(number: u32) -> SpooledFileId {
        SpooledFileId {
            job_name: "QPADEV0001".into(),
            job_user: "BOB".into(),
            job_number: "123456".into(),
            file_name: "QSYSPRT".into(),
            file_number: number,
        }
    }

    #[test]
    fn request_id_is_the_object_type() {
        let ds = DataStream::from_request(&SpooledFileRequest { action: Action::Hold, id: id(1) }).unwrap();
        assert_eq!(ds.request_id(), 0x0001);
        assert_eq!(&ds.template()[..], &[0x00, 0x0B, 0x00, 0x00]);
        assert_eq!(parse_request_kind(&ds).unwrap(), (ObjectType::SpooledFile, Action::Hold));
        assert_eq!(SpooledFileRequest::parse(&ds).unwrap().id, id(1));
    }

    #[test]
    fn list_reply_nests_entries() {
        let reply = PrintReply {
            return_code: 0,
            entries: (1..=3)
                .map(|n| SpooledFile {
                    id: id(n),
                    attributes: SpooledFileAttributes {
                        status: "*READY".into(),
                        total_pages: n,
                        output_queue: "QPRINT".into(),
                        user_data: String::new(),
                    },
                })
                .collect(),
            attributes: None,
        };
        let ds = DataStream::from_reply(ServerId::NetPrint, &reply).unwrap();
        let parsed = expect(&ds).unwrap();
        assert_eq!(parsed, reply);
        assert_eq!(parsed.entries[2].id.to_string(), "123456/BOB/QPADEV0001 QSYSPRT #3");
    }

    #[test]
    fn list_filters_are_upper_cased() {
        let request = ListSpooledFilesRequest { user: Some("bob".into()), output_queue: None };
        let ds = DataStream::from_request(&request).unwrap();
        let parsed = ListSpooledFilesRequest::parse(&ds).unwrap();
        assert_eq!(parsed.user.as_deref(), Some("BOB"));
        assert_eq!(parsed.output_queue, None);
    }

    #[test]
    fn failure_is_classified() {
        let ds = DataStream::from_reply(ServerId::NetPrint, &PrintReply::with_return_code(rc::NOT_FOUND))
            .unwrap();
        assert_eq!(expect(&ds).unwrap_err().kind(), Some(ErrorKind::ObjectNotFound));
    }
}
