//! File server (0xE002) messages for the integrated file system.
//!
//! Every reply template starts with a chain indicator. Any request may be
//! answered by the generic [`ReturnCodeReply`] instead of its specific reply,
//! which is how the server reports both failures and the success of requests
//! that have nothing else to say (close, delete, rename, mkdir).
//!
//! Names travel as UTF-16BE in code point 0x0002 and the template announces
//! CCSID 1200 for them.

use bitflags::bitflags;
use bytes::Bytes;

use crate::{
    errors::{ProtocolError, Result},
    frame::{DataStream, Reply, ReplyMode, Request},
    optional::OptionalWriter,
    retcode::{ErrorKind, HostError, ReplyResult},
    server::ServerId,
    template::TemplateWriter,
    text::{CCSID_UTF16, TextCodec},
};

/// Request and reply ids.
pub mod id {
    /// Exchange attributes
    pub const EXCHANGE_ATTRIBUTES: u16 = 0x0016;
    /// Exchange attributes reply
    pub const EXCHANGE_ATTRIBUTES_REPLY: u16 = 0x8016;
    /// Open a file
    pub const OPEN: u16 = 0x0002;
    /// Open reply
    pub const OPEN_REPLY: u16 = 0x8002;
    /// Read from an open file
    pub const READ: u16 = 0x0003;
    /// Read reply
    pub const READ_REPLY: u16 = 0x8003;
    /// Write to an open file
    pub const WRITE: u16 = 0x0004;
    /// Write reply
    pub const WRITE_REPLY: u16 = 0x800B;
    /// Close a handle
    pub const CLOSE: u16 = 0x0009;
    /// List attributes of the entries matching a pattern
    pub const LIST_ATTRIBUTES: u16 = 0x000A;
    /// One listing entry (chained)
    pub const LIST_ENTRY_REPLY: u16 = 0x8005;
    /// Delete a file
    pub const DELETE_FILE: u16 = 0x000C;
    /// Create a directory
    pub const CREATE_DIRECTORY: u16 = 0x000D;
    /// Delete a directory
    pub const DELETE_DIRECTORY: u16 = 0x000E;
    /// Rename a file or directory
    pub const RENAME: u16 = 0x000F;
    /// Generic return-code reply
    pub const RETURN_CODE: u16 = 0x8001;
}

/// Optional-section code points.
pub mod cp {
    /// File or directory name (UTF-16BE)
    pub const NAME: u16 = 0x0002;
    /// Rename source
    pub const SOURCE_NAME: u16 = 0x0003;
    /// Rename target
    pub const TARGET_NAME: u16 = 0x0004;
    /// CCSID list (request) or chosen CCSID (reply)
    pub const CCSIDS: u16 = 0x000A;
    /// File data
    pub const DATA: u16 = 0x0020;
}

/// Return codes.
pub mod rc {
    /// Success
    pub const SUCCESS: u16 = 0;
    /// File in use
    pub const FILE_IN_USE: u16 = 1;
    /// File not found
    pub const FILE_NOT_FOUND: u16 = 2;
    /// Path not found
    pub const PATH_NOT_FOUND: u16 = 3;
    /// Duplicate name
    pub const DUPLICATE_NAME: u16 = 4;
    /// Access denied
    pub const ACCESS_DENIED: u16 = 5;
    /// Invalid handle
    pub const INVALID_HANDLE: u16 = 6;
    /// Invalid name
    pub const INVALID_NAME: u16 = 7;
    /// Invalid attribute name
    pub const INVALID_ATTRIBUTE_NAME: u16 = 8;
    /// Entry exists
    pub const ENTRY_EXISTS: u16 = 9;
    /// Directory not empty
    pub const DIRECTORY_NOT_EMPTY: u16 = 10;
    /// Substream in use
    pub const SUBSTREAM_IN_USE: u16 = 11;
    /// Resource limit
    pub const RESOURCE_LIMIT: u16 = 12;
    /// Resource not available
    pub const RESOURCE_NOT_AVAILABLE: u16 = 13;
    /// Request denied
    pub const REQUEST_DENIED: u16 = 14;
    /// Directory entry damaged
    pub const ENTRY_DAMAGED: u16 = 15;
    /// Invalid connection
    pub const INVALID_CONNECTION: u16 = 16;
    /// Invalid request
    pub const INVALID_REQUEST: u16 = 17;
    /// No more files (ends a listing)
    pub const NO_MORE_FILES: u16 = 18;
    /// Datastream syntax error
    pub const SYNTAX_ERROR: u16 = 19;
    /// No more data (read at end of file)
    pub const NO_MORE_DATA: u16 = 20;
}

/// Classify a file-server return code. `None` means success.
pub fn classify(return_code: u16) -> Option<ErrorKind> {
    let kind = match return_code {
        rc::SUCCESS => return None,
        rc::FILE_IN_USE | rc::SUBSTREAM_IN_USE => ErrorKind::InUse,
        rc::FILE_NOT_FOUND => ErrorKind::ObjectNotFound,
        rc::PATH_NOT_FOUND => ErrorKind::PathNotFound,
        rc::DUPLICATE_NAME | rc::ENTRY_EXISTS => ErrorKind::AlreadyExists,
        rc::ACCESS_DENIED | rc::REQUEST_DENIED => ErrorKind::AccessDenied,
        rc::INVALID_HANDLE => ErrorKind::InvalidHandle,
        rc::INVALID_NAME | rc::INVALID_ATTRIBUTE_NAME => ErrorKind::InvalidName,
        rc::DIRECTORY_NOT_EMPTY => ErrorKind::NotEmpty,
        rc::RESOURCE_LIMIT | rc::RESOURCE_NOT_AVAILABLE => ErrorKind::ResourceLimit,
        rc::INVALID_REQUEST | rc::SYNTAX_ERROR => ErrorKind::InvalidRequest,
        rc::NO_MORE_FILES => ErrorKind::EndOfData,
        rc::NO_MORE_DATA => ErrorKind::NoData,
        _ => ErrorKind::ServerError,
    };
    Some(kind)
}

/// Turn a non-zero return code into a [`HostError`].
pub fn check(return_code: u16) -> std::result::Result<(), HostError> {
    match classify(return_code) {
        None => Ok(()),
        Some(kind) => Err(HostError::new(ServerId::File, u32::from(return_code), kind)),
    }
}

/// Parse `ds` as `R`, turning a [`ReturnCodeReply`] into the error it carries.
pub fn expect<R: Reply>(ds: &DataStream) -> ReplyResult<R> {
    if ds.request_id() == id::RETURN_CODE && R::REPLY_ID != id::RETURN_CODE {
        let reply = ReturnCodeReply::parse(ds)?;
        check(reply.return_code)?;
        return Err(ProtocolError::UnexpectedReplyId { server: ds.server(), reply_id: id::RETURN_CODE }
            .into());
    }
    Ok(ds.parse_reply::<R>()?)
}

/// Expect a successful [`ReturnCodeReply`].
pub fn expect_success(ds: &DataStream) -> ReplyResult<()> {
    let reply = ds.parse_reply::<ReturnCodeReply>()?;
    check(reply.return_code)?;
    Ok(())
}

/// Template prefix for requests that name an object.
fn write_name_template(w: &mut TemplateWriter) {
    // Name CCSID, then working directory handle (1 = root)
    w.u16(CCSID_UTF16).u32(1);
}

fn encode_name(name: &str) -> Result<Vec<u8>> {
    TextCodec::utf16().encode(name)
}

fn decode_name(bytes: &[u8]) -> Result<String> {
    TextCodec::utf16().decode(bytes)
}

/// Name in code point `cp` of a request that uses the name template.
fn parse_name(ds: &DataStream, code_point: u16) -> Result<String> {
    decode_name(&ds.optional_section()?.require(code_point)?.payload)
}

/// Generic reply carrying only a return code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnCodeReply {
    /// Chain indicator
    pub chain: u16,
    /// Return code
    pub return_code: u16,
}

impl ReturnCodeReply {
    /// Final reply with `return_code`.
    pub fn new(return_code: u16) -> Self {
        Self { chain: 0, return_code }
    }
}

impl Reply for ReturnCodeReply {
    const REPLY_ID: u16 = id::RETURN_CODE;

    fn parse(ds: &DataStream) -> Result<Self> {
        let mut r = ds.template_reader();
        Ok(Self { chain: r.u16()?, return_code: r.u16()? })
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u16(self.chain).u16(self.return_code);
        Ok(())
    }
}

/// File-server attribute exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeAttributesRequest {
    /// Datastream level
    pub datastream_level: u16,
    /// Feature flags
    pub flags: u16,
    /// Largest data block the client accepts
    pub max_data_block: u32,
    /// Name CCSIDs the client can use, most preferred first
    pub preferred_ccsids: Vec<u16>,
}

impl Request for ExchangeAttributesRequest {
    fn server(&self) -> ServerId {
        ServerId::File
    }

    fn request_id(&self) -> u16 {
        id::EXCHANGE_ATTRIBUTES
    }

    fn reply_ids(&self) -> &'static [u16] {
        &[id::EXCHANGE_ATTRIBUTES_REPLY, id::RETURN_CODE]
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u16(self.datastream_level).u16(self.flags).u32(self.max_data_block);
        Ok(())
    }

    fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
        let list: Vec<u8> = self.preferred_ccsids.iter().flat_map(|c| c.to_be_bytes()).collect();
        w.item(cp::CCSIDS, &list)?;
        Ok(())
    }
}

impl ExchangeAttributesRequest {
    /// Decode on the server side.
    pub fn parse(ds: &DataStream) -> Result<Self> {
        let mut r = ds.template_reader();
        let (datastream_level, flags, max_data_block) = (r.u16()?, r.u16()?, r.u32()?);
        let section = ds.optional_section()?;
        let preferred_ccsids = section
            .find(cp::CCSIDS)
            .map(|i| i.payload.chunks_exact(2).map(|p| u16::from_be_bytes([p[0], p[1]])).collect())
            .unwrap_or_default();
        Ok(Self { datastream_level, flags, max_data_block, preferred_ccsids })
    }
}

/// Reply to [`ExchangeAttributesRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeAttributesReply {
    /// Datastream level the server will use
    pub datastream_level: u16,
    /// Feature flags
    pub flags: u16,
    /// Largest data block the server sends
    pub max_data_block: u32,
    /// Name CCSID the server chose
    pub ccsid: u16,
}

impl Reply for ExchangeAttributesReply {
    const REPLY_ID: u16 = id::EXCHANGE_ATTRIBUTES_REPLY;

    fn parse(ds: &DataStream) -> Result<Self> {
        let mut r = ds.template_reader();
        r.skip(2)?;
        let (datastream_level, flags, max_data_block) = (r.u16()?, r.u16()?, r.u32()?);
        let ccsid = ds.optional_section()?.require(cp::CCSIDS)?.as_u16()?;
        Ok(Self { datastream_level, flags, max_data_block, ccsid })
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u16(0).u16(self.datastream_level).u16(self.flags).u32(self.max_data_block);
        Ok(())
    }

    fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
        w.u16(cp::CCSIDS, self.ccsid)?;
        Ok(())
    }
}

bitflags! {
    /// Requested access to an opened file.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessMode: u16 {
        /// Read
        const READ = 0x0001;
        /// Write
        const WRITE = 0x0002;
    }
}

/// Sharing allowed to other opens while this one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ShareMode {
    /// Others may read and write
    DenyNone = 0,
    /// Others may only read
    DenyWrite = 1,
    /// Others may only write
    DenyRead = 2,
    /// Exclusive
    DenyAll = 3,
}

impl ShareMode {
    fn from_u16(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Self::DenyNone),
            1 => Ok(Self::DenyWrite),
            2 => Ok(Self::DenyRead),
            3 => Ok(Self::DenyAll),
            other => Err(ProtocolError::InvalidField { field: "share mode", reason: other.to_string() }),
        }
    }
}

/// What to do when the file does or does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum OpenOption {
    /// Fail if the file does not exist
    OpenExisting = 0x0001,
    /// Fail if the file exists
    CreateNew = 0x0002,
    /// Create the file, truncating it if it exists
    CreateOrReplace = 0x0008,
}

impl OpenOption {
    fn from_u16(value: u16) -> Result<Self> {
        match value {
            0x0001 => Ok(Self::OpenExisting),
            0x0002 => Ok(Self::CreateNew),
            0x0008 => Ok(Self::CreateOrReplace),
            other => {
                Err(ProtocolError::InvalidField { field: "open option", reason: format!("0x{other:04X}") })
            },
        }
    }
}

/// Open a stream file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    /// Absolute path
    pub name: String,
    /// Access
    pub access: AccessMode,
    /// Sharing
    pub share: ShareMode,
    /// Existence handling
    pub option: OpenOption,
    /// CCSID to tag a newly created file with
    pub create_ccsid: u16,
}

impl Request for OpenRequest {
    fn server(&self) -> ServerId {
        ServerId::File
    }

    fn request_id(&self) -> u16 {
        id::OPEN
    }

    fn reply_ids(&self) -> &'static [u16] {
        &[id::OPEN_REPLY, id::RETURN_CODE]
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        write_name_template(w);
        w.u16(self.access.bits()).u16(self.share as u16).u16(self.option as u16).u16(self.create_ccsid);
        Ok(())
    }

    fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
        w.item(cp::NAME, &encode_name(&self.name)?)?;
        Ok(())
    }
}

impl OpenRequest {
    /// Decode on the server side.
    pub fn parse(ds: &DataStream) -> Result<Self> {
        let mut r = ds.template_reader();
        r.skip(6)?;
        Ok(Self {
            access: AccessMode::from_bits_truncate(r.u16()?),
            share: ShareMode::from_u16(r.u16()?)?,
            option: OpenOption::from_u16(r.u16()?)?,
            create_ccsid: r.u16()?,
            name: parse_name(ds, cp::NAME)?,
        })
    }
}

/// Reply to [`OpenRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenReply {
    /// Handle for subsequent reads, writes and close
    pub handle: u32,
    /// CCSID the file is tagged with
    pub data_ccsid: u16,
    /// Current size in bytes
    pub size: u64,
    /// Last modification, seconds since the Unix epoch
    pub modified: u64,
}

impl Reply for OpenReply {
    const REPLY_ID: u16 = id::OPEN_REPLY;

    fn parse(ds: &DataStream) -> Result<Self> {
        let mut r = ds.template_reader();
        r.skip(2)?;
        Ok(Self { handle: r.u32()?, data_ccsid: r.u16()?, size: r.u64()?, modified: r.u64()? })
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u16(0).u32(self.handle).u16(self.data_ccsid).u64(self.size).u64(self.modified);
        Ok(())
    }
}

/// Read a block from an open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    /// Open handle
    pub handle: u32,
    /// Byte offset
    pub offset: u64,
    /// Bytes wanted
    pub length: u32,
}

impl Request for ReadRequest {
    fn server(&self) -> ServerId {
        ServerId::File
    }

    fn request_id(&self) -> u16 {
        id::READ
    }

    fn reply_ids(&self) -> &'static [u16] {
        &[id::READ_REPLY, id::RETURN_CODE]
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u32(self.handle).u64(self.offset).u32(self.length);
        Ok(())
    }
}

impl ReadRequest {
    /// Decode on the server side.
    pub fn parse(ds: &DataStream) -> Result<Self> {
        let mut r = ds.template_reader();
        Ok(Self { handle: r.u32()?, offset: r.u64()?, length: r.u32()? })
    }
}

/// Reply to [`ReadRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReply {
    /// CCSID of the data
    pub data_ccsid: u16,
    /// Bytes read; shorter than requested at end of file
    pub data: Bytes,
}

impl Reply for ReadReply {
    const REPLY_ID: u16 = id::READ_REPLY;

    fn parse(ds: &DataStream) -> Result<Self> {
        let mut r = ds.template_reader();
        r.skip(2)?;
        let data_ccsid = r.u16()?;
        let data = ds.optional_section()?.require(cp::DATA)?.payload.clone();
        Ok(Self { data_ccsid, data })
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u16(0).u16(self.data_ccsid);
        Ok(())
    }

    fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
        w.item(cp::DATA, &self.data)?;
        Ok(())
    }
}

/// Write a block to an open file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    /// Open handle
    pub handle: u32,
    /// Byte offset
    pub offset: u64,
    /// Force the data to storage before replying
    pub sync: bool,
    /// Data
    pub data: Bytes,
}

impl Request for WriteRequest {
    fn server(&self) -> ServerId {
        ServerId::File
    }

    fn request_id(&self) -> u16 {
        id::WRITE
    }

    fn reply_ids(&self) -> &'static [u16] {
        &[id::WRITE_REPLY, id::RETURN_CODE]
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u32(self.handle).u64(self.offset).u16(u16::from(self.sync));
        Ok(())
    }

    fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
        w.item(cp::DATA, &self.data)?;
        Ok(())
    }
}

impl WriteRequest {
    /// Decode on the server side.
    pub fn parse(ds: &DataStream) -> Result<Self> {
        let mut r = ds.template_reader();
        let (handle, offset, sync) = (r.u32()?, r.u64()?, r.u16()? != 0);
        let data = ds.optional_section()?.require(cp::DATA)?.payload.clone();
        Ok(Self { handle, offset, sync, data })
    }
}

/// Reply to [`WriteRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReply {
    /// Return code
    pub return_code: u16,
    /// Bytes the server accepted
    pub bytes_written: u32,
}

impl Reply for WriteReply {
    const REPLY_ID: u16 = id::WRITE_REPLY;

    fn parse(ds: &DataStream) -> Result<Self> {
        let mut r = ds.template_reader();
        r.skip(2)?;
        Ok(Self { return_code: r.u16()?, bytes_written: r.u32()? })
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u16(0).u16(self.return_code).u32(self.bytes_written);
        Ok(())
    }
}

/// Close an open handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseRequest {
    /// Open handle
    pub handle: u32,
    /// Force data to storage before closing
    pub sync: bool,
}

impl Request for CloseRequest {
    fn server(&self) -> ServerId {
        ServerId::File
    }

    fn request_id(&self) -> u16 {
        id::CLOSE
    }

    fn reply_ids(&self) -> &'static [u16] {
        &[id::RETURN_CODE]
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u32(self.handle).u16(u16::from(self.sync));
        Ok(())
    }
}

impl CloseRequest {
    /// Decode on the server side.
    pub fn parse(ds: &DataStream) -> Result<Self> {
        let mut r = ds.template_reader();
        Ok(Self { handle: r.u32()?, sync: r.u16()? != 0 })
    }
}

/// Kind of directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ObjectType {
    /// Stream file
    File = 1,
    /// Directory
    Directory = 2,
    /// Symbolic link
    Symlink = 3,
}

impl ObjectType {
    fn from_u16(value: u16) -> Result<Self> {
        match value {
            1 => Ok(Self::File),
            2 => Ok(Self::Directory),
            3 => Ok(Self::Symlink),
            other => Err(ProtocolError::InvalidField { field: "object type", reason: other.to_string() }),
        }
    }
}

/// List the entries matching a path pattern. The last path component may
/// contain `*` wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListAttributesRequest {
    /// Path or pattern
    pub pattern: String,
    /// Upper bound on entries, 0 for no limit
    pub max_entries: u16,
}

impl Request for ListAttributesRequest {
    fn server(&self) -> ServerId {
        ServerId::File
    }

    fn request_id(&self) -> u16 {
        id::LIST_ATTRIBUTES
    }

    fn reply_ids(&self) -> &'static [u16] {
        &[id::LIST_ENTRY_REPLY, id::RETURN_CODE]
    }

    fn reply_mode(&self) -> ReplyMode {
        ReplyMode::Chained
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        write_name_template(w);
        w.u16(self.max_entries);
        Ok(())
    }

    fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
        w.item(cp::NAME, &encode_name(&self.pattern)?)?;
        Ok(())
    }
}

impl ListAttributesRequest {
    /// Decode on the server side.
    pub fn parse(ds: &DataStream) -> Result<Self> {
        let mut r = ds.template_reader();
        r.skip(6)?;
        Ok(Self { max_entries: r.u16()?, pattern: parse_name(ds, cp::NAME)? })
    }
}

/// Attributes of one directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Entry name (last path component)
    pub name: String,
    /// Kind of entry
    pub object_type: ObjectType,
    /// Size in bytes
    pub size: u64,
    /// Creation time, seconds since the Unix epoch
    pub created: u64,
    /// Modification time, seconds since the Unix epoch
    pub modified: u64,
    /// Fixed attribute bits (read-only, hidden, ...)
    pub attributes: u32,
}

impl FileEntry {
    /// True for directories.
    pub fn is_directory(&self) -> bool {
        self.object_type == ObjectType::Directory
    }
}

/// One entry of a listing. `chain` is 1 while more entries follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntryReply {
    /// Chain indicator
    pub chain: u16,
    /// Entry
    pub entry: FileEntry,
}

impl Reply for ListEntryReply {
    const REPLY_ID: u16 = id::LIST_ENTRY_REPLY;

    fn parse(ds: &DataStream) -> Result<Self> {
        let mut r = ds.template_reader();
        let chain = r.u16()?;
        let (created, modified, size, attributes) = (r.u64()?, r.u64()?, r.u64()?, r.u32()?);
        let object_type = ObjectType::from_u16(r.u16()?)?;
        let name = decode_name(&ds.optional_section()?.require(cp::NAME)?.payload)?;
        Ok(Self { chain, entry: FileEntry { name, object_type, size, created, modified, attributes } })
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        let e = &self.entry;
        w.u16(self.chain)
            .u64(e.created)
            .u64(e.modified)
            .u64(e.size)
            .u32(e.attributes)
            .u16(e.object_type as u16);
        Ok(())
    }

    fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
        w.item(cp::NAME, &encode_name(&self.entry.name)?)?;
        Ok(())
    }
}

/// Collect the entries of a chained listing reply set.
///
/// The set ends with a [`ReturnCodeReply`] carrying "no more files"; any
/// other non-zero return code fails the whole listing.
pub fn collect_listing(replies: &[DataStream]) -> ReplyResult<Vec<FileEntry>> {
    let mut entries = Vec::with_capacity(replies.len());
    for ds in replies {
        if ds.request_id() == id::RETURN_CODE {
            let reply = ReturnCodeReply::parse(ds)?;
            if reply.return_code != rc::NO_MORE_FILES {
                check(reply.return_code)?;
            }
            continue;
        }
        entries.push(ds.parse_reply::<ListEntryReply>()?.entry);
    }
    Ok(entries)
}

macro_rules! name_request {
    ($(#[$doc:meta])* $name:ident, $id:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            /// Absolute path
            pub name: String,
        }

        impl Request for $name {
            fn server(&self) -> ServerId {
                ServerId::File
            }

            fn request_id(&self) -> u16 {
                $id
            }

            fn reply_ids(&self) -> &'static [u16] {
                &[id::RETURN_CODE]
            }

            fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
                write_name_template(w);
                Ok(())
            }

            fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
                w.item(cp::NAME, &encode_name(&self.name)?)?;
                Ok(())
            }
        }

        impl $name {
            /// Decode on the server side.
            pub fn parse(ds: &DataStream) -> Result<Self> {
                Ok(Self { name: parse_name(ds, cp::NAME)? })
            }
        }
    };
}

name_request!(
    /// Delete a stream file.
    DeleteFileRequest,
    id::DELETE_FILE
);
name_request!(
    /// Create a directory.
    CreateDirectoryRequest,
    id::CREATE_DIRECTORY
);
name_request!(
    /// Delete an empty directory.
    DeleteDirectoryRequest,
    id::DELETE_DIRECTORY
);

/// Rename a file or directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRequest {
    /// Current path
    pub source: String,
    /// New path
    pub target: String,
    /// Replace an existing target
    pub replace: bool,
}

impl Request for RenameRequest {
    fn server(&self) -> ServerId {
        ServerId::File
    }

    fn request_id(&self) -> u16 {
        id::RENAME
    }

    fn reply_ids(&self) -> &'static [u16] {
        &[id::RETURN_CODE]
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        write_name_template(w);
        w.u16(u16::from(self.replace));
        Ok(())
    }

    fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
        w.item(cp::SOURCE_NAME, &encode_name(&self.source)?)?
            .item(cp::TARGET_NAME, &encode_name(&self.target)?)?;
        Ok(())
    }
}

impl RenameRequest {
    /// Decode on the server side.
    pub fn parse(ds: &DataStream) -> Result<Self> {
        let mut r = ds.template_reader();
        r.skip(6)?;
        Ok(Self {
            replace: r.u16()? != 0,
            source: parse_name(ds, cp::SOURCE_NAME)?,
            target: parse_name(ds, cp::TARGET_NAME)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;
    use crate::retcode::ReplyError;

    fn entry(name: &str, chain: u16) -> DataStream {
        let reply = ListEntryReply {
            chain,
            entry: FileEntry {
                name: name.into(),
                object_type: ObjectType::File,
                size: 10,
                created: 1,
                modified: 2,
                attributes: 0,
            },
        };
        DataStream::from_reply(ServerId::File, &reply).unwrap()
    }

    fn return_code(rc: u16) -> DataStream {
        DataStream::from_reply(ServerId::File, &ReturnCodeReply::new(rc)).unwrap()
    }

    #[test]
    fn open_request_wire_form() {
        let request = OpenRequest {
            name: "/a".into(),
            access: AccessMode::READ,
            share: ShareMode::DenyWrite,
            option: OpenOption::OpenExisting,
            create_ccsid: 0,
        };
        let ds = DataStream::from_request(&request).unwrap();
        insta::assert_snapshot!(
            hex::encode(ds.encode()),
            @"0000002c0000e0020000000000000000000e000204b00000000100010001000100000000000a0002002f0061"
        );
        assert_eq!(OpenRequest::parse(&ds).unwrap(), request);
    }

    #[test]
    fn names_are_utf16() {
        let ds = DataStream::from_request(&DeleteFileRequest { name: "/é".into() }).unwrap();
        assert_eq!(&ds.optional_bytes()[..], &hex!("0000000A 0002 002F 00E9")[..]);
    }

    #[test]
    fn listing_ends_at_no_more_files() {
        let replies = [entry("a.txt", 1), entry("b.txt", 1), return_code(rc::NO_MORE_FILES)];
        assert!(replies[0].chain_indicator() == Some(1));
        let entries = collect_listing(&replies).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a.txt", "b.txt"]);
    }

    #[test]
    fn listing_of_missing_path_fails() {
        let err = collect_listing(&[return_code(rc::PATH_NOT_FOUND)]).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::PathNotFound));
    }

    #[test]
    fn expect_converts_return_code_reply() {
        let err = expect::<OpenReply>(&return_code(rc::FILE_NOT_FOUND)).unwrap_err();
        assert!(matches!(err, ReplyError::Host(HostError { kind: ErrorKind::ObjectNotFound, .. })));
        assert!(expect_success(&return_code(rc::SUCCESS)).is_ok());
        assert_eq!(
            expect_success(&return_code(rc::DIRECTORY_NOT_EMPTY)).unwrap_err().kind(),
            Some(ErrorKind::NotEmpty)
        );
    }

    #[test]
    fn rename_uses_source_and_target_code_points() {
        let request = RenameRequest { source: "/a".into(), target: "/b".into(), replace: false };
        let ds = DataStream::from_request(&request).unwrap();
        let section = ds.optional_section().unwrap();
        assert!(section.find(cp::SOURCE_NAME).is_some());
        assert!(section.find(cp::TARGET_NAME).is_some());
        assert_eq!(RenameRequest::parse(&ds).unwrap(), request);
    }

    #[test]
    fn every_return_code_is_classified() {
        for code in 1..=20 {
            assert!(classify(code).is_some(), "rc {code}");
        }
        assert_eq!(classify(rc::SUCCESS), None);
        assert_eq!(classify(999), Some(ErrorKind::ServerError));
    }
}
