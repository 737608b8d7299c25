//! Data queue server (0xE007) messages.
//!
//! Queue operations address a queue by name and library, each a 10-byte
//! upper-case CCSID 37 field at the start of the template. Operations that
//! only succeed or fail share the common reply 0x8002, which also reports the
//! failures of every other request.

use bytes::Bytes;

use crate::{
    errors::{ProtocolError, Result},
    frame::{DataStream, Reply, Request},
    optional::OptionalWriter,
    retcode::{ErrorKind, HostError, ReplyResult},
    server::ServerId,
    template::{TemplateReader, TemplateWriter},
    text::TextCodec,
};

/// Request and reply ids.
pub mod id {
    /// Exchange attributes
    pub const EXCHANGE_ATTRIBUTES: u16 = 0x0000;
    /// Exchange attributes reply
    pub const EXCHANGE_ATTRIBUTES_REPLY: u16 = 0x8000;
    /// Query queue attributes
    pub const QUERY_ATTRIBUTES: u16 = 0x0001;
    /// Query attributes reply
    pub const QUERY_ATTRIBUTES_REPLY: u16 = 0x8001;
    /// Read (receive or peek) an entry
    pub const READ: u16 = 0x0002;
    /// Read reply
    pub const READ_REPLY: u16 = 0x8003;
    /// Create a queue
    pub const CREATE: u16 = 0x0003;
    /// Delete a queue
    pub const DELETE: u16 = 0x0004;
    /// Write an entry
    pub const WRITE: u16 = 0x0005;
    /// Clear entries
    pub const CLEAR: u16 = 0x0006;
    /// Common reply
    pub const COMMON_REPLY: u16 = 0x8002;
}

/// Optional-section code points.
pub mod cp {
    /// Entry data
    pub const ENTRY: u16 = 0x5001;
    /// Key
    pub const KEY: u16 = 0x5002;
    /// Message text (EBCDIC)
    pub const MESSAGE: u16 = 0x5003;
}

/// Return codes.
pub mod rc {
    /// Success
    pub const OK: u16 = 0xF000;
    /// Queue not found
    pub const QUEUE_NOT_FOUND: u16 = 0xF001;
    /// Library not found
    pub const LIBRARY_NOT_FOUND: u16 = 0xF002;
    /// Queue already exists
    pub const ALREADY_EXISTS: u16 = 0xF003;
    /// Not authorized
    pub const NOT_AUTHORIZED: u16 = 0xF004;
    /// Entry longer than the queue's maximum
    pub const ENTRY_TOO_LONG: u16 = 0xF005;
    /// No entry available before the wait expired
    pub const NO_ENTRY: u16 = 0xF006;
    /// Key length does not match the queue
    pub const INVALID_KEY: u16 = 0xF007;
    /// Queue in use
    pub const IN_USE: u16 = 0xF008;
    /// Malformed request
    pub const INVALID_REQUEST: u16 = 0xF009;
}

/// Width of the queue and library name fields.
pub const NAME_LEN: usize = 10;

/// Width of the description field.
pub const DESCRIPTION_LEN: usize = 50;

/// Width of the sender information block.
pub const SENDER_INFO_LEN: usize = 36;

const EBCDIC_ZERO: u8 = 0xF0;
const EBCDIC_ONE: u8 = 0xF1;

fn ebcdic_flag(value: bool) -> u8 {
    if value { EBCDIC_ONE } else { EBCDIC_ZERO }
}

/// Classify a data-queue return code. `None` means success.
pub fn classify(return_code: u16) -> Option<ErrorKind> {
    let kind = match return_code {
        rc::OK => return None,
        rc::QUEUE_NOT_FOUND => ErrorKind::ObjectNotFound,
        rc::LIBRARY_NOT_FOUND => ErrorKind::PathNotFound,
        rc::ALREADY_EXISTS => ErrorKind::AlreadyExists,
        rc::NOT_AUTHORIZED => ErrorKind::AccessDenied,
        rc::NO_ENTRY => ErrorKind::NoData,
        rc::IN_USE => ErrorKind::InUse,
        rc::ENTRY_TOO_LONG | rc::INVALID_KEY | rc::INVALID_REQUEST => ErrorKind::InvalidRequest,
        _ => ErrorKind::ServerError,
    };
    Some(kind)
}

/// Interpret a common reply: success, or the classified failure with the
/// host's message text attached.
pub fn check(reply: &CommonReply) -> std::result::Result<(), HostError> {
    match classify(reply.return_code) {
        None => Ok(()),
        Some(kind) => {
            let err = HostError::new(ServerId::DataQueue, u32::from(reply.return_code), kind);
            Err(match &reply.message {
                Some(text) => err.with_message(text.clone()),
                None => err,
            })
        },
    }
}

/// Parse `ds` as `R`, turning a failed [`CommonReply`] into its error.
pub fn expect<R: Reply>(ds: &DataStream) -> ReplyResult<R> {
    if ds.request_id() == id::COMMON_REPLY && R::REPLY_ID != id::COMMON_REPLY {
        check(&CommonReply::parse(ds)?)?;
        return Err(ProtocolError::UnexpectedReplyId { server: ds.server(), reply_id: id::COMMON_REPLY }
            .into());
    }
    Ok(ds.parse_reply::<R>()?)
}

/// Expect a successful [`CommonReply`].
pub fn expect_success(ds: &DataStream) -> ReplyResult<()> {
    check(&ds.parse_reply::<CommonReply>()?)?;
    Ok(())
}

/// Fully qualified queue name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueName {
    /// Queue object name
    pub name: String,
    /// Library
    pub library: String,
}

impl QueueName {
    /// Queue `name` in `library`, upper-cased.
    pub fn new(name: &str, library: &str) -> Self {
        Self { name: name.to_uppercase(), library: library.to_uppercase() }
    }

    /// Parse `LIBRARY/NAME`.
    pub fn parse_qualified(path: &str) -> Result<Self> {
        match path.split_once('/') {
            Some((library, name)) if !library.is_empty() && !name.is_empty() => {
                Ok(Self::new(name, library))
            },
            _ => Err(ProtocolError::InvalidField {
                field: "queue name",
                reason: format!("{path:?} is not LIBRARY/NAME"),
            }),
        }
    }

    fn write(&self, w: &mut TemplateWriter) -> Result<()> {
        let codec = TextCodec::ebcdic();
        w.text(&codec, &self.name, NAME_LEN)?.text(&codec, &self.library, NAME_LEN)?;
        Ok(())
    }

    fn read(r: &mut TemplateReader<'_>) -> Result<Self> {
        let codec = TextCodec::ebcdic();
        Ok(Self { name: r.text(&codec, NAME_LEN)?, library: r.text(&codec, NAME_LEN)? })
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.library, self.name)
    }
}

/// Reply shared by create, delete, write and clear, and used for failures
/// of every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonReply {
    /// Return code
    pub return_code: u16,
    /// Host message text
    pub message: Option<String>,
}

impl CommonReply {
    /// Successful reply.
    pub fn ok() -> Self {
        Self { return_code: rc::OK, message: None }
    }

    /// Failed reply.
    pub fn failed(return_code: u16, message: impl Into<String>) -> Self {
        Self { return_code, message: Some(message.into()) }
    }
}

impl Reply for CommonReply {
    const REPLY_ID: u16 = id::COMMON_REPLY;

    fn parse(ds: &DataStream) -> Result<Self> {
        let return_code = ds.template_reader().u16()?;
        let message = ds
            .optional_section()?
            .find(cp::MESSAGE)
            .map(|i| TextCodec::ebcdic().decode_trimmed(&i.payload))
            .transpose()?;
        Ok(Self { return_code, message })
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u16(self.return_code);
        Ok(())
    }

    fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
        if let Some(text) = &self.message {
            w.item(cp::MESSAGE, &TextCodec::ebcdic().encode(text)?)?;
        }
        Ok(())
    }
}

/// Data-queue attribute exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeAttributesRequest {
    /// Client version
    pub client_version: u32,
}

impl Request for ExchangeAttributesRequest {
    fn server(&self) -> ServerId {
        ServerId::DataQueue
    }

    fn request_id(&self) -> u16 {
        id::EXCHANGE_ATTRIBUTES
    }

    fn reply_ids(&self) -> &'static [u16] {
        &[id::EXCHANGE_ATTRIBUTES_REPLY, id::COMMON_REPLY]
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u32(self.client_version);
        Ok(())
    }
}

impl ExchangeAttributesRequest {
    /// Decode on the server side.
    pub fn parse(ds: &DataStream) -> Result<Self> {
        Ok(Self { client_version: ds.template_reader().u32()? })
    }
}

/// Reply to [`ExchangeAttributesRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeAttributesReply {
    /// Server version
    pub server_version: u32,
}

impl Reply for ExchangeAttributesReply {
    const REPLY_ID: u16 = id::EXCHANGE_ATTRIBUTES_REPLY;

    fn parse(ds: &DataStream) -> Result<Self> {
        Ok(Self { server_version: ds.template_reader().u32()? })
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u32(self.server_version);
        Ok(())
    }
}

/// Entry ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueType {
    /// First in, first out
    #[default]
    Fifo,
    /// Last in, first out
    Lifo,
    /// Ordered by key
    Keyed,
}

impl QueueType {
    fn to_ebcdic(self) -> u8 {
        match self {
            Self::Fifo => 0xC6,  // 'F'
            Self::Lifo => 0xD3,  // 'L'
            Self::Keyed => 0xD2, // 'K'
        }
    }

    fn from_ebcdic(value: u8) -> Result<Self> {
        match value {
            0xC6 => Ok(Self::Fifo),
            0xD3 => Ok(Self::Lifo),
            0xD2 => Ok(Self::Keyed),
            other => Err(ProtocolError::InvalidField { field: "queue type", reason: format!("0x{other:02X}") }),
        }
    }
}

/// Public authority given to a new queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Authority {
    /// *ALL
    All = 0,
    /// *CHANGE
    Change = 1,
    /// *EXCLUDE
    #[default]
    Exclude = 2,
    /// *USE
    Use = 3,
    /// *LIBCRTAUT
    LibraryDefault = 4,
}

impl Authority {
    fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::All),
            1 => Ok(Self::Change),
            2 => Ok(Self::Exclude),
            3 => Ok(Self::Use),
            4 => Ok(Self::LibraryDefault),
            other => Err(ProtocolError::InvalidField { field: "authority", reason: other.to_string() }),
        }
    }
}

/// Attributes of a queue, as created or queried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueAttributes {
    /// Largest entry in bytes
    pub max_entry_length: u32,
    /// Record sender information with each entry
    pub save_sender: bool,
    /// Ordering
    pub queue_type: QueueType,
    /// Key length, 0 unless keyed
    pub key_length: u16,
    /// Force entries to auxiliary storage
    pub force_to_storage: bool,
    /// Text description
    pub description: String,
}

impl Default for QueueAttributes {
    fn default() -> Self {
        Self {
            max_entry_length: 1000,
            save_sender: false,
            queue_type: QueueType::Fifo,
            key_length: 0,
            force_to_storage: false,
            description: String::new(),
        }
    }
}

impl QueueAttributes {
    fn write(&self, w: &mut TemplateWriter, authority: Option<Authority>) -> Result<()> {
        w.u32(self.max_entry_length);
        if let Some(authority) = authority {
            w.u8(authority as u8);
        }
        w.u8(ebcdic_flag(self.save_sender))
            .u8(self.queue_type.to_ebcdic())
            .u16(self.key_length)
            .u8(ebcdic_flag(self.force_to_storage))
            .text(&TextCodec::ebcdic(), &self.description, DESCRIPTION_LEN)?;
        Ok(())
    }

    fn read(r: &mut TemplateReader<'_>, with_authority: bool) -> Result<(Self, Option<Authority>)> {
        let max_entry_length = r.u32()?;
        let authority = if with_authority { Some(Authority::from_u8(r.u8()?)?) } else { None };
        let attributes = Self {
            max_entry_length,
            save_sender: r.u8()? == EBCDIC_ONE,
            queue_type: QueueType::from_ebcdic(r.u8()?)?,
            key_length: r.u16()?,
            force_to_storage: r.u8()? == EBCDIC_ONE,
            description: r.text(&TextCodec::ebcdic(), DESCRIPTION_LEN)?,
        };
        Ok((attributes, authority))
    }
}

/// Create a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    /// Queue
    pub queue: QueueName,
    /// Attributes
    pub attributes: QueueAttributes,
    /// Public authority
    pub authority: Authority,
}

impl Request for CreateRequest {
    fn server(&self) -> ServerId {
        ServerId::DataQueue
    }

    fn request_id(&self) -> u16 {
        id::CREATE
    }

    fn reply_ids(&self) -> &'static [u16] {
        &[id::COMMON_REPLY]
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        self.queue.write(w)?;
        self.attributes.write(w, Some(self.authority))
    }
}

impl CreateRequest {
    /// Decode on the server side.
    pub fn parse(ds: &DataStream) -> Result<Self> {
        let mut r = ds.template_reader();
        let queue = QueueName::read(&mut r)?;
        let (attributes, authority) = QueueAttributes::read(&mut r, true)?;
        Ok(Self { queue, attributes, authority: authority.unwrap_or_default() })
    }
}

/// Query a queue's attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryAttributesRequest {
    /// Queue
    pub queue: QueueName,
}

impl Request for QueryAttributesRequest {
    fn server(&self) -> ServerId {
        ServerId::DataQueue
    }

    fn request_id(&self) -> u16 {
        id::QUERY_ATTRIBUTES
    }

    fn reply_ids(&self) -> &'static [u16] {
        &[id::QUERY_ATTRIBUTES_REPLY, id::COMMON_REPLY]
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        self.queue.write(w)
    }
}

impl QueryAttributesRequest {
    /// Decode on the server side.
    pub fn parse(ds: &DataStream) -> Result<Self> {
        Ok(Self { queue: QueueName::read(&mut ds.template_reader())? })
    }
}

/// Reply to [`QueryAttributesRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryAttributesReply {
    /// Attributes
    pub attributes: QueueAttributes,
}

impl Reply for QueryAttributesReply {
    const REPLY_ID: u16 = id::QUERY_ATTRIBUTES_REPLY;

    fn parse(ds: &DataStream) -> Result<Self> {
        let (attributes, _) = QueueAttributes::read(&mut ds.template_reader(), false)?;
        Ok(Self { attributes })
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        self.attributes.write(w, None)
    }
}

macro_rules! queue_only_request {
    ($(#[$doc:meta])* $name:ident, $id:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            /// Queue
            pub queue: QueueName,
        }

        impl Request for $name {
            fn server(&self) -> ServerId {
                ServerId::DataQueue
            }

            fn request_id(&self) -> u16 {
                $id
            }

            fn reply_ids(&self) -> &'static [u16] {
                &[id::COMMON_REPLY]
            }

            fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
                self.queue.write(w)
            }
        }

        impl $name {
            /// Decode on the server side.
            pub fn parse(ds: &DataStream) -> Result<Self> {
                Ok(Self { queue: QueueName::read(&mut ds.template_reader())? })
            }
        }
    };
}

queue_only_request!(
    /// Delete a queue.
    DeleteRequest,
    id::DELETE
);

/// Write an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    /// Queue
    pub queue: QueueName,
    /// Entry data
    pub entry: Bytes,
    /// Key, for keyed queues
    pub key: Option<Bytes>,
}

impl Request for WriteRequest {
    fn server(&self) -> ServerId {
        ServerId::DataQueue
    }

    fn request_id(&self) -> u16 {
        id::WRITE
    }

    fn reply_ids(&self) -> &'static [u16] {
        &[id::COMMON_REPLY]
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        self.queue.write(w)?;
        // Reply requested
        w.u8(EBCDIC_ONE);
        Ok(())
    }

    fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
        w.item(cp::ENTRY, &self.entry)?;
        if let Some(key) = &self.key {
            w.item(cp::KEY, key)?;
        }
        Ok(())
    }
}

impl WriteRequest {
    /// Decode on the server side.
    pub fn parse(ds: &DataStream) -> Result<Self> {
        let queue = QueueName::read(&mut ds.template_reader())?;
        let section = ds.optional_section()?;
        Ok(Self {
            queue,
            entry: section.require(cp::ENTRY)?.payload.clone(),
            key: section.find(cp::KEY).map(|i| i.payload.clone()),
        })
    }
}

/// Remove entries, all of them or those matching a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearRequest {
    /// Queue
    pub queue: QueueName,
    /// Only clear entries with this key
    pub key: Option<Bytes>,
}

impl Request for ClearRequest {
    fn server(&self) -> ServerId {
        ServerId::DataQueue
    }

    fn request_id(&self) -> u16 {
        id::CLEAR
    }

    fn reply_ids(&self) -> &'static [u16] {
        &[id::COMMON_REPLY]
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        self.queue.write(w)?;
        w.u8(ebcdic_flag(self.key.is_some()));
        Ok(())
    }

    fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
        if let Some(key) = &self.key {
            w.item(cp::KEY, key)?;
        }
        Ok(())
    }
}

impl ClearRequest {
    /// Decode on the server side.
    pub fn parse(ds: &DataStream) -> Result<Self> {
        let queue = QueueName::read(&mut ds.template_reader())?;
        let key = ds.optional_section()?.find(cp::KEY).map(|i| i.payload.clone());
        Ok(Self { queue, key })
    }
}

/// Key comparison for keyed reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySearch {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
}

impl KeySearch {
    /// Two EBCDIC letters on the wire.
    fn to_wire(self) -> u16 {
        match self {
            Self::Eq => 0xC5D8,
            Self::Ne => 0xD5C5,
            Self::Lt => 0xD3E3,
            Self::Le => 0xD3C5,
            Self::Gt => 0xC7E3,
            Self::Ge => 0xC7C5,
        }
    }

    fn from_wire(value: u16) -> Result<Option<Self>> {
        Ok(Some(match value {
            0 => return Ok(None),
            0xC5D8 => Self::Eq,
            0xD5C5 => Self::Ne,
            0xD3E3 => Self::Lt,
            0xD3C5 => Self::Le,
            0xC7E3 => Self::Gt,
            0xC7C5 => Self::Ge,
            other => {
                return Err(ProtocolError::InvalidField {
                    field: "key search",
                    reason: format!("0x{other:04X}"),
                });
            },
        }))
    }

    /// Whether an entry key satisfies this comparison against `wanted`.
    pub fn matches(self, entry_key: &[u8], wanted: &[u8]) -> bool {
        let ord = entry_key.cmp(wanted);
        match self {
            Self::Eq => ord.is_eq(),
            Self::Ne => ord.is_ne(),
            Self::Lt => ord.is_lt(),
            Self::Le => ord.is_le(),
            Self::Gt => ord.is_gt(),
            Self::Ge => ord.is_ge(),
        }
    }
}

/// Receive or peek an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    /// Queue
    pub queue: QueueName,
    /// Seconds to wait for an entry; negative waits forever
    pub wait_seconds: i32,
    /// Leave the entry on the queue
    pub peek: bool,
    /// Key selection for keyed queues
    pub key: Option<(KeySearch, Bytes)>,
}

impl Request for ReadRequest {
    fn server(&self) -> ServerId {
        ServerId::DataQueue
    }

    fn request_id(&self) -> u16 {
        id::READ
    }

    fn reply_ids(&self) -> &'static [u16] {
        &[id::READ_REPLY, id::COMMON_REPLY]
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        self.queue.write(w)?;
        let search = self.key.as_ref().map_or(0, |(search, _)| search.to_wire());
        w.u16(search).i32(self.wait_seconds).u8(ebcdic_flag(self.peek));
        Ok(())
    }

    fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
        if let Some((_, key)) = &self.key {
            w.item(cp::KEY, key)?;
        }
        Ok(())
    }
}

impl ReadRequest {
    /// Decode on the server side.
    pub fn parse(ds: &DataStream) -> Result<Self> {
        let mut r = ds.template_reader();
        let queue = QueueName::read(&mut r)?;
        let search = KeySearch::from_wire(r.u16()?)?;
        let wait_seconds = r.i32()?;
        let peek = r.u8()? == EBCDIC_ONE;
        let key = match search {
            Some(search) => {
                Some((search, ds.optional_section()?.require(cp::KEY)?.payload.clone()))
            },
            None => None,
        };
        Ok(Self { queue, wait_seconds, peek, key })
    }
}

/// Who wrote an entry, when the queue saves sender information.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SenderInfo {
    /// Job name
    pub job_name: String,
    /// Job user
    pub job_user: String,
    /// Job number
    pub job_number: String,
    /// Current user profile
    pub current_user: String,
}

impl SenderInfo {
    fn read(r: &mut TemplateReader<'_>) -> Result<Option<Self>> {
        let codec = TextCodec::ebcdic();
        let info = Self {
            job_name: r.text(&codec, 10)?,
            job_user: r.text(&codec, 10)?,
            job_number: r.text(&codec, 6)?,
            current_user: r.text(&codec, 10)?,
        };
        Ok((info != Self::default()).then_some(info))
    }

    fn write(info: Option<&Self>, w: &mut TemplateWriter) -> Result<()> {
        let codec = TextCodec::ebcdic();
        let blank = Self::default();
        let info = info.unwrap_or(&blank);
        w.text(&codec, &info.job_name, 10)?
            .text(&codec, &info.job_user, 10)?
            .text(&codec, &info.job_number, 6)?
            .text(&codec, &info.current_user, 10)?;
        Ok(())
    }
}

/// Reply to [`ReadRequest`] when an entry was available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReply {
    /// Sender, if saved
    pub sender: Option<SenderInfo>,
    /// Entry data
    pub entry: Bytes,
    /// Entry key, for keyed queues
    pub key: Option<Bytes>,
}

impl Reply for ReadReply {
    const REPLY_ID: u16 = id::READ_REPLY;

    fn parse(ds: &DataStream) -> Result<Self> {
        let sender = SenderInfo::read(&mut ds.template_reader())?;
        let section = ds.optional_section()?;
        Ok(Self {
            sender,
            entry: section.require(cp::ENTRY)?.payload.clone(),
            key: section.find(cp::KEY).map(|i| i.payload.clone()),
        })
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        SenderInfo::write(self.sender.as_ref(), w)
    }

    fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
        w.item(cp::ENTRY, &self.entry)?;
        if let Some(key) = &self.key {
            w.item(cp::KEY, key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn queue_name_leads_the_template() {
        let request = DeleteRequest { queue: QueueName::new("q1", "qgpl") };
        let ds = DataStream::from_request(&request).unwrap();
        assert_eq!(&ds.template()[..], &hex!("D8F1404040404040 4040 D8C7D7D3 404040404040")[..]);
        assert_eq!(DeleteRequest::parse(&ds).unwrap(), request);
    }

    #[test]
    fn create_template_layout() {
        let request = CreateRequest {
            queue: QueueName::new("Q", "L"),
            attributes: QueueAttributes {
                max_entry_length: 256,
                save_sender: true,
                queue_type: QueueType::Keyed,
                key_length: 4,
                force_to_storage: false,
                description: "T".into(),
            },
            authority: Authority::Use,
        };
        let ds = DataStream::from_request(&request).unwrap();
        assert_eq!(ds.template().len(), 20 + 4 + 1 + 1 + 1 + 2 + 1 + DESCRIPTION_LEN);
        assert_eq!(&ds.template()[20..30], &hex!("00000100 03 F1 D2 0004 F0")[..]);
        assert_eq!(CreateRequest::parse(&ds).unwrap(), request);
    }

    #[test]
    fn keyed_read_carries_search_and_key() {
        let request = ReadRequest {
            queue: QueueName::new("Q", "L"),
            wait_seconds: -1,
            peek: true,
            key: Some((KeySearch::Ge, Bytes::from_static(b"0005"))),
        };
        let ds = DataStream::from_request(&request).unwrap();
        assert_eq!(&ds.template()[20..], &hex!("C7C5 FFFFFFFF F1")[..]);
        assert_eq!(ReadRequest::parse(&ds).unwrap(), request);
    }

    #[test]
    fn failed_common_reply_carries_message() {
        let reply = CommonReply::failed(rc::QUEUE_NOT_FOUND, "Queue Q not found");
        let ds = DataStream::from_reply(ServerId::DataQueue, &reply).unwrap();
        let err = expect::<ReadReply>(&ds).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ObjectNotFound));
        assert!(err.to_string().contains("Queue Q not found"));
    }

    #[test]
    fn read_reply_without_sender() {
        let reply = ReadReply { sender: None, entry: Bytes::from_static(b"hello"), key: None };
        let ds = DataStream::from_reply(ServerId::DataQueue, &reply).unwrap();
        assert_eq!(ds.template().len(), SENDER_INFO_LEN);
        assert_eq!(expect::<ReadReply>(&ds).unwrap(), reply);
    }

    #[test]
    fn key_search_comparisons() {
        assert!(KeySearch::Ge.matches(b"0005", b"0005"));
        assert!(KeySearch::Gt.matches(b"0006", b"0005"));
        assert!(!KeySearch::Lt.matches(b"0006", b"0005"));
        assert!(KeySearch::Ne.matches(b"a", b"b"));
    }

    #[test]
    fn qualified_names() {
        assert_eq!(QueueName::parse_qualified("qgpl/q1").unwrap(), QueueName::new("Q1", "QGPL"));
        assert!(QueueName::parse_qualified("q1").is_err());
        assert_eq!(QueueName::new("q1", "qgpl").to_string(), "QGPL/Q1");
    }

    #[test]
    fn return_codes() {
        assert_eq!(classify(rc::OK), None);
        assert_eq!(classify(rc::NO_ENTRY), Some(ErrorKind::NoData));
        assert_eq!(classify(rc::LIBRARY_NOT_FOUND), Some(ErrorKind::PathNotFound));
        assert_eq!(classify(0x1234), Some(ErrorKind::ServerError));
    }
}
