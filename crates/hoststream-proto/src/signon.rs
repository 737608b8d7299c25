//! Signon server messages and the start-server exchange shared by every
//! service server.
//!
//! The signon server (0xE009) authenticates inline: exchange attributes to
//! learn the server seed and password level, then send signon info with the
//! password substitute. Every other server first exchanges seeds and then
//! receives a start-server request carrying the substitute.

use crate::{
    errors::{ProtocolError, Result},
    frame::{DataStream, Reply, Request},
    optional::{OptionalSection, OptionalWriter},
    retcode::{ErrorKind, HostError, SecurityFailure},
    server::ServerId,
    template::TemplateWriter,
    text::TextCodec,
};

/// Request ids.
pub mod id {
    /// Signon exchange attributes
    pub const EXCHANGE_ATTRIBUTES: u16 = 0x7003;
    /// Signon exchange attributes reply
    pub const EXCHANGE_ATTRIBUTES_REPLY: u16 = 0xF003;
    /// Signon info
    pub const SIGNON_INFO: u16 = 0x7004;
    /// Signon info reply
    pub const SIGNON_INFO_REPLY: u16 = 0xF004;
    /// Exchange random seeds (service servers)
    pub const EXCHANGE_SEEDS: u16 = 0x7001;
    /// Exchange random seeds reply
    pub const EXCHANGE_SEEDS_REPLY: u16 = 0xF001;
    /// Start server (service servers)
    pub const START_SERVER: u16 = 0x7002;
    /// Start server reply
    pub const START_SERVER_REPLY: u16 = 0xF002;
}

/// Optional-section code points.
pub mod cp {
    /// Client or server version (u32)
    pub const VERSION: u16 = 0x1101;
    /// Datastream level (u16)
    pub const DATASTREAM_LEVEL: u16 = 0x1102;
    /// Client or server seed (8 bytes)
    pub const SEED: u16 = 0x1103;
    /// Client CCSID in signon info; user id in start server
    pub const CCSID_OR_USER: u16 = 0x1104;
    /// Password substitute
    pub const PASSWORD: u16 = 0x1105;
    /// User id (signon info request) or current signon date (reply)
    pub const USER_ID: u16 = 0x1106;
    /// Last signon date
    pub const LAST_SIGNON: u16 = 0x1107;
    /// Password expiration date
    pub const EXPIRATION: u16 = 0x1108;
    /// Invalid signon attempts (u16)
    pub const INVALID_ATTEMPTS: u16 = 0x1109;
    /// Server CCSID (u32)
    pub const SERVER_CCSID: u16 = 0x1114;
    /// Password level (u8)
    pub const PASSWORD_LEVEL: u16 = 0x1119;
    /// Job name (EBCDIC)
    pub const JOB_NAME: u16 = 0x111F;
    /// Return error messages flag (u8)
    pub const RETURN_MESSAGES: u16 = 0x1128;
    /// Password expiration warning days (u32)
    pub const EXPIRATION_WARNING: u16 = 0x112C;
}

/// Return codes.
pub mod rc {
    /// Success
    pub const OK: u32 = 0;
    /// Request data error
    pub const REQUEST_DATA_ERROR: u32 = 0x0001_0001;
    /// User id unknown
    pub const USER_ID_UNKNOWN: u32 = 0x0002_0001;
    /// User id disabled
    pub const USER_ID_DISABLED: u32 = 0x0002_0002;
    /// User id does not match the authenticated user
    pub const USER_ID_MISMATCH: u32 = 0x0002_0003;
    /// Password incorrect
    pub const PASSWORD_INCORRECT: u32 = 0x0003_000B;
    /// Password incorrect, profile will be disabled on the next failure
    pub const PASSWORD_INCORRECT_DISABLING: u32 = 0x0003_000C;
    /// Password expired
    pub const PASSWORD_EXPIRED: u32 = 0x0003_000D;
    /// Password missing
    pub const PASSWORD_MISSING: u32 = 0x0003_0010;
}

/// Width of a user id field.
pub const USER_ID_LEN: usize = 10;

/// Length of a seed.
pub const SEED_LEN: usize = 8;

/// Random seed exchanged with the server.
pub type Seed = [u8; SEED_LEN];

/// Password encryption announced in signon info and start server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PasswordType {
    /// DES substitute (password levels 0 and 1)
    Des = 0x01,
    /// SHA-1 substitute (password levels 2 and above)
    Sha1 = 0x03,
}

impl PasswordType {
    fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::Des),
            0x03 => Ok(Self::Sha1),
            other => Err(ProtocolError::InvalidField {
                field: "password type",
                reason: format!("0x{other:02X}"),
            }),
        }
    }
}

/// Classify a signon return code. `None` means success.
pub fn classify(return_code: u32) -> Option<ErrorKind> {
    let kind = match return_code {
        rc::OK => return None,
        rc::REQUEST_DATA_ERROR => ErrorKind::InvalidRequest,
        rc::USER_ID_UNKNOWN => ErrorKind::Security(SecurityFailure::UserIdUnknown),
        rc::USER_ID_DISABLED => ErrorKind::Security(SecurityFailure::UserIdDisabled),
        rc::PASSWORD_INCORRECT | rc::PASSWORD_INCORRECT_DISABLING => {
            ErrorKind::Security(SecurityFailure::PasswordIncorrect)
        },
        rc::PASSWORD_EXPIRED => ErrorKind::Security(SecurityFailure::PasswordExpired),
        rc::PASSWORD_MISSING => ErrorKind::Security(SecurityFailure::PasswordMissing),
        code if (0x0002..=0x0004).contains(&(code >> 16)) => {
            ErrorKind::Security(SecurityFailure::Other)
        },
        _ => ErrorKind::ServerError,
    };
    Some(kind)
}

/// Turn a non-zero return code into a [`HostError`].
pub fn check(server: ServerId, return_code: u32) -> std::result::Result<(), HostError> {
    match classify(return_code) {
        None => Ok(()),
        Some(kind) => Err(HostError::new(server, return_code, kind)),
    }
}

/// Encode a user id: upper case, CCSID 37, blank padded to 10 bytes.
pub fn encode_user_id(user: &str) -> Result<Vec<u8>> {
    TextCodec::ebcdic().encode_padded(&user.to_uppercase(), USER_ID_LEN)
}

fn decode_ebcdic(bytes: &[u8]) -> Result<String> {
    TextCodec::ebcdic().decode_trimmed(bytes)
}

fn seed_from(bytes: &[u8]) -> Result<Seed> {
    bytes.try_into().map_err(|_| ProtocolError::InvalidField {
        field: "seed",
        reason: format!("{} bytes, expected {SEED_LEN}", bytes.len()),
    })
}

/// Host date/time as carried in signon replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HostTimestamp {
    /// Year
    pub year: u16,
    /// Month, 1-12
    pub month: u8,
    /// Day, 1-31
    pub day: u8,
    /// Hour, 0-23
    pub hour: u8,
    /// Minute
    pub minute: u8,
    /// Second
    pub second: u8,
}

impl HostTimestamp {
    /// Encoded size.
    pub const LEN: usize = 8;

    /// Parse the 8-byte wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let [y0, y1, month, day, hour, minute, second, _] = <[u8; 8]>::try_from(bytes)
            .map_err(|_| ProtocolError::InvalidField {
                field: "timestamp",
                reason: format!("{} bytes, expected 8", bytes.len()),
            })?;
        Ok(Self { year: u16::from_be_bytes([y0, y1]), month, day, hour, minute, second })
    }

    /// Wire form.
    pub fn to_bytes(self) -> [u8; 8] {
        let [y0, y1] = self.year.to_be_bytes();
        [y0, y1, self.month, self.day, self.hour, self.minute, self.second, 0]
    }
}

/// Signon-server attribute exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeAttributesRequest {
    /// Client version
    pub client_version: u32,
    /// Datastream level the client speaks
    pub datastream_level: u16,
    /// Client seed
    pub client_seed: Seed,
}

impl Request for ExchangeAttributesRequest {
    fn server(&self) -> ServerId {
        ServerId::Signon
    }

    fn request_id(&self) -> u16 {
        id::EXCHANGE_ATTRIBUTES
    }

    fn reply_ids(&self) -> &'static [u16] {
        &[id::EXCHANGE_ATTRIBUTES_REPLY]
    }

    fn write_template(&self, _w: &mut TemplateWriter) -> Result<()> {
        Ok(())
    }

    fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
        w.u32(cp::VERSION, self.client_version)?
            .u16(cp::DATASTREAM_LEVEL, self.datastream_level)?
            .item(cp::SEED, &self.client_seed)?;
        Ok(())
    }
}

impl ExchangeAttributesRequest {
    /// Decode on the server side.
    pub fn parse(ds: &DataStream) -> Result<Self> {
        let section = ds.optional_section()?;
        Ok(Self {
            client_version: section.require(cp::VERSION)?.as_u32()?,
            datastream_level: section.require(cp::DATASTREAM_LEVEL)?.as_u16()?,
            client_seed: seed_from(&section.require(cp::SEED)?.payload)?,
        })
    }
}

/// Reply to [`ExchangeAttributesRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExchangeAttributesReply {
    /// Return code
    pub return_code: u32,
    /// Server version
    pub server_version: u32,
    /// Server datastream level
    pub server_level: u16,
    /// Server seed
    pub server_seed: Option<Seed>,
    /// Password level (QPWDLVL)
    pub password_level: u8,
    /// Server job name
    pub job_name: Option<String>,
}

impl Reply for ExchangeAttributesReply {
    const REPLY_ID: u16 = id::EXCHANGE_ATTRIBUTES_REPLY;

    fn parse(ds: &DataStream) -> Result<Self> {
        let return_code = ds.template_reader().u32()?;
        let section = ds.optional_section()?;
        let mut reply = Self { return_code, ..Self::default() };
        if return_code != rc::OK {
            return Ok(reply);
        }
        reply.server_version = section.require(cp::VERSION)?.as_u32()?;
        reply.server_level = section.require(cp::DATASTREAM_LEVEL)?.as_u16()?;
        reply.server_seed = section.find(cp::SEED).map(|i| seed_from(&i.payload)).transpose()?;
        reply.password_level = section.find(cp::PASSWORD_LEVEL).map(|i| i.as_u8()).transpose()?.unwrap_or(0);
        reply.job_name = section.find(cp::JOB_NAME).map(|i| decode_ebcdic(&i.payload)).transpose()?;
        Ok(reply)
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u32(self.return_code);
        Ok(())
    }

    fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
        if self.return_code != rc::OK {
            return Ok(());
        }
        w.u32(cp::VERSION, self.server_version)?.u16(cp::DATASTREAM_LEVEL, self.server_level)?;
        if let Some(seed) = &self.server_seed {
            w.item(cp::SEED, seed)?;
        }
        w.u8(cp::PASSWORD_LEVEL, self.password_level)?;
        if let Some(job) = &self.job_name {
            w.item(cp::JOB_NAME, &TextCodec::ebcdic().encode(job)?)?;
        }
        Ok(())
    }
}

/// Authenticate on the signon server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignonInfoRequest {
    /// Substitute algorithm
    pub password_type: PasswordType,
    /// CCSID the client wants messages in
    pub client_ccsid: u32,
    /// User profile
    pub user_id: String,
    /// Password substitute
    pub substitute: Vec<u8>,
    /// Ask the server to return message text on failure
    pub return_messages: bool,
}

impl Request for SignonInfoRequest {
    fn server(&self) -> ServerId {
        ServerId::Signon
    }

    fn request_id(&self) -> u16 {
        id::SIGNON_INFO
    }

    fn reply_ids(&self) -> &'static [u16] {
        &[id::SIGNON_INFO_REPLY]
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u8(self.password_type as u8);
        Ok(())
    }

    fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
        w.u32(cp::CCSID_OR_USER, self.client_ccsid)?
            .item(cp::PASSWORD, &self.substitute)?
            .item(cp::USER_ID, &encode_user_id(&self.user_id)?)?
            .u8(cp::RETURN_MESSAGES, u8::from(self.return_messages))?;
        Ok(())
    }
}

impl SignonInfoRequest {
    /// Decode on the server side.
    pub fn parse(ds: &DataStream) -> Result<Self> {
        let password_type = PasswordType::from_u8(ds.template_reader().u8()?)?;
        let section = ds.optional_section()?;
        Ok(Self {
            password_type,
            client_ccsid: section.require(cp::CCSID_OR_USER)?.as_u32()?,
            user_id: decode_ebcdic(&section.require(cp::USER_ID)?.payload)?,
            substitute: section.require(cp::PASSWORD)?.payload.to_vec(),
            return_messages: section.find(cp::RETURN_MESSAGES).map(|i| i.as_u8()).transpose()? == Some(1),
        })
    }
}

/// Reply to [`SignonInfoRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignonInfoReply {
    /// Return code
    pub return_code: u32,
    /// Time of this signon
    pub current_signon: Option<HostTimestamp>,
    /// Time of the previous signon
    pub last_signon: Option<HostTimestamp>,
    /// When the password expires
    pub password_expiration: Option<HostTimestamp>,
    /// Invalid signon attempts since the last success
    pub invalid_attempts: Option<u16>,
    /// Server CCSID
    pub server_ccsid: Option<u32>,
    /// Days before expiration at which the host starts warning
    pub expiration_warning_days: Option<u32>,
}

fn timestamp(section: &OptionalSection, code_point: u16) -> Result<Option<HostTimestamp>> {
    section.find(code_point).map(|i| HostTimestamp::from_bytes(&i.payload)).transpose()
}

impl Reply for SignonInfoReply {
    const REPLY_ID: u16 = id::SIGNON_INFO_REPLY;

    fn parse(ds: &DataStream) -> Result<Self> {
        let return_code = ds.template_reader().u32()?;
        let section = ds.optional_section()?;
        Ok(Self {
            return_code,
            current_signon: timestamp(&section, cp::USER_ID)?,
            last_signon: timestamp(&section, cp::LAST_SIGNON)?,
            password_expiration: timestamp(&section, cp::EXPIRATION)?,
            invalid_attempts: section.find(cp::INVALID_ATTEMPTS).map(|i| i.as_u16()).transpose()?,
            server_ccsid: section.find(cp::SERVER_CCSID).map(|i| i.as_u32()).transpose()?,
            expiration_warning_days: section
                .find(cp::EXPIRATION_WARNING)
                .map(|i| i.as_u32())
                .transpose()?,
        })
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u32(self.return_code);
        Ok(())
    }

    fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
        for (code_point, stamp) in [
            (cp::USER_ID, self.current_signon),
            (cp::LAST_SIGNON, self.last_signon),
            (cp::EXPIRATION, self.password_expiration),
        ] {
            if let Some(stamp) = stamp {
                w.item(code_point, &stamp.to_bytes())?;
            }
        }
        if let Some(attempts) = self.invalid_attempts {
            w.u16(cp::INVALID_ATTEMPTS, attempts)?;
        }
        if let Some(ccsid) = self.server_ccsid {
            w.u32(cp::SERVER_CCSID, ccsid)?;
        }
        if let Some(days) = self.expiration_warning_days {
            w.u32(cp::EXPIRATION_WARNING, days)?;
        }
        Ok(())
    }
}

/// Seed exchange with a service server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSeedsRequest {
    /// Target server
    pub server: ServerId,
    /// Client seed
    pub client_seed: Seed,
}

impl Request for ExchangeSeedsRequest {
    fn server(&self) -> ServerId {
        self.server
    }

    fn request_id(&self) -> u16 {
        id::EXCHANGE_SEEDS
    }

    fn reply_ids(&self) -> &'static [u16] {
        &[id::EXCHANGE_SEEDS_REPLY]
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.bytes(&self.client_seed);
        Ok(())
    }
}

impl ExchangeSeedsRequest {
    /// Decode on the server side.
    pub fn parse(ds: &DataStream) -> Result<Self> {
        Ok(Self { server: ds.server(), client_seed: ds.template_reader().fixed()? })
    }
}

/// Reply to [`ExchangeSeedsRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSeedsReply {
    /// Return code
    pub return_code: u32,
    /// Server seed
    pub server_seed: Seed,
}

impl Reply for ExchangeSeedsReply {
    const REPLY_ID: u16 = id::EXCHANGE_SEEDS_REPLY;

    fn parse(ds: &DataStream) -> Result<Self> {
        let mut r = ds.template_reader();
        let return_code = r.u32()?;
        let server_seed = if return_code == rc::OK { r.fixed()? } else { [0; SEED_LEN] };
        Ok(Self { return_code, server_seed })
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u32(self.return_code).bytes(&self.server_seed);
        Ok(())
    }
}

/// Authenticate a service-server connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartServerRequest {
    /// Target server
    pub server: ServerId,
    /// Substitute algorithm
    pub password_type: PasswordType,
    /// User profile
    pub user_id: String,
    /// Password substitute
    pub substitute: Vec<u8>,
}

impl Request for StartServerRequest {
    fn server(&self) -> ServerId {
        self.server
    }

    fn request_id(&self) -> u16 {
        id::START_SERVER
    }

    fn reply_ids(&self) -> &'static [u16] {
        &[id::START_SERVER_REPLY]
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        // Second byte asks for a reply
        w.u8(self.password_type as u8).u8(1);
        Ok(())
    }

    fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
        w.item(cp::PASSWORD, &self.substitute)?
            .item(cp::CCSID_OR_USER, &encode_user_id(&self.user_id)?)?;
        Ok(())
    }
}

impl StartServerRequest {
    /// Decode on the server side.
    pub fn parse(ds: &DataStream) -> Result<Self> {
        let password_type = PasswordType::from_u8(ds.template_reader().u8()?)?;
        let section = ds.optional_section()?;
        Ok(Self {
            server: ds.server(),
            password_type,
            user_id: decode_ebcdic(&section.require(cp::CCSID_OR_USER)?.payload)?,
            substitute: section.require(cp::PASSWORD)?.payload.to_vec(),
        })
    }
}

/// Reply to [`StartServerRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StartServerReply {
    /// Return code
    pub return_code: u32,
    /// Authenticated user id
    pub user_id: Option<String>,
    /// Server job name
    pub job_name: Option<String>,
}

impl Reply for StartServerReply {
    const REPLY_ID: u16 = id::START_SERVER_REPLY;

    fn parse(ds: &DataStream) -> Result<Self> {
        let return_code = ds.template_reader().u32()?;
        let section = ds.optional_section()?;
        Ok(Self {
            return_code,
            user_id: section.find(cp::CCSID_OR_USER).map(|i| decode_ebcdic(&i.payload)).transpose()?,
            job_name: section.find(cp::JOB_NAME).map(|i| decode_ebcdic(&i.payload)).transpose()?,
        })
    }

    fn write_template(&self, w: &mut TemplateWriter) -> Result<()> {
        w.u32(self.return_code);
        Ok(())
    }

    fn write_optional(&self, w: &mut OptionalWriter) -> Result<()> {
        if let Some(user) = &self.user_id {
            w.item(cp::CCSID_OR_USER, &encode_user_id(user)?)?;
        }
        if let Some(job) = &self.job_name {
            w.item(cp::JOB_NAME, &TextCodec::ebcdic().encode(job)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;
    use crate::header::DEFAULT_MAX_LENGTH;

    #[test]
    fn exchange_attributes_wire_form() {
        let request = ExchangeAttributesRequest {
            client_version: 1,
            datastream_level: 2,
            client_seed: hex!("0102030405060708"),
        };
        let ds = DataStream::from_request(&request).unwrap().with_correlation_id(1);
        assert_eq!(
            &ds.encode()[..],
            &hex!(
                "00000034 0000 E009 00000000 00000001 0000 7003"
                "0000000A 1101 00000001"
                "00000008 1102 0002"
                "0000000E 1103 0102030405060708"
            )[..]
        );
    }

    #[test]
    fn signon_info_request_survives_the_wire() {
        let request = SignonInfoRequest {
            password_type: PasswordType::Sha1,
            client_ccsid: 1200,
            user_id: "qsecofr".into(),
            substitute: vec![0xAA; 20],
            return_messages: true,
        };
        let ds = DataStream::from_request(&request).unwrap();
        let ds = DataStream::decode(ds.encode(), DEFAULT_MAX_LENGTH).unwrap();
        let parsed = SignonInfoRequest::parse(&ds).unwrap();
        assert_eq!(parsed.user_id, "QSECOFR");
        assert_eq!(parsed.substitute, request.substitute);
        assert!(parsed.return_messages);
    }

    #[test]
    fn failed_exchange_attributes_reply_omits_fields() {
        let reply = ExchangeAttributesReply { return_code: rc::REQUEST_DATA_ERROR, ..Default::default() };
        let ds = DataStream::from_reply(ServerId::Signon, &reply).unwrap();
        assert_eq!(ds.parse_reply::<ExchangeAttributesReply>().unwrap(), reply);
    }

    #[test]
    fn exchange_attributes_reply_reads_password_level() {
        let reply = ExchangeAttributesReply {
            return_code: 0,
            server_version: 0x0007_0500,
            server_level: 10,
            server_seed: Some([9; 8]),
            password_level: 3,
            job_name: Some("123456/QUSER/QZSOSIGN".into()),
        };
        let ds = DataStream::from_reply(ServerId::Signon, &reply).unwrap();
        assert_eq!(ds.parse_reply::<ExchangeAttributesReply>().unwrap(), reply);
    }

    #[test]
    fn timestamps_use_big_endian_year() {
        let stamp = HostTimestamp::from_bytes(&hex!("07E9 0C 1F 17 3B 3A 00")).unwrap();
        assert_eq!(
            stamp,
            HostTimestamp { year: 2025, month: 12, day: 31, hour: 23, minute: 59, second: 58 }
        );
        assert!(HostTimestamp::from_bytes(&[0; 7]).is_err());
    }

    #[test]
    fn return_code_classification() {
        assert_eq!(classify(rc::OK), None);
        assert_eq!(
            classify(rc::USER_ID_UNKNOWN),
            Some(ErrorKind::Security(SecurityFailure::UserIdUnknown))
        );
        assert_eq!(
            classify(rc::PASSWORD_INCORRECT_DISABLING),
            Some(ErrorKind::Security(SecurityFailure::PasswordIncorrect))
        );
        assert_eq!(classify(0x0004_0001), Some(ErrorKind::Security(SecurityFailure::Other)));
        assert_eq!(classify(0x0008_0000), Some(ErrorKind::ServerError));
        assert_eq!(
            check(ServerId::Signon, rc::PASSWORD_EXPIRED).unwrap_err().kind,
            ErrorKind::Security(SecurityFailure::PasswordExpired)
        );
    }

    #[test]
    fn user_id_is_upper_case_and_padded() {
        assert_eq!(encode_user_id("bob").unwrap(), hex!("C2D6C240404040404040"));
        assert!(encode_user_id("averylonguser").is_err());
    }
}
