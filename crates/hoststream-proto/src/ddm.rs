//! DDM objects and the security exchange (EXCSAT, ACCSEC, SECCHK).
//!
//! A DDM object is `LL u16` (including the 4-byte prefix), `CP u16`, then
//! parameters laid out the same way. This is the two-byte flavour of the
//! LL/CP section, so objects are built with [`OptionalWriter`] and read with
//! [`OptionalSection`] in [`LlWidth::Two`] mode.

use bytes::Bytes;

use crate::{
    errors::{ProtocolError, Result},
    optional::{CodePointItem, LlWidth, OptionalSection, OptionalWriter},
    retcode::{ErrorKind, HostError, SecurityFailure},
    server::ServerId,
    text::TextCodec,
};

/// Code points.
pub mod cp {
    /// Exchange server attributes
    pub const EXCSAT: u16 = 0x1041;
    /// Access security
    pub const ACCSEC: u16 = 0x106D;
    /// Security check
    pub const SECCHK: u16 = 0x106E;
    /// EXCSAT reply data
    pub const EXCSATRD: u16 = 0x1443;
    /// ACCSEC reply data
    pub const ACCSECRD: u16 = 0x14AC;
    /// SECCHK reply message
    pub const SECCHKRM: u16 = 0x1219;
    /// External name
    pub const EXTNAM: u16 = 0x115E;
    /// Manager level list
    pub const MGRLVLLS: u16 = 0x1404;
    /// Server class name
    pub const SRVCLSNM: u16 = 0x1147;
    /// Server name
    pub const SRVNAM: u16 = 0x116D;
    /// Server product release level
    pub const SRVRLSLV: u16 = 0x115A;
    /// Security mechanism
    pub const SECMEC: u16 = 0x11A2;
    /// Relational database name
    pub const RDBNAM: u16 = 0x2110;
    /// User id
    pub const USRID: u16 = 0x11A0;
    /// Password
    pub const PASSWORD: u16 = 0x11A1;
    /// Severity code
    pub const SVRCOD: u16 = 0x1149;
    /// Security check code
    pub const SECCHKCD: u16 = 0x11A4;
    /// Agent manager
    pub const AGENT: u16 = 0x1403;
    /// SQL application manager
    pub const SQLAM: u16 = 0x2407;
    /// Security manager
    pub const SECMGR: u16 = 0x1440;
    /// TCP/IP communications manager
    pub const CMNTCPIP: u16 = 0x1474;
}

/// Security check codes.
pub mod secchkcd {
    /// Security information is valid
    pub const OK: u8 = 0x00;
    /// Password expired
    pub const PASSWORD_EXPIRED: u8 = 0x0E;
    /// Password invalid
    pub const PASSWORD_INVALID: u8 = 0x0F;
    /// Password missing
    pub const PASSWORD_MISSING: u8 = 0x10;
    /// User id missing
    pub const USER_ID_MISSING: u8 = 0x12;
    /// User id invalid
    pub const USER_ID_INVALID: u8 = 0x13;
    /// User id revoked
    pub const USER_ID_REVOKED: u8 = 0x14;
}

/// Security mechanisms this client can negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SecurityMechanism {
    /// User id and clear password
    UserIdPassword = 3,
    /// User id only
    UserIdOnly = 4,
}

impl SecurityMechanism {
    /// Parse the wire value; unsupported mechanisms are rejected.
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            3 => Ok(Self::UserIdPassword),
            4 => Ok(Self::UserIdOnly),
            other => Err(ProtocolError::InvalidField {
                field: "security mechanism",
                reason: format!("{other} is not supported"),
            }),
        }
    }
}

/// Classify a SECCHK code. `None` means the check passed.
pub fn classify_secchk(code: u8) -> Option<ErrorKind> {
    let failure = match code {
        secchkcd::OK => return None,
        secchkcd::PASSWORD_EXPIRED => SecurityFailure::PasswordExpired,
        secchkcd::PASSWORD_INVALID => SecurityFailure::PasswordIncorrect,
        secchkcd::PASSWORD_MISSING => SecurityFailure::PasswordMissing,
        secchkcd::USER_ID_INVALID => SecurityFailure::UserIdUnknown,
        secchkcd::USER_ID_REVOKED => SecurityFailure::UserIdDisabled,
        _ => SecurityFailure::Other,
    };
    Some(ErrorKind::Security(failure))
}

/// Turn a failed SECCHK into a [`HostError`]. The DDM listener has no server
/// id of its own, so failures are reported against the database server.
pub fn check_secchk(code: u8) -> std::result::Result<(), HostError> {
    match classify_secchk(code) {
        None => Ok(()),
        Some(kind) => Err(HostError::new(ServerId::Database, u32::from(code), kind)),
    }
}

fn ebcdic_text(item: &CodePointItem) -> Result<String> {
    TextCodec::ebcdic().decode_trimmed(&item.payload)
}

/// A decoded DDM object with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdmObject {
    /// Object code point
    pub code_point: u16,
    /// Parameters
    pub params: OptionalSection,
}

impl DdmObject {
    /// Decode every object in a DSS payload.
    pub fn parse_all(payload: Bytes) -> Result<Vec<Self>> {
        OptionalSection::parse(payload, LlWidth::Two)?
            .items()
            .iter()
            .map(|item| Ok(Self { code_point: item.code_point, params: item.nested(LlWidth::Two)? }))
            .collect()
    }

    /// Decode the single object of a DSS payload and check its code point.
    pub fn parse_expected(payload: Bytes, code_point: u16) -> Result<Self> {
        let objects = Self::parse_all(payload)?;
        objects
            .into_iter()
            .find(|o| o.code_point == code_point)
            .ok_or(ProtocolError::MissingCodePoint(code_point))
    }

    /// Parameter lookup.
    pub fn param(&self, code_point: u16) -> Option<&CodePointItem> {
        self.params.find(code_point)
    }

    /// Required parameter.
    pub fn require(&self, code_point: u16) -> Result<&CodePointItem> {
        self.params.require(code_point)
    }

    /// EBCDIC text parameter, if present.
    pub fn text(&self, code_point: u16) -> Result<Option<String>> {
        self.param(code_point).map(ebcdic_text).transpose()
    }
}

/// Builds one DDM object.
#[derive(Debug)]
pub struct DdmBuilder {
    code_point: u16,
    params: OptionalWriter,
}

impl DdmBuilder {
    /// Object with code point `code_point`.
    pub fn new(code_point: u16) -> Self {
        Self { code_point, params: OptionalWriter::new(LlWidth::Two) }
    }

    /// Raw parameter.
    pub fn bytes(&mut self, code_point: u16, value: &[u8]) -> Result<&mut Self> {
        self.params.item(code_point, value)?;
        Ok(self)
    }

    /// `u8` parameter.
    pub fn u8(&mut self, code_point: u16, value: u8) -> Result<&mut Self> {
        self.params.u8(code_point, value)?;
        Ok(self)
    }

    /// `u16` parameter.
    pub fn u16(&mut self, code_point: u16, value: u16) -> Result<&mut Self> {
        self.params.u16(code_point, value)?;
        Ok(self)
    }

    /// EBCDIC text parameter.
    pub fn text(&mut self, code_point: u16, value: &str) -> Result<&mut Self> {
        let encoded = TextCodec::ebcdic().encode(value)?;
        self.params.item(code_point, &encoded)?;
        Ok(self)
    }

    /// Encode the object.
    pub fn finish(self) -> Result<Bytes> {
        let params = self.params.into_inner();
        let mut out = OptionalWriter::new(LlWidth::Two);
        out.item(self.code_point, &params)?;
        Ok(out.into_inner().freeze())
    }
}

/// A DDM message with a fixed object code point.
pub trait DdmMessage: Sized {
    /// Object code point.
    const CODE_POINT: u16;

    /// Add parameters.
    fn write_params(&self, b: &mut DdmBuilder) -> Result<()>;

    /// Read parameters.
    fn from_object(object: &DdmObject) -> Result<Self>;

    /// Encode as a DSS payload.
    fn encode(&self) -> Result<Bytes> {
        let mut builder = DdmBuilder::new(Self::CODE_POINT);
        self.write_params(&mut builder)?;
        builder.finish()
    }

    /// Decode from a DSS payload.
    fn decode(payload: Bytes) -> Result<Self> {
        Self::from_object(&DdmObject::parse_expected(payload, Self::CODE_POINT)?)
    }
}

/// Manager and level pairs advertised in EXCSAT.
pub fn default_manager_levels() -> Vec<(u16, u16)> {
    vec![(cp::AGENT, 7), (cp::SQLAM, 7), (cp::SECMGR, 7), (cp::CMNTCPIP, 5)]
}

fn write_levels(b: &mut DdmBuilder, levels: &[(u16, u16)]) -> Result<()> {
    let bytes: Vec<u8> =
        levels.iter().flat_map(|(m, l)| m.to_be_bytes().into_iter().chain(l.to_be_bytes())).collect();
    b.bytes(cp::MGRLVLLS, &bytes)?;
    Ok(())
}

fn read_levels(object: &DdmObject) -> Result<Vec<(u16, u16)>> {
    let Some(item) = object.param(cp::MGRLVLLS) else {
        return Ok(Vec::new());
    };
    if item.payload.len() % 4 != 0 {
        return Err(ProtocolError::InvalidField {
            field: "MGRLVLLS",
            reason: format!("{} bytes is not a list of pairs", item.payload.len()),
        });
    }
    Ok(item
        .payload
        .chunks_exact(4)
        .map(|c| (u16::from_be_bytes([c[0], c[1]]), u16::from_be_bytes([c[2], c[3]])))
        .collect())
}

/// EXCSAT: introduce the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeServerAttributes {
    /// External name of the client process
    pub external_name: String,
    /// Client class
    pub server_class: String,
    /// Client host name
    pub server_name: String,
    /// Client release level
    pub release_level: String,
    /// Manager levels
    pub manager_levels: Vec<(u16, u16)>,
}

impl DdmMessage for ExchangeServerAttributes {
    const CODE_POINT: u16 = cp::EXCSAT;

    fn write_params(&self, b: &mut DdmBuilder) -> Result<()> {
        b.text(cp::EXTNAM, &self.external_name)?
            .text(cp::SRVCLSNM, &self.server_class)?
            .text(cp::SRVNAM, &self.server_name)?
            .text(cp::SRVRLSLV, &self.release_level)?;
        write_levels(b, &self.manager_levels)
    }

    fn from_object(object: &DdmObject) -> Result<Self> {
        Ok(Self {
            external_name: object.text(cp::EXTNAM)?.unwrap_or_default(),
            server_class: object.text(cp::SRVCLSNM)?.unwrap_or_default(),
            server_name: object.text(cp::SRVNAM)?.unwrap_or_default(),
            release_level: object.text(cp::SRVRLSLV)?.unwrap_or_default(),
            manager_levels: read_levels(object)?,
        })
    }
}

/// EXCSATRD: the server's answer to EXCSAT.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExchangeServerAttributesReply {
    /// Server class, such as `QAS`
    pub server_class: String,
    /// Server name
    pub server_name: String,
    /// Server release level
    pub release_level: String,
    /// Manager levels the server accepted
    pub manager_levels: Vec<(u16, u16)>,
}

impl DdmMessage for ExchangeServerAttributesReply {
    const CODE_POINT: u16 = cp::EXCSATRD;

    fn write_params(&self, b: &mut DdmBuilder) -> Result<()> {
        b.text(cp::SRVCLSNM, &self.server_class)?
            .text(cp::SRVNAM, &self.server_name)?
            .text(cp::SRVRLSLV, &self.release_level)?;
        write_levels(b, &self.manager_levels)
    }

    fn from_object(object: &DdmObject) -> Result<Self> {
        Ok(Self {
            server_class: object.text(cp::SRVCLSNM)?.unwrap_or_default(),
            server_name: object.text(cp::SRVNAM)?.unwrap_or_default(),
            release_level: object.text(cp::SRVRLSLV)?.unwrap_or_default(),
            manager_levels: read_levels(object)?,
        })
    }
}

/// ACCSEC: propose a security mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessSecurity {
    /// Proposed mechanism
    pub mechanism: SecurityMechanism,
    /// Target database, if any
    pub rdb_name: Option<String>,
}

impl DdmMessage for AccessSecurity {
    const CODE_POINT: u16 = cp::ACCSEC;

    fn write_params(&self, b: &mut DdmBuilder) -> Result<()> {
        b.u16(cp::SECMEC, self.mechanism as u16)?;
        if let Some(rdb) = &self.rdb_name {
            b.text(cp::RDBNAM, &rdb.to_uppercase())?;
        }
        Ok(())
    }

    fn from_object(object: &DdmObject) -> Result<Self> {
        Ok(Self {
            mechanism: SecurityMechanism::from_u16(object.require(cp::SECMEC)?.as_u16()?)?,
            rdb_name: object.text(cp::RDBNAM)?,
        })
    }
}

/// ACCSECRD: mechanisms the server accepts. When the proposal was refused
/// the list holds the alternatives instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessSecurityReply {
    /// Raw mechanism values
    pub mechanisms: Vec<u16>,
}

impl AccessSecurityReply {
    /// Whether `mechanism` is in the accepted list.
    pub fn accepts(&self, mechanism: SecurityMechanism) -> bool {
        self.mechanisms.contains(&(mechanism as u16))
    }
}

impl DdmMessage for AccessSecurityReply {
    const CODE_POINT: u16 = cp::ACCSECRD;

    fn write_params(&self, b: &mut DdmBuilder) -> Result<()> {
        let bytes: Vec<u8> = self.mechanisms.iter().flat_map(|m| m.to_be_bytes()).collect();
        b.bytes(cp::SECMEC, &bytes)?;
        Ok(())
    }

    fn from_object(object: &DdmObject) -> Result<Self> {
        let payload = &object.require(cp::SECMEC)?.payload;
        if payload.is_empty() || payload.len() % 2 != 0 {
            return Err(ProtocolError::InvalidField {
                field: "SECMEC",
                reason: format!("{} bytes", payload.len()),
            });
        }
        Ok(Self { mechanisms: payload.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect() })
    }
}

/// SECCHK: present credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityCheck {
    /// Mechanism agreed in ACCSEC
    pub mechanism: SecurityMechanism,
    /// User id
    pub user: String,
    /// Password, required for [`SecurityMechanism::UserIdPassword`]
    pub password: Option<String>,
}

impl DdmMessage for SecurityCheck {
    const CODE_POINT: u16 = cp::SECCHK;

    fn write_params(&self, b: &mut DdmBuilder) -> Result<()> {
        b.u16(cp::SECMEC, self.mechanism as u16)?.text(cp::USRID, &self.user.to_uppercase())?;
        match (&self.mechanism, &self.password) {
            (SecurityMechanism::UserIdPassword, Some(password)) => {
                b.text(cp::PASSWORD, password)?;
            },
            (SecurityMechanism::UserIdPassword, None) => {
                return Err(ProtocolError::MissingCodePoint(cp::PASSWORD));
            },
            (SecurityMechanism::UserIdOnly, _) => {},
        }
        Ok(())
    }

    fn from_object(object: &DdmObject) -> Result<Self> {
        Ok(Self {
            mechanism: SecurityMechanism::from_u16(object.require(cp::SECMEC)?.as_u16()?)?,
            user: object.text(cp::USRID)?.unwrap_or_default(),
            password: object.text(cp::PASSWORD)?,
        })
    }
}

/// SECCHKRM: outcome of the security check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityCheckReply {
    /// Severity code
    pub severity: u16,
    /// Security check code
    pub check_code: u8,
}

impl DdmMessage for SecurityCheckReply {
    const CODE_POINT: u16 = cp::SECCHKRM;

    fn write_params(&self, b: &mut DdmBuilder) -> Result<()> {
        b.u16(cp::SVRCOD, self.severity)?.u8(cp::SECCHKCD, self.check_code)?;
        Ok(())
    }

    fn from_object(object: &DdmObject) -> Result<Self> {
        Ok(Self {
            severity: object.require(cp::SVRCOD)?.as_u16()?,
            check_code: object.require(cp::SECCHKCD)?.as_u8()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn accsec_wire_form() {
        let msg = AccessSecurity { mechanism: SecurityMechanism::UserIdPassword, rdb_name: None };
        assert_eq!(&msg.encode().unwrap()[..], &hex!("000A 106D 0006 11A2 0003")[..]);
    }

    #[test]
    fn secchk_round_trip_through_object_parse() {
        let msg = SecurityCheck {
            mechanism: SecurityMechanism::UserIdPassword,
            user: "bob".into(),
            password: Some("secret".into()),
        };
        let decoded = SecurityCheck::decode(msg.encode().unwrap()).unwrap();
        assert_eq!(decoded.user, "BOB");
        assert_eq!(decoded.password.as_deref(), Some("secret"));
    }

    #[test]
    fn secchk_without_password_needs_user_only_mechanism() {
        let msg = SecurityCheck { mechanism: SecurityMechanism::UserIdPassword, user: "bob".into(), password: None };
        assert_eq!(msg.encode().unwrap_err(), ProtocolError::MissingCodePoint(cp::PASSWORD));
        let msg = SecurityCheck { mechanism: SecurityMechanism::UserIdOnly, ..msg };
        assert!(msg.encode().is_ok());
    }

    #[test]
    fn excsat_levels() {
        let msg = ExchangeServerAttributes {
            external_name: "hoststream".into(),
            server_class: "QDB2/RUST".into(),
            server_name: "client".into(),
            release_level: "V01R00".into(),
            manager_levels: default_manager_levels(),
        };
        let decoded = ExchangeServerAttributes::decode(msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn wrong_object_reports_missing_code_point() {
        let payload = SecurityCheckReply { severity: 0, check_code: 0 }.encode().unwrap();
        assert_eq!(
            AccessSecurityReply::decode(payload).unwrap_err(),
            ProtocolError::MissingCodePoint(cp::ACCSECRD)
        );
    }

    #[test]
    fn accsecrd_lists_alternatives() {
        let reply = AccessSecurityReply { mechanisms: vec![9, 3] };
        let decoded = AccessSecurityReply::decode(reply.encode().unwrap()).unwrap();
        assert!(decoded.accepts(SecurityMechanism::UserIdPassword));
        assert!(!decoded.accepts(SecurityMechanism::UserIdOnly));
    }

    #[test]
    fn secchk_codes() {
        assert_eq!(classify_secchk(secchkcd::OK), None);
        assert_eq!(
            classify_secchk(secchkcd::PASSWORD_EXPIRED),
            Some(ErrorKind::Security(SecurityFailure::PasswordExpired))
        );
        assert_eq!(
            classify_secchk(secchkcd::USER_ID_REVOKED),
            Some(ErrorKind::Security(SecurityFailure::UserIdDisabled))
        );
        assert_eq!(classify_secchk(0x19), Some(ErrorKind::Security(SecurityFailure::Other)));
        assert!(check_secchk(secchkcd::PASSWORD_INVALID).is_err());
    }
}
