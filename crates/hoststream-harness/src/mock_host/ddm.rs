//! DDM listener: the EXCSAT/ACCSEC/SECCHK security exchange.

use std::io;

use bytes::Bytes;
use hoststream_proto::{
    ProtocolError, ServerId,
    ddm::{
        AccessSecurity, AccessSecurityReply, DdmMessage, DdmObject, ExchangeServerAttributesReply, SecurityCheck,
        SecurityCheckReply, SecurityMechanism, cp, default_manager_levels, secchkcd,
    },
    dss::DssSegment,
};
use tokio::io::{AsyncRead, AsyncWrite};

use super::{HostState, MockHost, wire};

const SEVERITY_INFO: u16 = 0;
const SEVERITY_ERROR: u16 = 8;

pub(crate) async fn serve<S>(host: &MockHost, mut stream: S) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    while let Some(segment) = wire::read_segment(&mut stream).await? {
        let reply = {
            let mut state = host.lock();
            answer(&mut state, segment.payload)
        };
        match reply {
            Ok(Some(payload)) => {
                wire::write_segment(&mut stream, &DssSegment::reply(segment.correlation_id, payload)).await?;
            },
            Ok(None) => {
                tracing::debug!("mock DDM listener dropping connection");
                return Ok(());
            },
            Err(err) => return Err(io::Error::new(io::ErrorKind::InvalidData, err)),
        }
    }
    Ok(())
}

/// Reply objects for one request segment; `None` drops the connection.
fn answer(state: &mut HostState, payload: Bytes) -> Result<Option<Bytes>, ProtocolError> {
    let objects = DdmObject::parse_all(payload)?;
    let Some(object) = objects.first() else {
        return Ok(None);
    };
    *state.requests.entry((ServerId::Database, object.code_point)).or_default() += 1;
    let reply = match object.code_point {
        cp::EXCSAT => ExchangeServerAttributesReply {
            server_class: "QAS".into(),
            server_name: "MOCKHOST".into(),
            release_level: "07050".into(),
            manager_levels: default_manager_levels(),
        }
        .encode()?,
        cp::ACCSEC => {
            let mechanisms = match AccessSecurity::from_object(object) {
                Ok(request) => vec![request.mechanism as u16],
                Err(_) => vec![SecurityMechanism::UserIdPassword as u16, SecurityMechanism::UserIdOnly as u16],
            };
            AccessSecurityReply { mechanisms }.encode()?
        },
        cp::SECCHK => {
            let check_code = security_check(state, &SecurityCheck::from_object(object)?);
            let severity = if check_code == secchkcd::OK { SEVERITY_INFO } else { SEVERITY_ERROR };
            SecurityCheckReply { severity, check_code }.encode()?
        },
        _ => return Ok(None),
    };
    Ok(Some(reply))
}

fn security_check(state: &HostState, request: &SecurityCheck) -> u8 {
    if request.user.is_empty() {
        return secchkcd::USER_ID_MISSING;
    }
    let Some(expected) = state.password(&request.user) else {
        return secchkcd::USER_ID_INVALID;
    };
    match (request.mechanism, &request.password) {
        (SecurityMechanism::UserIdOnly, _) => secchkcd::OK,
        (SecurityMechanism::UserIdPassword, None) => secchkcd::PASSWORD_MISSING,
        (SecurityMechanism::UserIdPassword, Some(password)) if password == expected => secchkcd::OK,
        (SecurityMechanism::UserIdPassword, Some(_)) => secchkcd::PASSWORD_INVALID,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(host: &MockHost, user: &str, password: Option<&str>) -> u8 {
        let request = SecurityCheck {
            mechanism: SecurityMechanism::UserIdPassword,
            user: user.into(),
            password: password.map(Into::into),
        };
        security_check(&host.lock(), &request)
    }

    #[test]
    fn security_check_codes() {
        let host = MockHost::new().with_user("bob", "Secret");
        assert_eq!(check(&host, "BOB", Some("Secret")), secchkcd::OK);
        assert_eq!(check(&host, "BOB", Some("secret")), secchkcd::PASSWORD_INVALID);
        assert_eq!(check(&host, "BOB", None), secchkcd::PASSWORD_MISSING);
        assert_eq!(check(&host, "ALICE", Some("x")), secchkcd::USER_ID_INVALID);
        assert_eq!(check(&host, "", Some("x")), secchkcd::USER_ID_MISSING);
    }

    #[test]
    fn unsupported_mechanism_lists_alternatives() {
        let host = MockHost::new();
        let mut state = host.lock();
        let mut builder = hoststream_proto::ddm::DdmBuilder::new(cp::ACCSEC);
        builder.u16(cp::SECMEC, 9).unwrap();
        let reply = answer(&mut state, builder.finish().unwrap()).unwrap().unwrap();
        let reply = AccessSecurityReply::decode(reply).unwrap();
        assert_eq!(reply.mechanisms, vec![3, 4]);
    }
}
