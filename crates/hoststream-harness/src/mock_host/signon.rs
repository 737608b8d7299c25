//! Signon server and the seed/start-server exchange of every other server.

use hoststream_core::auth;
use hoststream_proto::{
    DataStream, ProtocolError, ServerId,
    signon::{
        ExchangeAttributesReply, ExchangeAttributesRequest, ExchangeSeedsReply, ExchangeSeedsRequest,
        HostTimestamp, SignonInfoReply, SignonInfoRequest, StartServerReply, StartServerRequest, id, rc,
    },
};

use super::{Conn, HostState, Outcome};

const SERVER_VERSION: u32 = 0x0007_0500;
const SERVER_LEVEL: u16 = 10;

/// Handshake requests. `None` when `request` is not one.
pub(crate) fn handle(
    state: &mut HostState,
    conn: &mut Conn,
    request: &DataStream,
) -> Result<Option<Outcome>, ProtocolError> {
    let server = conn.server;
    let outcome = match (server, request.request_id()) {
        (ServerId::Signon, id::EXCHANGE_ATTRIBUTES) => {
            let req = ExchangeAttributesRequest::parse(request)?;
            conn.client_seed = Some(req.client_seed);
            let reply = ExchangeAttributesReply {
                return_code: rc::OK,
                server_version: SERVER_VERSION,
                server_level: SERVER_LEVEL.min(req.datastream_level.max(1)),
                server_seed: Some(conn.server_seed),
                password_level: state.password_level,
                job_name: Some(state.next_job(server)),
            };
            Outcome::one(server, &reply)?
        },
        (ServerId::Signon, id::SIGNON_INFO) => {
            let req = SignonInfoRequest::parse(request)?;
            let return_code = verify(state, conn, &req.user_id, &req.substitute);
            let reply = if return_code == rc::OK {
                conn.user = Some(req.user_id);
                SignonInfoReply {
                    return_code,
                    current_signon: Some(stamp(state.clock)),
                    last_signon: Some(stamp(state.clock.saturating_sub(86_400))),
                    password_expiration: Some(stamp(state.clock + 90 * 86_400)),
                    invalid_attempts: Some(0),
                    server_ccsid: Some(state.host_ccsid),
                    expiration_warning_days: Some(7),
                }
            } else {
                SignonInfoReply { return_code, ..SignonInfoReply::default() }
            };
            Outcome::one(server, &reply)?
        },
        (ServerId::Signon, _) => return Ok(None),
        (_, id::EXCHANGE_SEEDS) => {
            let req = ExchangeSeedsRequest::parse(request)?;
            conn.client_seed = Some(req.client_seed);
            Outcome::one(server, &ExchangeSeedsReply { return_code: rc::OK, server_seed: conn.server_seed })?
        },
        (_, id::START_SERVER) => {
            let req = StartServerRequest::parse(request)?;
            let return_code = verify(state, conn, &req.user_id, &req.substitute);
            let reply = if return_code == rc::OK {
                let reply = StartServerReply {
                    return_code,
                    user_id: Some(req.user_id.clone()),
                    job_name: Some(state.next_job(server)),
                };
                conn.user = Some(req.user_id);
                reply
            } else {
                StartServerReply { return_code, ..StartServerReply::default() }
            };
            Outcome::one(server, &reply)?
        },
        _ => return Ok(None),
    };
    Ok(Some(outcome))
}

/// Check the substitute against the stored password.
fn verify(state: &HostState, conn: &Conn, user: &str, substitute: &[u8]) -> u32 {
    let Some(client_seed) = conn.client_seed else {
        return rc::REQUEST_DATA_ERROR;
    };
    let Some(password) = state.password(user) else {
        return rc::USER_ID_UNKNOWN;
    };
    match auth::signon_substitute(user, password, &conn.server_seed, &client_seed) {
        Ok(expected) if expected[..] == *substitute => rc::OK,
        Ok(_) => rc::PASSWORD_INCORRECT,
        Err(_) => rc::REQUEST_DATA_ERROR,
    }
}

/// Epoch seconds as a host timestamp (UTC, proleptic Gregorian).
fn stamp(epoch_seconds: u64) -> HostTimestamp {
    let days = epoch_seconds / 86_400;
    let secs = epoch_seconds % 86_400;
    // Civil-from-days, shifted so the era starts on 0000-03-01.
    let z = days + 719_468;
    let era = z / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + u64::from(month <= 2);
    HostTimestamp {
        year: u16::try_from(year).unwrap_or(u16::MAX),
        month: month as u8,
        day: day as u8,
        hour: (secs / 3600) as u8,
        minute: (secs % 3600 / 60) as u8,
        second: (secs % 60) as u8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_seconds_to_calendar() {
        assert_eq!(
            stamp(0),
            HostTimestamp { year: 1970, month: 1, day: 1, hour: 0, minute: 0, second: 0 }
        );
        assert_eq!(
            stamp(1_700_000_000),
            HostTimestamp { year: 2023, month: 11, day: 14, hour: 22, minute: 13, second: 20 }
        );
        assert_eq!(stamp(951_782_400).day, 29);
    }
}
