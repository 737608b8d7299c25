//! Session state machine for one host-server connection.
//!
//! # Architecture: Action-Based State Machine
//!
//! - Methods accept time as parameter (no stored Environment)
//! - Methods return `Result<Vec<SessionAction>, SessionError>`
//! - Driver code executes actions (send data streams, report readiness,
//!   close the connection)
//!
//! The driver assigns correlation ids to the data streams it sends and must
//! only feed back replies whose id is in [`Session::expected_replies`].
//!
//! # State Machine
//!
//! Signon server:
//!
//! ```text
//! ┌──────┐ ExchangeAttributes ┌─────────────────────┐ SignonInfo ┌───────────┐      ┌───────┐
//! │ Init │───────────────────>│ ExchangingAttributes│───────────>│ SigningOn │─────>│ Ready │
//! └──────┘                    └─────────────────────┘            └───────────┘      └───────┘
//! ```
//!
//! Every other server:
//!
//! ```text
//! ┌──────┐ ExchangeSeeds ┌─────────────────┐ StartServer ┌──────────┐
//! │ Init │──────────────>│ ExchangingSeeds │────────────>│ Starting │
//! └──────┘               └─────────────────┘             └──────────┘
//!                                                              │
//!                         server-specific attribute exchange   │ (database and
//!                        ┌──────────────────────────┐<─────────┤  remote command
//!                        │ NegotiatingAttributes    │          │  skip it)
//!                        └──────────────────────────┘          ↓
//!                                     │                   ┌───────┐
//!                                     └──────────────────>│ Ready │
//!                                                         └───────┘
//! ```
//!
//! Any failure or a handshake timeout moves the session to `Closed`.
//!
//! # Password levels
//!
//! Levels 0 and 1 use DES substitutes, which are not implemented; such hosts
//! are rejected with [`SessionError::UnsupportedPasswordLevel`]. Level 2 and
//! above use the SHA-1 substitute from [`crate::auth`]. Service servers do not
//! report the level themselves, so the driver learns it from the signon
//! server first and passes it in with [`Session::with_password_level`].

use std::{
    fmt,
    time::{Duration, Instant},
};

use hoststream_proto::{
    DataStream, Request, ServerId, central, dataqueue, ifs, print,
    signon::{self, PasswordType, Seed, SignonInfoReply},
    text::{CCSID_UCS2, CCSID_UTF16},
};
use serde::{Deserialize, Serialize};

use crate::{auth, error::SessionError};

/// Lowest password level with a SHA-1 substitute.
pub const MIN_PASSWORD_LEVEL: u8 = 2;

/// Actions returned by the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Send this data stream to the server
    Send(DataStream),

    /// Handshake finished; the connection accepts work
    Ready(SessionInfo),

    /// Close the connection with this reason
    Close {
        /// Reason for closing the connection
        reason: String,
    },
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Nothing sent yet
    Init,
    /// Signon attribute exchange sent
    ExchangingAttributes,
    /// Signon info sent
    SigningOn,
    /// Seed exchange sent
    ExchangingSeeds,
    /// Start server sent
    Starting,
    /// Server-specific attribute exchange sent
    NegotiatingAttributes,
    /// Handshake complete
    Ready,
    /// Handshake failed or timed out
    Closed,
}

/// User profile and password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user: String,
    password: String,
}

impl Credentials {
    /// Credentials for `user`. The user id is stored upper case.
    pub fn new(user: impl AsRef<str>, password: impl Into<String>) -> Self {
        Self { user: user.as_ref().trim().to_uppercase(), password: password.into() }
    }

    /// User profile.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Password.
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("user", &self.user).field("password", &"***").finish()
    }
}

/// Handshake configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Time allowed for the whole handshake
    pub handshake_timeout: Duration,
    /// Version announced to the signon and data queue servers
    pub client_version: u32,
    /// Signon datastream level
    pub datastream_level: u16,
    /// CCSID the client works in
    pub client_ccsid: u32,
    /// National language version for central server messages
    pub nlv: String,
    /// File server datastream level
    pub ifs_datastream_level: u16,
    /// Largest file-server data block the client accepts
    pub ifs_max_data_block: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(30),
            client_version: 1,
            datastream_level: 10,
            client_ccsid: u32::from(CCSID_UCS2),
            nlv: "2924".to_string(),
            ifs_datastream_level: 16,
            ifs_max_data_block: 1024 * 1024,
        }
    }
}

/// What the handshake learned about the server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionInfo {
    /// Server the session belongs to
    pub server: Option<ServerId>,
    /// Authenticated user profile
    pub user_id: String,
    /// Host password level
    pub password_level: u8,
    /// Server job name
    pub job_name: Option<String>,
    /// Server version
    pub server_version: Option<u32>,
    /// Server job CCSID
    pub server_ccsid: Option<u32>,
    /// File-server attributes
    pub ifs_attributes: Option<ifs::ExchangeAttributesReply>,
    /// Signon details (signon server only)
    pub signon: Option<SignonInfoReply>,
}

/// Handshake state machine for a single connection.
///
/// This is a pure state machine - no I/O, no Environment storage.
#[derive(Debug, Clone)]
pub struct Session {
    server: ServerId,
    state: SessionState,
    config: SessionConfig,
    credentials: Credentials,
    client_seed: Seed,
    password_level: Option<u8>,
    expected: &'static [u16],
    started: Instant,
    info: SessionInfo,
}

impl Session {
    /// New session in `Init` state. `client_seed` comes from the
    /// environment's RNG.
    pub fn new(
        server: ServerId,
        credentials: Credentials,
        client_seed: Seed,
        config: SessionConfig,
        now: Instant,
    ) -> Self {
        let info = SessionInfo {
            server: Some(server),
            user_id: credentials.user().to_string(),
            ..SessionInfo::default()
        };
        Self {
            server,
            state: SessionState::Init,
            config,
            credentials,
            client_seed,
            password_level: None,
            expected: &[],
            started: now,
            info,
        }
    }

    /// Password level learned from the signon server.
    #[must_use]
    pub fn with_password_level(mut self, level: u8) -> Self {
        self.password_level = Some(level);
        self
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Server this session talks to.
    pub fn server(&self) -> ServerId {
        self.server
    }

    /// Host password level, once known.
    pub fn password_level(&self) -> Option<u8> {
        self.password_level
    }

    /// Reply ids that answer the data stream most recently sent.
    pub fn expected_replies(&self) -> &'static [u16] {
        self.expected
    }

    /// Start the handshake.
    ///
    /// # Errors
    /// `InvalidState` unless in `Init`; `PasswordLevelUnknown` or
    /// `UnsupportedPasswordLevel` for a service server without a usable
    /// password level.
    pub fn begin(&mut self, now: Instant) -> Result<Vec<SessionAction>, SessionError> {
        if self.state != SessionState::Init {
            return Err(SessionError::InvalidState { state: self.state, operation: "begin" });
        }
        self.started = now;

        if self.server.requires_start() {
            let level = self.password_level.ok_or(SessionError::PasswordLevelUnknown)?;
            ensure_supported(level)?;
            let request =
                signon::ExchangeSeedsRequest { server: self.server, client_seed: self.client_seed };
            self.state = SessionState::ExchangingSeeds;
            return Ok(vec![self.send(&request)?]);
        }

        let request = signon::ExchangeAttributesRequest {
            client_version: self.config.client_version,
            datastream_level: self.config.datastream_level,
            client_seed: self.client_seed,
        };
        self.state = SessionState::ExchangingAttributes;
        Ok(vec![self.send(&request)?])
    }

    /// Feed the reply to the data stream last sent.
    ///
    /// # Errors
    /// Any failure closes the session. That includes a reply arriving after
    /// the handshake timeout, a malformed reply, a host return code, an
    /// unsupported password level, or a reply that does not answer the
    /// outstanding request.
    pub fn handle_reply(
        &mut self,
        ds: &DataStream,
        now: Instant,
    ) -> Result<Vec<SessionAction>, SessionError> {
        if let Some(elapsed) = self.check_timeout(now) {
            self.close();
            return Err(SessionError::HandshakeTimeout { elapsed });
        }
        let result = self.advance(ds);
        if let Err(err) = &result {
            tracing::warn!(server = %self.server, state = ?self.state, error = %err, "handshake failed");
            self.state = SessionState::Closed;
        }
        result
    }

    fn advance(&mut self, ds: &DataStream) -> Result<Vec<SessionAction>, SessionError> {
        if matches!(self.state, SessionState::Init | SessionState::Ready | SessionState::Closed) {
            return Err(SessionError::InvalidState { state: self.state, operation: "handle_reply" });
        }
        if ds.server() != self.server || !self.expected.contains(&ds.request_id()) {
            return Err(SessionError::UnexpectedReply { state: self.state, reply_id: ds.request_id() });
        }

        match self.state {
            SessionState::ExchangingAttributes => {
                let reply: signon::ExchangeAttributesReply = ds.parse_reply()?;
                signon::check(self.server, reply.return_code)?;
                ensure_supported(reply.password_level)?;
                let server_seed = reply.server_seed.ok_or(SessionError::MissingServerSeed)?;
                self.password_level = Some(reply.password_level);
                self.info.server_version = Some(reply.server_version);
                self.info.job_name = reply.job_name;

                let request = signon::SignonInfoRequest {
                    password_type: PasswordType::Sha1,
                    client_ccsid: self.config.client_ccsid,
                    user_id: self.credentials.user().to_string(),
                    substitute: self.substitute(&server_seed)?,
                    return_messages: true,
                };
                self.state = SessionState::SigningOn;
                Ok(vec![self.send(&request)?])
            },
            SessionState::SigningOn => {
                let reply: SignonInfoReply = ds.parse_reply()?;
                signon::check(self.server, reply.return_code)?;
                self.info.server_ccsid = reply.server_ccsid;
                self.info.signon = Some(reply);
                Ok(self.ready())
            },
            SessionState::ExchangingSeeds => {
                let reply: signon::ExchangeSeedsReply = ds.parse_reply()?;
                signon::check(self.server, reply.return_code)?;
                let request = signon::StartServerRequest {
                    server: self.server,
                    password_type: PasswordType::Sha1,
                    user_id: self.credentials.user().to_string(),
                    substitute: self.substitute(&reply.server_seed)?,
                };
                self.state = SessionState::Starting;
                Ok(vec![self.send(&request)?])
            },
            SessionState::Starting => {
                let reply: signon::StartServerReply = ds.parse_reply()?;
                signon::check(self.server, reply.return_code)?;
                if reply.job_name.is_some() {
                    self.info.job_name = reply.job_name;
                }
                match self.negotiation()? {
                    Some(action) => {
                        self.state = SessionState::NegotiatingAttributes;
                        Ok(vec![action])
                    },
                    None => Ok(self.ready()),
                }
            },
            SessionState::NegotiatingAttributes => {
                self.finish_negotiation(ds)?;
                Ok(self.ready())
            },
            state => Err(SessionError::InvalidState { state, operation: "handle_reply" }),
        }
    }

    fn negotiation(&mut self) -> Result<Option<SessionAction>, SessionError> {
        let action = match self.server {
            ServerId::Central => self.send(&central::ExchangeAttributesRequest {
                client_ccsid: self.config.client_ccsid,
                nlv: self.config.nlv.clone(),
            })?,
            ServerId::File => self.send(&ifs::ExchangeAttributesRequest {
                datastream_level: self.config.ifs_datastream_level,
                flags: 0,
                max_data_block: self.config.ifs_max_data_block,
                preferred_ccsids: vec![CCSID_UTF16, CCSID_UCS2],
            })?,
            ServerId::DataQueue => self.send(&dataqueue::ExchangeAttributesRequest {
                client_version: self.config.client_version,
            })?,
            ServerId::NetPrint => self.send(&print::ExchangeAttributesRequest)?,
            ServerId::Signon | ServerId::Database | ServerId::RemoteCommand => return Ok(None),
        };
        Ok(Some(action))
    }

    fn finish_negotiation(&mut self, ds: &DataStream) -> Result<(), SessionError> {
        match self.server {
            ServerId::Central => {
                let reply: central::ExchangeAttributesReply = ds.parse_reply()?;
                central::check(reply.return_code)?;
                self.info.server_ccsid = Some(reply.server_ccsid);
            },
            ServerId::File => {
                self.info.ifs_attributes =
                    Some(ifs::expect::<ifs::ExchangeAttributesReply>(ds)?);
            },
            ServerId::DataQueue => {
                let reply = dataqueue::expect::<dataqueue::ExchangeAttributesReply>(ds)?;
                self.info.server_version = Some(reply.server_version);
            },
            ServerId::NetPrint => {
                print::expect(ds)?;
            },
            ServerId::Signon | ServerId::Database | ServerId::RemoteCommand => {},
        }
        Ok(())
    }

    fn substitute(&self, server_seed: &Seed) -> Result<Vec<u8>, SessionError> {
        let substitute = auth::signon_substitute(
            self.credentials.user(),
            self.credentials.password(),
            server_seed,
            &self.client_seed,
        )?;
        Ok(substitute.to_vec())
    }

    fn send<R: Request>(&mut self, request: &R) -> Result<SessionAction, SessionError> {
        self.expected = request.reply_ids();
        tracing::debug!(server = %self.server, request_id = request.request_id(), "handshake send");
        Ok(SessionAction::Send(DataStream::from_request(request)?))
    }

    fn ready(&mut self) -> Vec<SessionAction> {
        self.state = SessionState::Ready;
        self.expected = &[];
        self.info.password_level = self.password_level.unwrap_or_default();
        tracing::debug!(server = %self.server, user = %self.info.user_id, "session ready");
        vec![SessionAction::Ready(self.info.clone())]
    }

    /// Transition to Closed state
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
        self.expected = &[];
    }

    /// Check if the handshake has run out of time
    ///
    /// # Returns
    /// `Some(elapsed)` if timed out, `None` otherwise
    #[must_use]
    pub fn check_timeout(&self, now: Instant) -> Option<Duration> {
        if matches!(self.state, SessionState::Init | SessionState::Ready | SessionState::Closed) {
            return None;
        }
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed > self.config.handshake_timeout).then_some(elapsed)
    }

    /// Close the session if the handshake timed out.
    pub fn tick(&mut self, now: Instant) -> Vec<SessionAction> {
        match self.check_timeout(now) {
            Some(elapsed) => {
                self.close();
                vec![SessionAction::Close { reason: format!("handshake timeout after {elapsed:?}") }]
            },
            None => Vec::new(),
        }
    }
}

fn ensure_supported(level: u8) -> Result<(), SessionError> {
    if level < MIN_PASSWORD_LEVEL {
        return Err(SessionError::UnsupportedPasswordLevel(level));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use hoststream_proto::{
        ErrorKind, Reply, SecurityFailure,
        signon::{ExchangeAttributesReply, ExchangeSeedsReply, StartServerReply},
    };

    use super::*;

    const CLIENT_SEED: Seed = [0x11; 8];
    const SERVER_SEED: Seed = [0x22; 8];

    fn creds() -> Credentials {
        Credentials::new("tester", "Pa55word")
    }

    fn reply<R: Reply>(server: ServerId, reply: &R) -> DataStream {
        DataStream::from_reply(server, reply).unwrap()
    }

    fn sent(actions: &[SessionAction]) -> &DataStream {
        match actions {
            [SessionAction::Send(ds)] => ds,
            other => panic!("expected one send, got {other:?}"),
        }
    }

    fn attributes(level: u8) -> ExchangeAttributesReply {
        ExchangeAttributesReply {
            server_version: 0x0007_0500,
            server_level: 10,
            server_seed: Some(SERVER_SEED),
            password_level: level,
            ..ExchangeAttributesReply::default()
        }
    }

    #[test]
    fn signon_handshake() {
        let t0 = Instant::now();
        let mut session =
            Session::new(ServerId::Signon, creds(), CLIENT_SEED, SessionConfig::default(), t0);

        let actions = session.begin(t0).unwrap();
        let request = signon::ExchangeAttributesRequest::parse(sent(&actions)).unwrap();
        assert_eq!(request.client_seed, CLIENT_SEED);
        assert_eq!(session.state(), SessionState::ExchangingAttributes);

        let actions = session.handle_reply(&reply(ServerId::Signon, &attributes(2)), t0).unwrap();
        let info_request = signon::SignonInfoRequest::parse(sent(&actions)).unwrap();
        assert_eq!(info_request.user_id, "TESTER");
        assert_eq!(info_request.password_type, PasswordType::Sha1);
        let expected =
            auth::signon_substitute("TESTER", "Pa55word", &SERVER_SEED, &CLIENT_SEED).unwrap();
        assert_eq!(info_request.substitute, expected.to_vec());
        assert_eq!(session.state(), SessionState::SigningOn);

        let signon_reply = SignonInfoReply { server_ccsid: Some(37), ..SignonInfoReply::default() };
        let actions = session.handle_reply(&reply(ServerId::Signon, &signon_reply), t0).unwrap();
        let [SessionAction::Ready(info)] = actions.as_slice() else {
            panic!("expected ready, got {actions:?}");
        };
        assert_eq!(info.password_level, 2);
        assert_eq!(info.server_ccsid, Some(37));
        assert_eq!(info.server_version, Some(0x0007_0500));
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.password_level(), Some(2));
    }

    #[test]
    fn des_password_levels_rejected() {
        for level in [0, 1] {
            let t0 = Instant::now();
            let mut session =
                Session::new(ServerId::Signon, creds(), CLIENT_SEED, SessionConfig::default(), t0);
            session.begin(t0).unwrap();
            let err = session.handle_reply(&reply(ServerId::Signon, &attributes(level)), t0);
            assert_eq!(err.unwrap_err(), SessionError::UnsupportedPasswordLevel(level));
            assert_eq!(session.state(), SessionState::Closed);
        }
    }

    #[test]
    fn service_server_needs_password_level() {
        let t0 = Instant::now();
        let mut session =
            Session::new(ServerId::File, creds(), CLIENT_SEED, SessionConfig::default(), t0);
        assert_eq!(session.begin(t0).unwrap_err(), SessionError::PasswordLevelUnknown);
    }

    #[test]
    fn file_server_handshake_negotiates_attributes() {
        let t0 = Instant::now();
        let mut session =
            Session::new(ServerId::File, creds(), CLIENT_SEED, SessionConfig::default(), t0)
                .with_password_level(3);

        let actions = session.begin(t0).unwrap();
        let seeds = signon::ExchangeSeedsRequest::parse(sent(&actions)).unwrap();
        assert_eq!(seeds.server, ServerId::File);

        let seeds_reply = ExchangeSeedsReply { return_code: 0, server_seed: SERVER_SEED };
        let actions = session.handle_reply(&reply(ServerId::File, &seeds_reply), t0).unwrap();
        let start = signon::StartServerRequest::parse(sent(&actions)).unwrap();
        assert_eq!(start.user_id, "TESTER");
        assert_eq!(session.state(), SessionState::Starting);

        let start_reply =
            StartServerReply { job_name: Some("QPWFSERVSO".into()), ..StartServerReply::default() };
        let actions = session.handle_reply(&reply(ServerId::File, &start_reply), t0).unwrap();
        let negotiation = ifs::ExchangeAttributesRequest::parse(sent(&actions)).unwrap();
        assert_eq!(negotiation.preferred_ccsids, vec![CCSID_UTF16, CCSID_UCS2]);
        assert_eq!(session.state(), SessionState::NegotiatingAttributes);

        let attrs = ifs::ExchangeAttributesReply {
            datastream_level: 16,
            flags: 0,
            max_data_block: 65536,
            ccsid: CCSID_UTF16,
        };
        let actions = session.handle_reply(&reply(ServerId::File, &attrs), t0).unwrap();
        let [SessionAction::Ready(info)] = actions.as_slice() else {
            panic!("expected ready, got {actions:?}");
        };
        assert_eq!(info.ifs_attributes, Some(attrs));
        assert_eq!(info.job_name.as_deref(), Some("QPWFSERVSO"));
        assert_eq!(info.password_level, 3);
    }

    #[test]
    fn database_server_is_ready_after_start() {
        let t0 = Instant::now();
        let mut session =
            Session::new(ServerId::Database, creds(), CLIENT_SEED, SessionConfig::default(), t0)
                .with_password_level(2);
        session.begin(t0).unwrap();
        let seeds_reply = ExchangeSeedsReply { return_code: 0, server_seed: SERVER_SEED };
        session.handle_reply(&reply(ServerId::Database, &seeds_reply), t0).unwrap();
        let actions = session
            .handle_reply(&reply(ServerId::Database, &StartServerReply::default()), t0)
            .unwrap();
        assert!(matches!(actions.as_slice(), [SessionAction::Ready(_)]));
    }

    #[test]
    fn start_server_failure_is_classified() {
        let t0 = Instant::now();
        let mut session =
            Session::new(ServerId::DataQueue, creds(), CLIENT_SEED, SessionConfig::default(), t0)
                .with_password_level(2);
        session.begin(t0).unwrap();
        let seeds_reply = ExchangeSeedsReply { return_code: 0, server_seed: SERVER_SEED };
        session.handle_reply(&reply(ServerId::DataQueue, &seeds_reply), t0).unwrap();

        let failed = StartServerReply {
            return_code: signon::rc::PASSWORD_INCORRECT,
            ..StartServerReply::default()
        };
        let err = session.handle_reply(&reply(ServerId::DataQueue, &failed), t0).unwrap_err();
        let SessionError::Host(host) = err else { panic!("expected host error, got {err:?}") };
        assert_eq!(host.kind, ErrorKind::Security(SecurityFailure::PasswordIncorrect));
        assert_eq!(host.server, ServerId::DataQueue);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn wrong_reply_closes_session() {
        let t0 = Instant::now();
        let mut session =
            Session::new(ServerId::Signon, creds(), CLIENT_SEED, SessionConfig::default(), t0);
        session.begin(t0).unwrap();
        let err = session
            .handle_reply(&reply(ServerId::Signon, &SignonInfoReply::default()), t0)
            .unwrap_err();
        assert_eq!(
            err,
            SessionError::UnexpectedReply {
                state: SessionState::ExchangingAttributes,
                reply_id: signon::id::SIGNON_INFO_REPLY,
            }
        );
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn begin_twice_is_invalid() {
        let t0 = Instant::now();
        let mut session =
            Session::new(ServerId::Signon, creds(), CLIENT_SEED, SessionConfig::default(), t0);
        session.begin(t0).unwrap();
        assert!(matches!(session.begin(t0), Err(SessionError::InvalidState { .. })));
    }

    #[test]
    fn handshake_timeout() {
        let t0 = Instant::now();
        let config =
            SessionConfig { handshake_timeout: Duration::from_secs(10), ..SessionConfig::default() };
        let mut session = Session::new(ServerId::Signon, creds(), CLIENT_SEED, config, t0);

        assert!(session.tick(t0 + Duration::from_secs(60)).is_empty());

        session.begin(t0).unwrap();
        assert!(session.check_timeout(t0 + Duration::from_secs(5)).is_none());

        let actions = session.tick(t0 + Duration::from_secs(11));
        assert!(matches!(actions.as_slice(), [SessionAction::Close { .. }]));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn late_reply_times_out() {
        let t0 = Instant::now();
        let mut session =
            Session::new(ServerId::Signon, creds(), CLIENT_SEED, SessionConfig::default(), t0);
        session.begin(t0).unwrap();
        let late = t0 + Duration::from_secs(31);
        let err = session.handle_reply(&reply(ServerId::Signon, &attributes(2)), late).unwrap_err();
        assert!(matches!(err, SessionError::HandshakeTimeout { .. }));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn credentials_debug_hides_password() {
        let text = format!("{:?}", creds());
        assert!(text.contains("TESTER"));
        assert!(!text.contains("Pa55word"));
    }
}
