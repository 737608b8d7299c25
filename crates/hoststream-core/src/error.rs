//! Error types for the session and correlation state machines.

use std::time::Duration;

use hoststream_proto::{HostError, ProtocolError, ReplyError, ServerId};
use thiserror::Error;

use crate::session::SessionState;

/// Reply matching failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelationError {
    /// No request is waiting on this correlation id
    #[error("no pending request for correlation id {0}")]
    UnknownCorrelation(u32),

    /// The reply does not answer the pending request
    #[error(
        "correlation id {correlation_id}: reply 0x{reply_id:04X} from {server} does not answer a \
         {expected} request"
    )]
    UnexpectedReply {
        /// Correlation id of the abandoned request
        correlation_id: u32,
        /// Server the request went to
        expected: ServerId,
        /// Server named by the reply
        server: ServerId,
        /// Reply id received
        reply_id: u16,
    },
}

/// Session handshake failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Operation not valid in the current state
    #[error("invalid state {state:?} for operation {operation}")]
    InvalidState {
        /// State the session was in
        state: SessionState,
        /// Operation attempted
        operation: &'static str,
    },

    /// Host uses a DES password level
    #[error("password level {0} is not supported (DES substitutes are not implemented)")]
    UnsupportedPasswordLevel(u8),

    /// Service server handshake started before the signon server reported
    /// the password level
    #[error("password level of the host is unknown")]
    PasswordLevelUnknown,

    /// Handshake did not finish in time
    #[error("handshake timeout after {elapsed:?}")]
    HandshakeTimeout {
        /// Time since the handshake began
        elapsed: Duration,
    },

    /// Signon server did not send its seed
    #[error("server seed missing from attribute exchange")]
    MissingServerSeed,

    /// Reply arrived for a different request than the one outstanding
    #[error("unexpected reply 0x{reply_id:04X} in state {state:?}")]
    UnexpectedReply {
        /// State the session was in
        state: SessionState,
        /// Reply id received
        reply_id: u16,
    },

    /// Reply could not be decoded
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Host rejected the handshake
    #[error(transparent)]
    Host(#[from] HostError),
}

impl From<ReplyError> for SessionError {
    fn from(err: ReplyError) -> Self {
        match err {
            ReplyError::Protocol(e) => Self::Protocol(e),
            ReplyError::Host(e) => Self::Host(e),
        }
    }
}
