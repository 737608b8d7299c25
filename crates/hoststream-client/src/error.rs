//! Client error type.

use std::io;

use hoststream_core::{CorrelationError, SessionError, TableFetchError};
use hoststream_proto::{ErrorKind, HostError, ProtocolError, ReplyError, ServerId};
use thiserror::Error;

/// Everything a client operation can fail with.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The connection is gone; every pending request fails with this
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Why the connection ended
        reason: String,
    },

    /// No reply in time
    #[error("{server}: {operation} timed out")]
    Timeout {
        /// Server the operation was addressed to
        server: ServerId,
        /// What was being waited for
        operation: &'static str,
    },

    /// Malformed data from the host
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Host reported a failure
    #[error(transparent)]
    Host(#[from] HostError),

    /// Handshake failed
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Reply did not match a request
    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    /// Conversion table unavailable
    #[error(transparent)]
    Conversion(#[from] TableFetchError),

    /// Configuration rejected before use
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<ReplyError> for ClientError {
    fn from(err: ReplyError) -> Self {
        match err {
            ReplyError::Protocol(e) => Self::Protocol(e),
            ReplyError::Host(e) => Self::Host(e),
        }
    }
}

impl ClientError {
    /// Host classification, when the host (or the handshake) reported the
    /// failure.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Host(err) | Self::Session(SessionError::Host(err)) => Some(err.kind),
            _ => None,
        }
    }

    /// Whether retrying on a new connection may help.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(_) | Self::ConnectionClosed { .. } | Self::Timeout { .. } => true,
            Self::Session(SessionError::HandshakeTimeout { .. }) => true,
            _ => matches!(self.kind(), Some(ErrorKind::ResourceLimit | ErrorKind::InUse)),
        }
    }

    pub(crate) fn closed(reason: impl Into<String>) -> Self {
        Self::ConnectionClosed { reason: reason.into() }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
