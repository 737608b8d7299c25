//! Return-code classification shared by every subsystem.
//!
//! Each server reports failures with its own numbering (`u16` for the file,
//! data queue, print and central servers, `u32` for signon, one byte for the
//! DDM security check). The subsystem modules map those numbers onto the
//! single [`ErrorKind`] set so callers can match on what went wrong without
//! knowing which server said it.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{errors::ProtocolError, server::ServerId};

/// Why a security check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityFailure {
    /// User profile does not exist
    UserIdUnknown,
    /// User profile is disabled or revoked
    UserIdDisabled,
    /// Password does not match
    PasswordIncorrect,
    /// Password has expired
    PasswordExpired,
    /// No password was supplied
    PasswordMissing,
    /// Any other security failure
    Other,
}

impl fmt::Display for SecurityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UserIdUnknown => "user id unknown",
            Self::UserIdDisabled => "user id disabled",
            Self::PasswordIncorrect => "password incorrect",
            Self::PasswordExpired => "password expired",
            Self::PasswordMissing => "password missing",
            Self::Other => "security failure",
        })
    }
}

/// Server-independent classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Named object does not exist
    ObjectNotFound,
    /// A directory or library on the path does not exist
    PathNotFound,
    /// Object already exists
    AlreadyExists,
    /// Caller lacks authority
    AccessDenied,
    /// Object is locked by another job
    InUse,
    /// Name is syntactically invalid
    InvalidName,
    /// Handle is unknown or closed
    InvalidHandle,
    /// Directory still has entries
    NotEmpty,
    /// Host ran out of a resource
    ResourceLimit,
    /// End of a listing or stream
    EndOfData,
    /// Nothing available (for example an empty queue after the wait expired)
    NoData,
    /// Host rejected the request as malformed
    InvalidRequest,
    /// Authentication failed
    Security(SecurityFailure),
    /// Unrecognised return code
    ServerError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObjectNotFound => f.write_str("object not found"),
            Self::PathNotFound => f.write_str("path not found"),
            Self::AlreadyExists => f.write_str("already exists"),
            Self::AccessDenied => f.write_str("access denied"),
            Self::InUse => f.write_str("in use"),
            Self::InvalidName => f.write_str("invalid name"),
            Self::InvalidHandle => f.write_str("invalid handle"),
            Self::NotEmpty => f.write_str("not empty"),
            Self::ResourceLimit => f.write_str("resource limit reached"),
            Self::EndOfData => f.write_str("end of data"),
            Self::NoData => f.write_str("no data"),
            Self::InvalidRequest => f.write_str("invalid request"),
            Self::Security(failure) => write!(f, "{failure}"),
            Self::ServerError => f.write_str("server error"),
        }
    }
}

/// A classified host failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{server}: {kind} (return code 0x{return_code:04X}){}", detail(.message.as_deref()))]
pub struct HostError {
    /// Server that reported the failure
    pub server: ServerId,
    /// Raw return code
    pub return_code: u32,
    /// Classification
    pub kind: ErrorKind,
    /// Message text sent by the host, if any
    pub message: Option<String>,
}

fn detail(message: Option<&str>) -> String {
    message.map(|m| format!(": {m}")).unwrap_or_default()
}

impl HostError {
    /// Failure without host message text.
    pub fn new(server: ServerId, return_code: u32, kind: ErrorKind) -> Self {
        Self { server, return_code, kind, message: None }
    }

    /// Attach host message text.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Failure while interpreting a reply: malformed, or well-formed but failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplyError {
    /// Reply could not be decoded
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Host reported a failure
    #[error(transparent)]
    Host(#[from] HostError),
}

impl ReplyError {
    /// Classification, if the host reported the failure.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Host(err) => Some(err.kind),
            Self::Protocol(_) => None,
        }
    }
}

/// Result of interpreting a reply.
pub type ReplyResult<T> = std::result::Result<T, ReplyError>;
