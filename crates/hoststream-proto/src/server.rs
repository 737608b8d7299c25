//! Host server identifiers.
//!
//! Each host service listens on its own port and stamps its id into bytes 6..8
//! of every data-stream header. Replies must come back with the same id as the
//! request they answer.

use std::fmt;

use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::errors::{ProtocolError, Result};

/// Port of the DDM/DRDA listener.
pub const DDM_PORT: u16 = 446;

/// TLS port of the DDM/DRDA listener.
pub const DDM_TLS_PORT: u16 = 448;

/// A host server reachable over the Client Access data-stream protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize_repr, Deserialize_repr)]
#[repr(u16)]
pub enum ServerId {
    /// Central server (licensing, NLS conversion tables)
    Central = 0xE000,
    /// Integrated file system server
    File = 0xE002,
    /// Network print server
    NetPrint = 0xE003,
    /// Database server
    Database = 0xE004,
    /// Data queue server
    DataQueue = 0xE007,
    /// Remote command and program call server
    RemoteCommand = 0xE008,
    /// Signon server
    Signon = 0xE009,
}

impl ServerId {
    /// Every known server, in id order.
    pub const ALL: [Self; 7] = [
        Self::Central,
        Self::File,
        Self::NetPrint,
        Self::Database,
        Self::DataQueue,
        Self::RemoteCommand,
        Self::Signon,
    ];

    /// Parse a wire value.
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            0xE000 => Ok(Self::Central),
            0xE002 => Ok(Self::File),
            0xE003 => Ok(Self::NetPrint),
            0xE004 => Ok(Self::Database),
            0xE007 => Ok(Self::DataQueue),
            0xE008 => Ok(Self::RemoteCommand),
            0xE009 => Ok(Self::Signon),
            other => Err(ProtocolError::UnknownServer(other)),
        }
    }

    /// Wire value.
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Well-known plain-text port.
    pub fn default_port(self) -> u16 {
        match self {
            Self::Central => 8470,
            Self::Database => 8471,
            Self::DataQueue => 8472,
            Self::File => 8473,
            Self::NetPrint => 8474,
            Self::RemoteCommand => 8475,
            Self::Signon => 8476,
        }
    }

    /// Well-known TLS port.
    pub fn tls_port(self) -> u16 {
        self.default_port() + 1000
    }

    /// Service name as registered in the host's service table.
    pub fn service_name(self) -> &'static str {
        match self {
            Self::Central => "as-central",
            Self::File => "as-file",
            Self::NetPrint => "as-netprt",
            Self::Database => "as-database",
            Self::DataQueue => "as-dtaq",
            Self::RemoteCommand => "as-rmtcmd",
            Self::Signon => "as-signon",
        }
    }

    /// Whether the server needs the seed exchange and start-server request
    /// before it accepts work. Only the signon server authenticates inline.
    pub fn requires_start(self) -> bool {
        self != Self::Signon
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_name())
    }
}

impl TryFrom<u16> for ServerId {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self> {
        Self::from_u16(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_server_round_trips_its_wire_value() {
        for server in ServerId::ALL {
            assert_eq!(ServerId::from_u16(server.to_u16()), Ok(server));
        }
    }

    #[test]
    fn unknown_server_rejected() {
        assert_eq!(ServerId::from_u16(0xE001), Err(ProtocolError::UnknownServer(0xE001)));
    }

    #[test]
    fn ports_follow_service_table() {
        assert_eq!(ServerId::Signon.default_port(), 8476);
        assert_eq!(ServerId::File.tls_port(), 9473);
        assert!(!ServerId::Signon.requires_start());
        assert!(ServerId::DataQueue.requires_start());
    }
}
