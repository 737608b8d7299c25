//! Client configuration.

use std::{collections::BTreeMap, time::Duration};

use hoststream_core::{RetryPolicy, SessionConfig};
use hoststream_proto::{
    ServerId,
    header::{DataStreamHeader, DEFAULT_MAX_LENGTH},
    server::DDM_PORT,
};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Connection settings for one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Host name or address
    pub host: String,
    /// Ports that differ from the well-known ones
    pub port_overrides: BTreeMap<ServerId, u16>,
    /// DDM listener port
    pub ddm_port: u16,
    /// Time allowed to open a TCP connection
    pub connect_timeout: Duration,
    /// Time allowed for each request's final reply
    pub request_timeout: Duration,
    /// Largest data stream accepted from the host
    pub max_data_stream_len: usize,
    /// Bytes per file-server read or write request
    pub ifs_block_size: u32,
    /// Conversion-table download retries
    pub retry: RetryPolicy,
    /// Handshake settings
    pub session: SessionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port_overrides: BTreeMap::new(),
            ddm_port: DDM_PORT,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_data_stream_len: DEFAULT_MAX_LENGTH,
            ifs_block_size: 64 * 1024,
            retry: RetryPolicy::default(),
            session: SessionConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults for `host`.
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into(), ..Self::default() }
    }

    /// Override the port of one server.
    #[must_use]
    pub fn with_port(mut self, server: ServerId, port: u16) -> Self {
        self.port_overrides.insert(server, port);
        self
    }

    /// Port to connect to for `server`.
    pub fn port(&self, server: ServerId) -> u16 {
        self.port_overrides.get(&server).copied().unwrap_or_else(|| server.default_port())
    }

    /// Reject settings that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ClientError::InvalidConfig("host is empty".into()));
        }
        if let Some((server, _)) = self.port_overrides.iter().find(|(_, port)| **port == 0) {
            return Err(ClientError::InvalidConfig(format!("port for {server} is 0")));
        }
        if self.ddm_port == 0 {
            return Err(ClientError::InvalidConfig("DDM port is 0".into()));
        }
        for (name, value) in [
            ("connect timeout", self.connect_timeout),
            ("request timeout", self.request_timeout),
            ("handshake timeout", self.session.handshake_timeout),
        ] {
            if value.is_zero() {
                return Err(ClientError::InvalidConfig(format!("{name} is zero")));
            }
        }
        if self.max_data_stream_len < DataStreamHeader::SIZE {
            return Err(ClientError::InvalidConfig(format!(
                "maximum data stream length {} is below the header size",
                self.max_data_stream_len
            )));
        }
        // A full read reply must fit in one data stream.
        let block = self.ifs_block_size as usize;
        if block == 0 || block + 256 > self.max_data_stream_len {
            return Err(ClientError::InvalidConfig(format!(
                "file block size {block} does not fit the maximum data stream length"
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ClientError::InvalidConfig("retry policy allows no attempts".into()));
        }
        if self.session.nlv.len() != 4 || !self.session.nlv.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ClientError::InvalidConfig(format!(
                "national language version {:?} is not four digits",
                self.session.nlv
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ClientConfig::new("as400.example.com").validate().unwrap();
    }

    #[test]
    fn port_overrides() {
        let config = ClientConfig::new("h").with_port(ServerId::File, 18473);
        assert_eq!(config.port(ServerId::File), 18473);
        assert_eq!(config.port(ServerId::Signon), 8476);
    }

    #[test]
    fn rejects_bad_settings() {
        let cases = [
            ClientConfig::new(" "),
            ClientConfig::new("h").with_port(ServerId::Central, 0),
            ClientConfig { request_timeout: Duration::ZERO, ..ClientConfig::new("h") },
            ClientConfig { ifs_block_size: 0, ..ClientConfig::new("h") },
            ClientConfig { max_data_stream_len: 1024, ..ClientConfig::new("h") },
            ClientConfig {
                retry: RetryPolicy { max_attempts: 0, ..RetryPolicy::default() },
                ..ClientConfig::new("h")
            },
            ClientConfig {
                session: SessionConfig { nlv: "29".into(), ..SessionConfig::default() },
                ..ClientConfig::new("h")
            },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(ClientError::InvalidConfig(_))),
                "accepted {config:?}"
            );
        }
    }
}
