//! In-process transport: every connect gets a fresh `tokio::io::duplex` pipe
//! with the mock host serving the other end.

use std::io;

use async_trait::async_trait;
use hoststream_core::Transport;
use tokio::io::DuplexStream;

use crate::mock_host::{Endpoint, MockHost};

const PIPE_CAPACITY: usize = 64 * 1024;

/// Connects to a [`MockHost`] without sockets. The host name is ignored;
/// the port picks the endpoint.
#[derive(Debug, Clone)]
pub struct DuplexTransport {
    host: MockHost,
}

impl DuplexTransport {
    /// Transport serving `host`.
    pub fn new(host: MockHost) -> Self {
        Self { host }
    }

    /// The host behind this transport.
    pub fn host(&self) -> &MockHost {
        &self.host
    }
}

#[async_trait]
impl Transport for DuplexTransport {
    type Stream = DuplexStream;

    async fn connect(&self, host: &str, port: u16) -> io::Result<DuplexStream> {
        let Some(endpoint) = Endpoint::for_port(port) else {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, format!("{host}:{port} is not listening")));
        };
        let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
        let mock = self.host.clone();
        tokio::spawn(async move {
            if let Err(err) = mock.serve(endpoint, server).await {
                tracing::debug!(?endpoint, error = %err, "mock connection ended");
            }
        });
        Ok(client)
    }
}
