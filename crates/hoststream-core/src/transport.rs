//! Transport abstraction for host connections.
//!
//! Every host server speaks over one plain byte stream per connection, so the
//! abstraction is a single `connect`. Production uses Tokio TCP, tests use
//! in-memory duplex pipes or Turmoil's simulated TCP.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Opens byte streams to a host.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Bidirectional stream to one server port.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Connect to `host:port`, returning once the stream is usable.
    async fn connect(&self, host: &str, port: u16) -> io::Result<Self::Stream>;
}
