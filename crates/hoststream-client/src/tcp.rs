//! Plain TCP transport.

use std::io;

use async_trait::async_trait;
use hoststream_core::Transport;
use tokio::net::TcpStream;

/// Connects with [`TcpStream`], Nagle disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

#[async_trait]
impl Transport for TcpTransport {
    type Stream = TcpStream;

    async fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        tracing::debug!(host, port, "connected");
        Ok(stream)
    }
}
