//! Turmoil-backed transport and listener.

use std::{
    io,
    net::{IpAddr, Ipv4Addr},
};

use async_trait::async_trait;
use hoststream_core::Transport;
use turmoil::net::{TcpListener, TcpStream};

use crate::mock_host::{Endpoint, MockHost};

/// Connects over Turmoil's simulated network, so latency, partitions and
/// host crashes come from the simulation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimTransport;

#[async_trait]
impl Transport for SimTransport {
    type Stream = TcpStream;

    async fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        TcpStream::connect(format!("{host}:{port}")).await
    }
}

/// Serve every endpoint of `host` on its well-known port. Run it as a
/// Turmoil host:
///
/// ```no_run
/// # use hoststream_harness::{MockHost, serve_simulated};
/// let mut sim = turmoil::Builder::new().build();
/// let host = MockHost::new().with_user("bob", "secret");
/// sim.host("as400", move || serve_simulated(host.clone()));
/// ```
pub async fn serve_simulated(host: MockHost) -> turmoil::Result {
    let mut accept_loops = Vec::new();
    for endpoint in Endpoint::all() {
        let listener = TcpListener::bind((IpAddr::from(Ipv4Addr::UNSPECIFIED), endpoint.port())).await?;
        accept_loops.push(tokio::spawn(accept(host.clone(), endpoint, listener)));
    }
    for task in accept_loops {
        task.await??;
    }
    Ok(())
}

async fn accept(host: MockHost, endpoint: Endpoint, listener: TcpListener) -> io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::debug!(?endpoint, %peer, "mock host accepted connection");
        let host = host.clone();
        tokio::spawn(async move {
            if let Err(err) = host.serve(endpoint, stream).await {
                tracing::debug!(?endpoint, error = %err, "mock connection ended");
            }
        });
    }
}
