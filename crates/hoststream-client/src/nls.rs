//! Conversion-table sources backed by the central server.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use hoststream_core::{Environment, TableFetchError, TableSource, Transport};
use hoststream_proto::{
    Ccsid, ServerId,
    central::{RetrieveConversionMapReply, RetrieveConversionMapRequest},
};

use crate::{
    connection::HostConnection,
    error::ClientError,
    system::Connector,
};

async fn retrieve<S>(connection: &HostConnection<S>, ccsid: Ccsid) -> Result<Bytes, ClientError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + 'static,
{
    let reply: RetrieveConversionMapReply =
        connection.request(&RetrieveConversionMapRequest::single_byte(ccsid)).await?;
    Ok(reply.into_table()?)
}

fn classify(err: ClientError) -> TableFetchError {
    if err.is_transient() {
        TableFetchError::Transient(err.to_string())
    } else {
        TableFetchError::Permanent(err.to_string())
    }
}

/// Downloads over the pooled central-server connection.
pub(crate) struct SharedCentralSource<T: Transport, E> {
    connector: Arc<Connector<T, E>>,
}

impl<T: Transport, E: Environment> SharedCentralSource<T, E> {
    pub(crate) fn new(connector: Arc<Connector<T, E>>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl<T: Transport, E: Environment> TableSource for SharedCentralSource<T, E> {
    fn name(&self) -> &str {
        "central"
    }

    async fn fetch(&self, ccsid: Ccsid) -> Result<Bytes, TableFetchError> {
        let established = self.connector.pooled(ServerId::Central).await.map_err(classify)?;
        retrieve(&established.connection, ccsid).await.map_err(classify)
    }
}

/// Downloads over a new central-server connection per attempt, for when the
/// pooled one is wedged.
pub(crate) struct FreshCentralSource<T: Transport, E> {
    connector: Arc<Connector<T, E>>,
}

impl<T: Transport, E: Environment> FreshCentralSource<T, E> {
    pub(crate) fn new(connector: Arc<Connector<T, E>>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl<T: Transport, E: Environment> TableSource for FreshCentralSource<T, E> {
    fn name(&self) -> &str {
        "central (fresh connection)"
    }

    async fn fetch(&self, ccsid: Ccsid) -> Result<Bytes, TableFetchError> {
        let established = self.connector.open_service(ServerId::Central).await.map_err(classify)?;
        let result = retrieve(&established.connection, ccsid).await;
        established.connection.close("table retrieved");
        result.map_err(classify)
    }
}

#[cfg(test)]
mod tests {
    use hoststream_proto::{ErrorKind, HostError};

    use super::*;

    #[test]
    fn missing_table_is_permanent() {
        let err = ClientError::Host(HostError::new(ServerId::Central, 3, ErrorKind::ObjectNotFound));
        assert!(matches!(classify(err), TableFetchError::Permanent(_)));
    }

    #[test]
    fn busy_host_and_dropped_connection_are_transient() {
        let busy = ClientError::Host(HostError::new(ServerId::Central, 4, ErrorKind::ResourceLimit));
        assert!(matches!(classify(busy), TableFetchError::Transient(_)));
        let closed = ClientError::ConnectionClosed { reason: "reset".into() };
        assert!(matches!(classify(closed), TableFetchError::Transient(_)));
    }
}
