//! Spooled file operations on the network print server.

use std::sync::Arc;

use hoststream_proto::{
    ProtocolError, ServerId,
    print::{
        self, Action, ListSpooledFilesRequest, SpooledFile, SpooledFileAttributes, SpooledFileId,
        SpooledFileRequest,
    },
};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{connection::HostConnection, error::Result};

/// Print-server client over a pooled connection.
#[derive(Debug)]
pub struct PrintClient<S> {
    connection: Arc<HostConnection<S>>,
}

impl<S> PrintClient<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub(crate) fn new(connection: Arc<HostConnection<S>>) -> Self {
        Self { connection }
    }

    /// Spooled files, optionally only those of `user` or on `output_queue`.
    pub async fn list(&self, user: Option<&str>, output_queue: Option<&str>) -> Result<Vec<SpooledFile>> {
        let request = ListSpooledFilesRequest {
            user: user.map(str::to_string),
            output_queue: output_queue.map(str::to_string),
        };
        let reply = print::expect(&self.connection.exchange(&request).await?)?;
        tracing::debug!(count = reply.entries.len(), "spooled files listed");
        Ok(reply.entries)
    }

    /// Current attributes of one spooled file.
    pub async fn attributes(&self, id: &SpooledFileId) -> Result<SpooledFileAttributes> {
        let reply = self.act(Action::RetrieveAttributes, id).await?;
        let attributes = reply.attributes.ok_or(ProtocolError::MissingCodePoint(print::cp::STATUS))?;
        Ok(attributes)
    }

    /// Hold a spooled file so it does not print.
    pub async fn hold(&self, id: &SpooledFileId) -> Result<()> {
        self.act(Action::Hold, id).await.map(drop)
    }

    /// Release a held spooled file.
    pub async fn release(&self, id: &SpooledFileId) -> Result<()> {
        self.act(Action::Release, id).await.map(drop)
    }

    /// Delete a spooled file.
    pub async fn delete(&self, id: &SpooledFileId) -> Result<()> {
        self.act(Action::Delete, id).await.map(drop)
    }

    async fn act(&self, action: Action, id: &SpooledFileId) -> Result<print::PrintReply> {
        let request = SpooledFileRequest { action, id: id.clone() };
        let reply = print::expect(&self.connection.exchange(&request).await?)?;
        tracing::debug!(server = %ServerId::NetPrint, ?action, file = %id.file_name, "spooled file updated");
        Ok(reply)
    }
}
