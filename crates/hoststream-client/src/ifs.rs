//! Integrated file system operations.
//!
//! Whole-file reads and writes are split into blocks no larger than both the
//! configured block size and the largest block the server announced during
//! the attribute exchange. Every open handle is closed again, also when a
//! block transfer fails.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use hoststream_core::SessionInfo;
use hoststream_proto::{
    ErrorKind, HostError, ServerId,
    ifs::{
        self, AccessMode, CloseRequest, CreateDirectoryRequest, DeleteDirectoryRequest, DeleteFileRequest,
        FileEntry, ListAttributesRequest, OpenOption, OpenReply, OpenRequest, ReadReply, ReadRequest,
        RenameRequest, ShareMode, WriteReply, WriteRequest,
    },
};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    connection::HostConnection,
    error::{ClientError, Result},
};

/// Binary data, no conversion.
pub const CCSID_BINARY: u16 = 65535;

/// Most bytes reserved before a read, whatever size the host reports.
const MAX_READ_PREALLOCATION: usize = 1 << 20;

/// Contents of a file read in full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContents {
    /// CCSID the host tags the data with
    pub data_ccsid: u16,
    /// File bytes
    pub data: Bytes,
}

/// File-server client over a pooled connection.
#[derive(Debug)]
pub struct IfsClient<S> {
    connection: Arc<HostConnection<S>>,
    block_size: u32,
}

impl<S> IfsClient<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub(crate) fn new(connection: Arc<HostConnection<S>>, info: &SessionInfo, block_size: u32) -> Self {
        let negotiated = info.ifs_attributes.map_or(block_size, |attrs| attrs.max_data_block);
        Self { connection, block_size: block_size.min(negotiated).max(1) }
    }

    /// Bytes moved per read or write request.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Attributes of one file or directory.
    pub async fn metadata(&self, path: &str) -> Result<FileEntry> {
        let mut entries = self.list_pattern(path).await?;
        if entries.is_empty() {
            return Err(not_found(path));
        }
        Ok(entries.swap_remove(0))
    }

    /// Whether `path` names an existing object.
    pub async fn exists(&self, path: &str) -> Result<bool> {
        match self.metadata(path).await {
            Ok(_) => Ok(true),
            Err(err) if matches!(err.kind(), Some(ErrorKind::ObjectNotFound | ErrorKind::PathNotFound)) => {
                Ok(false)
            },
            Err(err) => Err(err),
        }
    }

    /// Entries of directory `dir`.
    pub async fn list(&self, dir: &str) -> Result<Vec<FileEntry>> {
        let pattern = format!("{}/*", dir.trim_end_matches('/'));
        self.list_pattern(&pattern).await
    }

    async fn list_pattern(&self, pattern: &str) -> Result<Vec<FileEntry>> {
        let request = ListAttributesRequest { pattern: pattern.to_string(), max_entries: u16::MAX };
        let replies = self.connection.request_chain(&request).await?;
        Ok(ifs::collect_listing(&replies)?)
    }

    /// Read a whole file.
    pub async fn read(&self, path: &str) -> Result<FileContents> {
        let open = self.open(path, AccessMode::READ, OpenOption::OpenExisting).await?;
        let result = self.read_blocks(&open).await;
        self.close_handle(open.handle, result).await
    }

    async fn read_blocks(&self, open: &OpenReply) -> Result<FileContents> {
        // The reported size is only a hint; the buffer grows with each block.
        let capacity =
            usize::try_from(open.size).map_or(0, |size| size.min(MAX_READ_PREALLOCATION));
        let mut data = BytesMut::with_capacity(capacity);
        let mut data_ccsid = open.data_ccsid;
        loop {
            let request =
                ReadRequest { handle: open.handle, offset: data.len() as u64, length: self.block_size };
            let ds = self.connection.exchange(&request).await?;
            let reply = match ifs::expect::<ReadReply>(&ds) {
                Ok(reply) => reply,
                Err(err) if matches!(err.kind(), Some(ErrorKind::NoData)) => break,
                Err(err) => return Err(err.into()),
            };
            data_ccsid = reply.data_ccsid;
            let short = reply.data.len() < self.block_size as usize;
            data.extend_from_slice(&reply.data);
            if short {
                break;
            }
        }
        tracing::debug!(handle = open.handle, bytes = data.len(), "file read");
        Ok(FileContents { data_ccsid, data: data.freeze() })
    }

    /// Create or replace `path` with `data`, tagged with `ccsid`.
    pub async fn write(&self, path: &str, data: &[u8], ccsid: u16) -> Result<()> {
        let request = OpenRequest {
            name: path.to_string(),
            access: AccessMode::WRITE,
            share: ShareMode::DenyWrite,
            option: OpenOption::CreateOrReplace,
            create_ccsid: ccsid,
        };
        let open: OpenReply = ifs::expect(&self.connection.exchange(&request).await?)?;
        let result = self.write_blocks(open.handle, data).await;
        self.close_handle(open.handle, result).await
    }

    async fn write_blocks(&self, handle: u32, data: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        for block in data.chunks(self.block_size as usize) {
            let request = WriteRequest {
                handle,
                offset: offset as u64,
                sync: false,
                data: Bytes::copy_from_slice(block),
            };
            let reply: WriteReply = ifs::expect(&self.connection.exchange(&request).await?)?;
            ifs::check(reply.return_code)?;
            if reply.bytes_written as usize != block.len() {
                return Err(ClientError::Host(
                    HostError::new(ServerId::File, u32::from(ifs::rc::RESOURCE_LIMIT), ErrorKind::ResourceLimit)
                        .with_message(format!("short write: {} of {} bytes", reply.bytes_written, block.len())),
                ));
            }
            offset += block.len();
        }
        Ok(())
    }

    async fn open(&self, path: &str, access: AccessMode, option: OpenOption) -> Result<OpenReply> {
        let request = OpenRequest {
            name: path.to_string(),
            access,
            share: ShareMode::DenyNone,
            option,
            create_ccsid: CCSID_BINARY,
        };
        Ok(ifs::expect(&self.connection.exchange(&request).await?)?)
    }

    /// Close `handle`. A transfer error wins over a close error.
    async fn close_handle<T>(&self, handle: u32, result: Result<T>) -> Result<T> {
        let closed = self.simple(&CloseRequest { handle, sync: true }).await;
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(err), closed) => {
                if let Err(close_err) = closed {
                    tracing::warn!(handle, error = %close_err, "close after failed transfer");
                }
                Err(err)
            },
            (Ok(_), Err(err)) => Err(err),
        }
    }

    /// Create directory `path`.
    pub async fn create_dir(&self, path: &str) -> Result<()> {
        self.simple(&CreateDirectoryRequest { name: path.to_string() }).await
    }

    /// Remove the empty directory `path`.
    pub async fn delete_dir(&self, path: &str) -> Result<()> {
        self.simple(&DeleteDirectoryRequest { name: path.to_string() }).await
    }

    /// Delete file `path`.
    pub async fn delete_file(&self, path: &str) -> Result<()> {
        self.simple(&DeleteFileRequest { name: path.to_string() }).await
    }

    /// Rename `source` to `target`, replacing `target` only if `replace`.
    pub async fn rename(&self, source: &str, target: &str, replace: bool) -> Result<()> {
        self.simple(&RenameRequest { source: source.to_string(), target: target.to_string(), replace })
            .await
    }

    async fn simple<R: hoststream_proto::Request>(&self, request: &R) -> Result<()> {
        let ds = self.connection.exchange(request).await?;
        ifs::expect_success(&ds)?;
        Ok(())
    }
}

fn not_found(path: &str) -> ClientError {
    ClientError::Host(
        HostError::new(ServerId::File, u32::from(ifs::rc::FILE_NOT_FOUND), ErrorKind::ObjectNotFound)
            .with_message(path.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hoststream_proto::{DataStream, Reply, header::DEFAULT_MAX_LENGTH, ifs::ReturnCodeReply};
    use tokio::io::DuplexStream;

    use super::*;
    use crate::{
        connection::ConnectionOptions,
        io::{read_data_stream, write_data_stream},
    };

    async fn answer<R: Reply>(host: &mut DuplexStream, request_id: u16, reply: &R) {
        let request = read_data_stream(host, DEFAULT_MAX_LENGTH).await.unwrap();
        assert_eq!(request.request_id(), request_id);
        let ds = DataStream::from_reply(ServerId::File, reply).unwrap();
        write_data_stream(host, &ds.with_correlation_id(request.correlation_id())).await.unwrap();
    }

    #[tokio::test]
    async fn reported_file_size_is_not_trusted_for_allocation() {
        let (stream, mut host) = tokio::io::duplex(1 << 16);
        let options = ConnectionOptions {
            request_timeout: Duration::from_secs(5),
            max_data_stream_len: DEFAULT_MAX_LENGTH,
        };
        let connection = Arc::new(HostConnection::new(stream, ServerId::File, options));
        let client = IfsClient::new(connection, &SessionInfo::default(), 1024);

        let host_task = tokio::spawn(async move {
            let open = OpenReply { handle: 1, data_ccsid: 1208, size: 1 << 62, modified: 0 };
            answer(&mut host, ifs::id::OPEN, &open).await;
            let block = ReadReply { data_ccsid: 1208, data: Bytes::from_static(b"hello") };
            answer(&mut host, ifs::id::READ, &block).await;
            answer(&mut host, ifs::id::CLOSE, &ReturnCodeReply { chain: 0, return_code: 0 }).await;
        });

        let contents = client.read("/huge").await.unwrap();
        assert_eq!(contents.data, Bytes::from_static(b"hello"));
        assert_eq!(contents.data_ccsid, 1208);
        host_task.await.unwrap();
    }
}
