//! Data queue operations.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use hoststream_proto::{
    ErrorKind,
    dataqueue::{
        self, Authority, ClearRequest, CreateRequest, DeleteRequest, KeySearch, QueryAttributesReply,
        QueryAttributesRequest, QueueAttributes, QueueName, ReadReply, ReadRequest, WriteRequest,
    },
};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{connection::HostConnection, error::Result};

/// How long a read waits for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Return at once
    NoWait,
    /// Up to this many seconds
    Seconds(u32),
    /// Until an entry arrives
    Forever,
}

impl Wait {
    fn seconds(self) -> i32 {
        match self {
            Self::NoWait => 0,
            Self::Seconds(s) => i32::try_from(s).unwrap_or(i32::MAX),
            Self::Forever => -1,
        }
    }
}

/// An entry taken from (or seen on) a queue.
pub type Entry = ReadReply;

/// Data-queue client over a pooled connection.
#[derive(Debug)]
pub struct DataQueueClient<S> {
    connection: Arc<HostConnection<S>>,
    request_timeout: Duration,
}

impl<S> DataQueueClient<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub(crate) fn new(connection: Arc<HostConnection<S>>, request_timeout: Duration) -> Self {
        Self { connection, request_timeout }
    }

    /// Create `queue`.
    pub async fn create(&self, queue: &QueueName, attributes: QueueAttributes, authority: Authority) -> Result<()> {
        let request = CreateRequest { queue: queue.clone(), attributes, authority };
        dataqueue::expect_success(&self.connection.exchange(&request).await?)?;
        tracing::debug!(%queue, "data queue created");
        Ok(())
    }

    /// Delete `queue`.
    pub async fn delete(&self, queue: &QueueName) -> Result<()> {
        let request = DeleteRequest { queue: queue.clone() };
        dataqueue::expect_success(&self.connection.exchange(&request).await?)?;
        Ok(())
    }

    /// Remove all entries, or only those with `key` on a keyed queue.
    pub async fn clear(&self, queue: &QueueName, key: Option<Bytes>) -> Result<()> {
        let request = ClearRequest { queue: queue.clone(), key };
        dataqueue::expect_success(&self.connection.exchange(&request).await?)?;
        Ok(())
    }

    /// Append `entry`. `key` is required on keyed queues.
    pub async fn write(&self, queue: &QueueName, entry: Bytes, key: Option<Bytes>) -> Result<()> {
        let request = WriteRequest { queue: queue.clone(), entry, key };
        dataqueue::expect_success(&self.connection.exchange(&request).await?)?;
        Ok(())
    }

    /// Remove and return the next entry. `None` when the wait expires.
    pub async fn read(&self, queue: &QueueName, wait: Wait) -> Result<Option<Entry>> {
        self.receive(ReadRequest { queue: queue.clone(), wait_seconds: wait.seconds(), peek: false, key: None })
            .await
    }

    /// Return the next entry without removing it.
    pub async fn peek(&self, queue: &QueueName, wait: Wait) -> Result<Option<Entry>> {
        self.receive(ReadRequest { queue: queue.clone(), wait_seconds: wait.seconds(), peek: true, key: None })
            .await
    }

    /// Remove and return the first entry whose key satisfies `search`
    /// against `key`.
    pub async fn read_keyed(
        &self,
        queue: &QueueName,
        search: KeySearch,
        key: Bytes,
        wait: Wait,
    ) -> Result<Option<Entry>> {
        let request =
            ReadRequest { queue: queue.clone(), wait_seconds: wait.seconds(), peek: false, key: Some((search, key)) };
        self.receive(request).await
    }

    /// Current attributes of `queue`.
    pub async fn attributes(&self, queue: &QueueName) -> Result<QueueAttributes> {
        let request = QueryAttributesRequest { queue: queue.clone() };
        let reply: QueryAttributesReply = dataqueue::expect(&self.connection.exchange(&request).await?)?;
        Ok(reply.attributes)
    }

    async fn receive(&self, request: ReadRequest) -> Result<Option<Entry>> {
        // The host holds the reply for the whole wait.
        let ds = match request.wait_seconds {
            w if w < 0 => self.connection.exchange_within(&request, Duration::MAX).await?,
            0 => self.connection.exchange(&request).await?,
            w => {
                let limit = self.request_timeout + Duration::from_secs(w.unsigned_abs().into());
                self.connection.exchange_within(&request, limit).await?
            },
        };
        match dataqueue::expect::<ReadReply>(&ds) {
            Ok(entry) => Ok(Some(entry)),
            Err(err) if err.kind() == Some(ErrorKind::NoData) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}
