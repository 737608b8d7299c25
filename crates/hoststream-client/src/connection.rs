//! One multiplexed connection to a host server.
//!
//! The stream is split: writers share the write half behind an async mutex
//! so frames never interleave, and a reader task owns the read half. The
//! reader matches each incoming data stream through the [`Correlator`] and
//! forwards it to the waiting request. Replies may arrive in any order.
//!
//! On an I/O or framing error the reader marks the connection closed and
//! fails every pending request with [`ClientError::ConnectionClosed`].
//!
//! A request stays registered only while its caller waits: when the
//! request future finishes, times out or is dropped, its correlator entry
//! and reply channel go with it.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use hoststream_core::{
    Correlator, CorrelationError, Environment, Session, SessionAction, SessionInfo,
};
use hoststream_proto::{DataStream, Reply, ReplyMode, Request, ServerId};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf},
    sync::mpsc,
    task::JoinHandle,
};

use crate::{
    error::{ClientError, Result},
    io::{read_data_stream, write_data_stream},
};

/// Per-connection limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Time allowed for each request's final reply
    pub request_timeout: Duration,
    /// Largest data stream accepted
    pub max_data_stream_len: usize,
}

type ReplySender = mpsc::UnboundedSender<Result<(DataStream, bool)>>;

#[derive(Debug)]
struct Inner {
    correlator: Correlator,
    waiters: HashMap<u32, ReplySender>,
    closed: Option<String>,
}

impl Inner {
    fn fail_all(&mut self, reason: &str) {
        if self.closed.is_none() {
            self.closed = Some(reason.to_string());
        }
        self.correlator.drain();
        for (_, waiter) in self.waiters.drain() {
            let _ = waiter.send(Err(ClientError::closed(reason)));
        }
    }
}

#[derive(Debug)]
struct Shared {
    server: ServerId,
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, ds: DataStream) {
        let mut inner = self.lock();
        match inner.correlator.match_reply(&ds) {
            Ok(disposition) => {
                let waiter = if disposition.last {
                    inner.waiters.remove(&disposition.correlation_id)
                } else {
                    inner.waiters.get(&disposition.correlation_id).cloned()
                };
                if let Some(waiter) = waiter {
                    let _ = waiter.send(Ok((ds, disposition.last)));
                }
            },
            Err(CorrelationError::UnknownCorrelation(id)) => {
                // Late reply to a request that already timed out.
                tracing::debug!(server = %self.server, correlation_id = id, "dropping unmatched reply");
            },
            Err(err @ CorrelationError::UnexpectedReply { correlation_id, .. }) => {
                if let Some(waiter) = inner.waiters.remove(&correlation_id) {
                    let _ = waiter.send(Err(err.into()));
                }
            },
        }
    }
}

/// Unregisters a request when its caller stops waiting for it.
struct PendingGuard<'a> {
    shared: &'a Shared,
    correlation_id: u32,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        inner.correlator.complete(self.correlation_id);
        inner.waiters.remove(&self.correlation_id);
    }
}

/// A connection to one server with any number of requests in flight.
#[derive(Debug)]
pub struct HostConnection<S> {
    shared: Arc<Shared>,
    writer: tokio::sync::Mutex<WriteHalf<S>>,
    options: ConnectionOptions,
    reader: JoinHandle<()>,
}

impl<S> HostConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Take over `stream` and start the reader task.
    pub fn new(stream: S, server: ServerId, options: ConnectionOptions) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let shared = Arc::new(Shared {
            server,
            inner: Mutex::new(Inner {
                correlator: Correlator::new(options.request_timeout),
                waiters: HashMap::new(),
                closed: None,
            }),
        });
        let reader = tokio::spawn(read_loop(read_half, Arc::clone(&shared), options.max_data_stream_len));
        Self { shared, writer: tokio::sync::Mutex::new(write_half), options, reader }
    }

    /// Server this connection talks to.
    pub fn server(&self) -> ServerId {
        self.shared.server
    }

    /// Whether the connection has failed or been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed.is_some()
    }

    /// Requests waiting for replies.
    pub fn pending(&self) -> usize {
        self.shared.lock().correlator.pending_len()
    }

    /// Close the connection, failing anything still pending.
    pub fn close(&self, reason: &str) {
        self.shared.lock().fail_all(reason);
        self.reader.abort();
    }

    /// Run a session handshake over this connection.
    pub async fn establish<E: Environment>(&self, session: &mut Session, env: &E) -> Result<SessionInfo> {
        let mut actions = session.begin(env.now())?;
        loop {
            let mut next = Vec::new();
            for action in actions {
                match action {
                    SessionAction::Send(ds) => {
                        let mut replies =
                            self.send_raw(ds, session.expected_replies(), ReplyMode::Single).await?;
                        let reply = replies.pop().ok_or_else(|| ClientError::closed("no handshake reply"))?;
                        next.extend(session.handle_reply(&reply, env.now())?);
                    },
                    SessionAction::Ready(info) => return Ok(info),
                    SessionAction::Close { reason } => {
                        self.close(&reason);
                        return Err(ClientError::closed(reason));
                    },
                }
            }
            if next.is_empty() {
                return Err(ClientError::closed("handshake stalled"));
            }
            actions = next;
        }
    }

    /// Send `request` and decode its single reply as `Rep`.
    pub async fn request<Req, Rep>(&self, request: &Req) -> Result<Rep>
    where
        Req: Request + ?Sized,
        Rep: Reply,
    {
        let ds = self.exchange(request).await?;
        Ok(ds.parse_reply::<Rep>()?)
    }

    /// Send `request` and return its single reply undecoded, so the caller
    /// can handle the server's generic return-code reply.
    pub async fn exchange<Req: Request + ?Sized>(&self, request: &Req) -> Result<DataStream> {
        let ds = DataStream::from_request(request)?;
        let mut replies = self.send_raw(ds, request.reply_ids(), ReplyMode::Single).await?;
        replies.pop().ok_or_else(|| ClientError::closed("no reply"))
    }

    /// Send `request` and collect every reply of its chain.
    pub async fn request_chain<Req: Request + ?Sized>(&self, request: &Req) -> Result<Vec<DataStream>> {
        let ds = DataStream::from_request(request)?;
        self.send_raw(ds, request.reply_ids(), request.reply_mode()).await
    }

    /// Like [`exchange`](Self::exchange), allowing `timeout` instead of the
    /// connection's request timeout. Used by requests the host may hold.
    pub async fn exchange_within<Req: Request + ?Sized>(
        &self,
        request: &Req,
        timeout: Duration,
    ) -> Result<DataStream> {
        let ds = DataStream::from_request(request)?;
        let mut replies = self.send_within(ds, request.reply_ids(), ReplyMode::Single, timeout).await?;
        replies.pop().ok_or_else(|| ClientError::closed("no reply"))
    }

    /// Send an encoded data stream. Its correlation id is replaced.
    pub async fn send_raw(
        &self,
        ds: DataStream,
        reply_ids: &'static [u16],
        mode: ReplyMode,
    ) -> Result<Vec<DataStream>> {
        self.send_within(ds, reply_ids, mode, self.options.request_timeout).await
    }

    async fn send_within(
        &self,
        mut ds: DataStream,
        reply_ids: &'static [u16],
        mode: ReplyMode,
        timeout: Duration,
    ) -> Result<Vec<DataStream>> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let correlation_id = {
            let mut inner = self.shared.lock();
            if let Some(reason) = &inner.closed {
                return Err(ClientError::closed(reason.clone()));
            }
            let now = tokio::time::Instant::now().into_std();
            let id = inner.correlator.register(ds.server(), ds.request_id(), reply_ids, mode, now);
            inner.waiters.insert(id, tx);
            id
        };
        let _pending = PendingGuard { shared: &self.shared, correlation_id };
        ds.set_correlation_id(correlation_id);
        tracing::debug!(
            server = %ds.server(),
            request_id = format_args!("0x{:04X}", ds.request_id()),
            correlation_id,
            "send"
        );

        let written = {
            let mut writer = self.writer.lock().await;
            write_data_stream(&mut *writer, &ds).await
        };
        if let Err(err) = written {
            tracing::warn!(server = %self.server(), error = %err, "write failed, closing connection");
            self.shared.lock().fail_all(&err.to_string());
            return Err(err);
        }

        let collect = async {
            let mut replies = Vec::new();
            while let Some(item) = rx.recv().await {
                let (reply, last) = item?;
                replies.push(reply);
                if last {
                    return Ok(replies);
                }
            }
            Err(ClientError::closed("reader stopped"))
        };
        match tokio::time::timeout(timeout, collect).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(server = %self.server(), correlation_id, "request timed out");
                Err(ClientError::Timeout { server: self.server(), operation: "request" })
            },
        }
    }
}

impl<S> Drop for HostConnection<S> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop<S: AsyncRead>(mut reader: ReadHalf<S>, shared: Arc<Shared>, max_len: usize) {
    loop {
        match read_data_stream(&mut reader, max_len).await {
            Ok(ds) => shared.dispatch(ds),
            Err(err) => {
                match &err {
                    ClientError::ConnectionClosed { .. } => {
                        tracing::debug!(server = %shared.server, "connection closed by host");
                    },
                    other => tracing::warn!(server = %shared.server, error = %other, "read failed"),
                }
                shared.lock().fail_all(&err.to_string());
                return;
            },
        }
    }
}
