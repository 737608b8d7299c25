//! Entry point: one host, one set of credentials, lazily opened servers.
//!
//! A [`HostSystem`] opens at most one connection per server and runs that
//! server's handshake before handing it out. The signon server is contacted
//! first, once, to learn the host password level that every other server's
//! start request depends on. Conversion tables are downloaded from the
//! central server through a [`ConversionTableCache`] with two sources: the
//! pooled central connection, then a fresh one.

use std::{collections::HashMap, sync::Arc};

use hoststream_core::{
    ConversionTableCache, Credentials, Environment, Session, SessionError, SessionInfo, TableSource,
    Transport,
};
use hoststream_proto::{Ccsid, ServerId, TextCodec};
use tokio::sync::{Mutex, OnceCell};

use crate::{
    config::ClientConfig,
    connection::{ConnectionOptions, HostConnection},
    dataqueue::DataQueueClient,
    ddm::DdmClient,
    error::{ClientError, Result},
    ifs::IfsClient,
    nls::{FreshCentralSource, SharedCentralSource},
    print::PrintClient,
    signon::SignonClient,
};

/// A connection whose handshake has completed.
pub(crate) struct Established<S> {
    pub(crate) connection: Arc<HostConnection<S>>,
    pub(crate) info: SessionInfo,
}

impl<S> Clone for Established<S> {
    fn clone(&self) -> Self {
        Self { connection: Arc::clone(&self.connection), info: self.info.clone() }
    }
}

/// Opens and pools server connections. Shared between [`HostSystem`] and
/// the conversion-table sources.
pub(crate) struct Connector<T: Transport, E> {
    transport: T,
    env: E,
    config: ClientConfig,
    credentials: Credentials,
    signon: OnceCell<SessionInfo>,
    pool: Mutex<HashMap<ServerId, Established<T::Stream>>>,
}

impl<T: Transport, E: Environment> Connector<T, E> {
    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub(crate) fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            request_timeout: self.config.request_timeout,
            max_data_stream_len: self.config.max_data_stream_len,
        }
    }

    /// Open a raw stream to `port`, bounded by the connect timeout.
    pub(crate) async fn connect(&self, server: ServerId, port: u16) -> Result<T::Stream> {
        let host = self.config.host.as_str();
        match tokio::time::timeout(self.config.connect_timeout, self.transport.connect(host, port)).await {
            Ok(stream) => Ok(stream?),
            Err(_) => Err(ClientError::Timeout { server, operation: "connect" }),
        }
    }

    /// Signon result, contacting the signon server on first use.
    pub(crate) async fn signon_info(&self) -> Result<&SessionInfo> {
        self.signon
            .get_or_try_init(|| async {
                let established = self.open(ServerId::Signon, None).await?;
                established.connection.close("signon complete");
                Ok::<_, ClientError>(established.info)
            })
            .await
    }

    /// Connect to `server` and run its handshake on a new connection.
    ///
    /// `password_level` is required for every server except signon.
    pub(crate) async fn open(
        &self,
        server: ServerId,
        password_level: Option<u8>,
    ) -> Result<Established<T::Stream>> {
        let port = self.config.port(server);
        let stream = self.connect(server, port).await?;
        let connection = HostConnection::new(stream, server, self.connection_options());

        let mut session = Session::new(
            server,
            self.credentials.clone(),
            self.env.random_seed(),
            self.config.session.clone(),
            self.env.now(),
        );
        if let Some(level) = password_level {
            session = session.with_password_level(level);
        }

        let limit = self.config.session.handshake_timeout;
        let info = match tokio::time::timeout(limit, connection.establish(&mut session, &self.env)).await {
            Ok(Ok(info)) => info,
            Ok(Err(err)) => {
                connection.close("handshake failed");
                return Err(err);
            },
            Err(_) => {
                connection.close("handshake timed out");
                return Err(SessionError::HandshakeTimeout { elapsed: limit }.into());
            },
        };
        tracing::info!(%server, port, job = info.job_name.as_deref().unwrap_or(""), "server ready");
        Ok(Established { connection: Arc::new(connection), info })
    }

    /// Open `server` with the password level learned from signon.
    pub(crate) async fn open_service(&self, server: ServerId) -> Result<Established<T::Stream>> {
        let level = if server.requires_start() {
            Some(self.signon_info().await?.password_level)
        } else {
            None
        };
        self.open(server, level).await
    }

    /// Pooled connection to `server`, replacing one that has failed.
    pub(crate) async fn pooled(&self, server: ServerId) -> Result<Established<T::Stream>> {
        if server.requires_start() {
            // Learn the password level before taking the pool lock.
            self.signon_info().await?;
        }
        let mut pool = self.pool.lock().await;
        if let Some(existing) = pool.get(&server) {
            if !existing.connection.is_closed() {
                return Ok(existing.clone());
            }
            tracing::debug!(%server, "replacing closed connection");
        }
        let established = self.open_service(server).await?;
        pool.insert(server, established.clone());
        Ok(established)
    }

    async fn close_all(&self) {
        let mut pool = self.pool.lock().await;
        for (_, established) in pool.drain() {
            established.connection.close("client closed");
        }
    }
}

/// Client for every server of one host.
pub struct HostSystem<T: Transport, E: Environment> {
    connector: Arc<Connector<T, E>>,
    tables: Arc<ConversionTableCache<E>>,
}

impl<T: Transport, E: Environment> Clone for HostSystem<T, E> {
    fn clone(&self) -> Self {
        Self { connector: Arc::clone(&self.connector), tables: Arc::clone(&self.tables) }
    }
}

impl<T: Transport, E: Environment> HostSystem<T, E> {
    /// Validate `config` and prepare a client. Nothing is contacted yet.
    pub fn new(transport: T, env: E, config: ClientConfig, credentials: Credentials) -> Result<Self> {
        config.validate()?;
        let retry = config.retry;
        let connector = Arc::new(Connector {
            transport,
            env: env.clone(),
            config,
            credentials,
            signon: OnceCell::new(),
            pool: Mutex::new(HashMap::new()),
        });
        let sources: Vec<Arc<dyn TableSource>> = vec![
            Arc::new(SharedCentralSource::new(Arc::clone(&connector))),
            Arc::new(FreshCentralSource::new(Arc::clone(&connector))),
        ];
        let tables = Arc::new(ConversionTableCache::new(env, retry, sources));
        Ok(Self { connector, tables })
    }

    /// Settings in use.
    pub fn config(&self) -> &ClientConfig {
        self.connector.config()
    }

    /// Sign on, once. Later calls return the first result.
    pub async fn signon(&self) -> Result<SessionInfo> {
        self.connector.signon_info().await.cloned()
    }

    /// Handshake result of the pooled connection to `server`.
    pub async fn session_info(&self, server: ServerId) -> Result<SessionInfo> {
        Ok(self.connector.pooled(server).await?.info)
    }

    /// Pooled connection to `server`, opened on first use.
    pub async fn connection(&self, server: ServerId) -> Result<Arc<HostConnection<T::Stream>>> {
        Ok(self.connector.pooled(server).await?.connection)
    }

    /// Text codec for `ccsid`, downloading its table if needed.
    pub async fn codec(&self, ccsid: Ccsid) -> Result<TextCodec> {
        Ok(self.tables.codec(ccsid).await?)
    }

    /// Signon server operations.
    pub fn signon_client(&self) -> SignonClient<T, E> {
        SignonClient::new(Arc::clone(&self.connector))
    }

    /// Integrated file system operations.
    pub async fn ifs(&self) -> Result<IfsClient<T::Stream>> {
        let established = self.connector.pooled(ServerId::File).await?;
        Ok(IfsClient::new(established.connection, &established.info, self.config().ifs_block_size))
    }

    /// Data queue operations.
    pub async fn data_queues(&self) -> Result<DataQueueClient<T::Stream>> {
        Ok(DataQueueClient::new(self.connection(ServerId::DataQueue).await?, self.config().request_timeout))
    }

    /// Spooled file operations.
    pub async fn print(&self) -> Result<PrintClient<T::Stream>> {
        Ok(PrintClient::new(self.connection(ServerId::NetPrint).await?))
    }

    /// New DDM connection, authenticated with this system's credentials.
    pub async fn ddm(&self) -> Result<DdmClient<T::Stream>> {
        let stream = self.connector.connect(ServerId::Database, self.config().ddm_port).await?;
        let mut client = DdmClient::new(stream, self.config().request_timeout);
        client.authenticate(self.connector.credentials()).await?;
        Ok(client)
    }

    /// Close every pooled connection. Later calls reconnect.
    pub async fn close(&self) {
        self.connector.close_all().await;
    }
}
