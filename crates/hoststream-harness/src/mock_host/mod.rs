//! In-memory host that speaks every implemented server.
//!
//! One [`MockHost`] holds the whole host state (user profiles, the file
//! system, data queues, spooled files, conversion tables) behind a mutex, so
//! connections opened through any transport see each other's changes. Each
//! connection runs the real handshake: seeds are exchanged and password
//! substitutes are verified with the same algorithm the client uses.
//!
//! Faults can be queued for conversion-table requests to exercise the
//! client's retry and fallback paths.

mod central;
mod dataqueue;
mod ddm;
mod ifs;
mod print;
mod signon;
mod wire;

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use bytes::Bytes;
use hoststream_proto::{
    Ccsid, DataStream, ProtocolError, Reply, ServerId,
    dataqueue::QueueName,
    print::SpooledFile,
    server::DDM_PORT,
    signon::Seed,
};
use tokio::io::{AsyncRead, AsyncWrite};

pub use self::ifs::HOST_MAX_DATA_BLOCK;
use self::{
    dataqueue::StoredQueue,
    ifs::{FileSystem, OpenFile},
};

/// What a listening port serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// A data-stream server
    Server(ServerId),
    /// The DDM listener
    Ddm,
}

impl Endpoint {
    /// Endpoint behind a well-known port.
    pub fn for_port(port: u16) -> Option<Self> {
        if port == DDM_PORT {
            return Some(Self::Ddm);
        }
        ServerId::ALL.into_iter().find(|s| s.default_port() == port).map(Self::Server)
    }

    /// Well-known port of this endpoint.
    pub fn port(self) -> u16 {
        match self {
            Self::Server(server) => server.default_port(),
            Self::Ddm => DDM_PORT,
        }
    }

    /// Every endpoint the mock serves.
    pub fn all() -> Vec<Self> {
        ServerId::ALL.into_iter().map(Self::Server).chain([Self::Ddm]).collect()
    }
}

/// Injected failure for the next conversion-table request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFault {
    /// Answer with the "resource limit" return code
    Busy,
    /// Drop the connection without answering
    Disconnect,
}

/// What a handler wants done with the connection.
pub(crate) enum Outcome {
    /// Send these replies
    Reply(Vec<DataStream>),
    /// Close the connection without replying
    Disconnect,
}

impl Outcome {
    pub(crate) fn one<R: Reply>(server: ServerId, reply: &R) -> Result<Self, ProtocolError> {
        Ok(Self::Reply(vec![DataStream::from_reply(server, reply)?]))
    }
}

/// Per-connection handshake state.
#[derive(Debug)]
pub(crate) struct Conn {
    pub(crate) server: ServerId,
    pub(crate) server_seed: Seed,
    pub(crate) client_seed: Option<Seed>,
    pub(crate) user: Option<String>,
    pub(crate) handles: HashMap<u32, OpenFile>,
    pub(crate) next_handle: u32,
}

impl Conn {
    fn new(server: ServerId, server_seed: Seed) -> Self {
        Self { server, server_seed, client_seed: None, user: None, handles: HashMap::new(), next_handle: 1 }
    }

    pub(crate) fn authenticated(&self) -> bool {
        self.user.is_some()
    }
}

#[derive(Debug)]
pub(crate) struct HostState {
    pub(crate) users: HashMap<String, String>,
    pub(crate) password_level: u8,
    pub(crate) host_ccsid: u32,
    pub(crate) jobs_started: u32,
    pub(crate) clock: u64,
    pub(crate) fs: FileSystem,
    pub(crate) libraries: BTreeSet<String>,
    pub(crate) queues: BTreeMap<QueueName, StoredQueue>,
    pub(crate) spool: Vec<SpooledFile>,
    pub(crate) tables: HashMap<Ccsid, Bytes>,
    pub(crate) table_faults: VecDeque<TableFault>,
    pub(crate) connections: HashMap<Endpoint, usize>,
    pub(crate) requests: HashMap<(ServerId, u16), usize>,
}

impl HostState {
    /// Advance the host clock, returning the new epoch-seconds time.
    pub(crate) fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Job name for a newly started server job.
    pub(crate) fn next_job(&mut self, server: ServerId) -> String {
        self.jobs_started += 1;
        format!("{:06}/QUSER/{}", self.jobs_started, job_prefix(server))
    }

    /// Password of an enabled profile.
    pub(crate) fn password(&self, user: &str) -> Option<&str> {
        self.users.get(&user.trim().to_uppercase()).map(String::as_str)
    }
}

fn job_prefix(server: ServerId) -> &'static str {
    match server {
        ServerId::Central => "QZSCSRVS",
        ServerId::File => "QPWFSERVSO",
        ServerId::NetPrint => "QNPSERVS",
        ServerId::Database => "QZDASOINIT",
        ServerId::DataQueue => "QZHQSSRV",
        ServerId::RemoteCommand => "QZRCSRVS",
        ServerId::Signon => "QZSOSIGN",
    }
}

/// Shared in-memory host. Cloning shares the state.
#[derive(Debug, Clone)]
pub struct MockHost {
    state: Arc<Mutex<HostState>>,
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHost {
    /// Host with no user profiles, password level 2, root directory only and
    /// library `QGPL`.
    pub fn new() -> Self {
        let state = HostState {
            users: HashMap::new(),
            password_level: 2,
            host_ccsid: 37,
            jobs_started: 0,
            clock: 1_700_000_000,
            fs: FileSystem::new(),
            libraries: BTreeSet::from(["QGPL".to_string(), "QTEMP".to_string()]),
            queues: BTreeMap::new(),
            spool: Vec::new(),
            tables: HashMap::new(),
            table_faults: VecDeque::new(),
            connections: HashMap::new(),
            requests: HashMap::new(),
        };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add (or replace) a user profile.
    #[must_use]
    pub fn with_user(self, user: &str, password: &str) -> Self {
        self.lock().users.insert(user.trim().to_uppercase(), password.to_string());
        self
    }

    /// Password level announced by the signon server.
    #[must_use]
    pub fn with_password_level(self, level: u8) -> Self {
        self.lock().password_level = level;
        self
    }

    /// Add a library for data queues.
    #[must_use]
    pub fn with_library(self, library: &str) -> Self {
        self.lock().libraries.insert(library.to_uppercase());
        self
    }

    /// Create `path` with `data`, creating missing parent directories.
    #[must_use]
    pub fn with_file(self, path: &str, data: &[u8]) -> Self {
        {
            let mut state = self.lock();
            let now = state.tick();
            state.fs.create_all_parents(path, now);
            state.fs.put_file(path, data.to_vec(), 1208, now);
        }
        self
    }

    /// Create directory `path` and its parents.
    #[must_use]
    pub fn with_directory(self, path: &str) -> Self {
        {
            let mut state = self.lock();
            let now = state.tick();
            state.fs.create_all(path, now);
        }
        self
    }

    /// Add a spooled file.
    #[must_use]
    pub fn with_spooled_file(self, file: SpooledFile) -> Self {
        self.lock().spool.push(file);
        self
    }

    /// Serve the 512-byte Unicode table of `ccsid`.
    #[must_use]
    pub fn with_conversion_table(self, ccsid: Ccsid, table: impl Into<Bytes>) -> Self {
        self.lock().tables.insert(ccsid, table.into());
        self
    }

    /// Queue a fault for the next conversion-table request.
    pub fn push_table_fault(&self, fault: TableFault) {
        self.lock().table_faults.push_back(fault);
    }

    /// Connections accepted on `endpoint` so far.
    pub fn connections(&self, endpoint: Endpoint) -> usize {
        self.lock().connections.get(&endpoint).copied().unwrap_or(0)
    }

    /// Requests with `request_id` received by `server` so far.
    pub fn requests(&self, server: ServerId, request_id: u16) -> usize {
        self.lock().requests.get(&(server, request_id)).copied().unwrap_or(0)
    }

    /// Contents of `path`, if it is a file.
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().fs.file_data(path)
    }

    /// Entries currently on `queue`.
    pub fn queue_depth(&self, queue: &QueueName) -> Option<usize> {
        self.lock().queues.get(queue).map(|q| q.entries.len())
    }

    /// Spooled files currently on the host.
    pub fn spooled_files(&self) -> Vec<SpooledFile> {
        self.lock().spool.clone()
    }

    /// Serve one accepted connection until the peer closes it.
    pub async fn serve<S>(&self, endpoint: Endpoint, stream: S) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        *self.lock().connections.entry(endpoint).or_default() += 1;
        match endpoint {
            Endpoint::Ddm => ddm::serve(self, stream).await,
            Endpoint::Server(server) => self.serve_data_streams(server, stream).await,
        }
    }

    async fn serve_data_streams<S>(&self, server: ServerId, mut stream: S) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let seed = {
            let mut state = self.lock();
            let n = u64::from(state.jobs_started) + state.tick();
            (n ^ 0x5EED_5EED_5EED_5EED).to_be_bytes()
        };
        let mut conn = Conn::new(server, seed);
        while let Some(request) = wire::read_frame(&mut stream).await? {
            let correlation_id = request.correlation_id();
            let outcome = self.handle(&mut conn, &request);
            match outcome {
                Ok(Outcome::Reply(replies)) => {
                    for reply in replies {
                        wire::write_frame(&mut stream, &reply.with_correlation_id(correlation_id)).await?;
                    }
                },
                Ok(Outcome::Disconnect) => {
                    tracing::debug!(%server, "mock host dropping connection");
                    return Ok(());
                },
                Err(err) => {
                    tracing::warn!(%server, error = %err, "mock host rejected request");
                    return Err(io::Error::new(io::ErrorKind::InvalidData, err));
                },
            }
        }
        Ok(())
    }

    fn handle(&self, conn: &mut Conn, request: &DataStream) -> Result<Outcome, ProtocolError> {
        if request.server() != conn.server {
            return Err(ProtocolError::UnexpectedReplyId { server: request.server(), reply_id: request.request_id() });
        }
        let mut state = self.lock();
        *state.requests.entry((conn.server, request.request_id())).or_default() += 1;

        if let Some(outcome) = signon::handle(&mut state, conn, request)? {
            return Ok(outcome);
        }
        if !conn.authenticated() {
            // A real host drops clients that skip the start-server exchange.
            return Ok(Outcome::Disconnect);
        }
        match conn.server {
            ServerId::Central => central::handle(&mut state, request),
            ServerId::File => ifs::handle(&mut state, conn, request),
            ServerId::DataQueue => dataqueue::handle(&mut state, conn, request),
            ServerId::NetPrint => print::handle(&mut state, request),
            ServerId::Signon | ServerId::Database | ServerId::RemoteCommand => Ok(Outcome::Disconnect),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_by_port() {
        assert_eq!(Endpoint::for_port(8476), Some(Endpoint::Server(ServerId::Signon)));
        assert_eq!(Endpoint::for_port(446), Some(Endpoint::Ddm));
        assert_eq!(Endpoint::for_port(1), None);
        for endpoint in Endpoint::all() {
            assert_eq!(Endpoint::for_port(endpoint.port()), Some(endpoint));
        }
    }

    #[test]
    fn user_lookup_is_case_insensitive() {
        let host = MockHost::new().with_user("qsecofr", "secret");
        assert_eq!(host.lock().password("QSECOFR "), Some("secret"));
    }
}
