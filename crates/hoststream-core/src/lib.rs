//! Host-server protocol core logic
//!
//! Pure state machine logic for host-server connections, decoupled from I/O.
//!
//! # Architecture
//!
//! The session handshake and the request/reply correlation are deterministic
//! state machines that never touch a socket, a clock or a random number
//! generator on their own. Time is passed into every method that needs it
//! and the client seed is supplied by the caller. State transitions return
//! declarative actions (send this data stream, the session is ready, close
//! the connection) that a runtime or test harness executes.
//!
//! The same code therefore runs under the Tokio client, in plain unit tests
//! and inside the Turmoil simulation with injected faults.
//!
//! # Components
//!
//! - [`session`]: Per-connection handshake (seed exchange, start server,
//!   attribute negotiation, signon)
//! - [`correlation`]: Correlation ids and reply matching
//! - [`auth`]: SHA-1 password substitute
//! - [`conversion`]: Conversion-table cache with retrying sources
//! - [`mod@env`]: Environment abstraction (time, RNG)
//! - [`transport`]: Transport abstraction (byte streams)
//! - [`error`]: Error types

pub mod auth;
pub mod conversion;
pub mod correlation;
pub mod env;
pub mod error;
pub mod session;
pub mod transport;

pub use conversion::{ConversionTableCache, RetryPolicy, TableFetchError, TableSource};
pub use correlation::{Correlator, CorrelatorConfig, ReplyDisposition};
pub use env::{Environment, SystemEnv};
pub use error::{CorrelationError, SessionError};
pub use session::{Credentials, Session, SessionAction, SessionConfig, SessionInfo, SessionState};
pub use transport::Transport;
