//! Test harness for hoststream.
//!
//! - [`MockHost`]: an in-memory host serving every implemented server, with
//!   real seed exchange and password-substitute verification
//! - [`DuplexTransport`]: in-process pipes to a mock host, for fast tests
//! - [`SimTransport`] and [`serve_simulated`]: the same host over Turmoil's
//!   simulated network
//! - [`SimEnv`]: seeded randomness and Tokio-clock time

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod duplex;
pub mod mock_host;
mod sim_env;
mod sim_transport;

pub use duplex::DuplexTransport;
pub use mock_host::{Endpoint, MockHost, TableFault};
pub use sim_env::SimEnv;
pub use sim_transport::{SimTransport, serve_simulated};
