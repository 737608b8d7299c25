//! Tokio client for host servers.
//!
//! Drives the sans-I/O pieces of `hoststream-core` over real streams:
//!
//! - [`HostConnection`]: one multiplexed connection per server, with a reader
//!   task routing replies to requests by correlation id
//! - [`HostSystem`]: lazily opened, handshaken connections for one host plus
//!   the conversion-table cache
//! - service clients: [`SignonClient`], [`IfsClient`], [`DataQueueClient`],
//!   [`PrintClient`] and [`DdmClient`]
//!
//! # Example
//!
//! ```no_run
//! use hoststream_client::{ClientConfig, HostSystem, TcpTransport};
//! use hoststream_core::{Credentials, SystemEnv};
//!
//! # async fn run() -> hoststream_client::Result<()> {
//! let config = ClientConfig::new("as400.example.com");
//! let system = HostSystem::new(TcpTransport, SystemEnv, config, Credentials::new("user", "pw"))?;
//! let ifs = system.ifs().await?;
//! for entry in ifs.list("/home/user").await? {
//!     tracing::info!(name = %entry.name, size = entry.size, "entry");
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod connection;
pub mod dataqueue;
pub mod ddm;
pub mod error;
pub mod ifs;
pub mod io;
mod nls;
pub mod print;
pub mod signon;
pub mod system;
pub mod tcp;

pub use config::ClientConfig;
pub use connection::{ConnectionOptions, HostConnection};
pub use dataqueue::{DataQueueClient, Wait};
pub use ddm::DdmClient;
pub use error::{ClientError, Result};
pub use ifs::{FileContents, IfsClient};
pub use print::PrintClient;
pub use signon::SignonClient;
pub use system::HostSystem;
pub use tcp::TcpTransport;
