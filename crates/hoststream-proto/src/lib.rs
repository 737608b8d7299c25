//! Wire format for host-server data streams.
//!
//! Every Client Access message has the same three parts: a fixed 20-byte
//! header (zero-copy binary), a fixed-width template whose layout depends on
//! the request or reply id, and an optional section of repeated LL/CP items
//! (`length`, `code point`, `payload`). The DDM security exchange uses the same
//! LL/CP idea inside 6-byte DSS segments instead.
//!
//! The codec is implemented once here. Subsystem messages ([`signon`],
//! [`central`], [`ifs`], [`dataqueue`], [`print`], [`ddm`]) only describe
//! their template fields and code points through the [`Request`] and [`Reply`]
//! traits, and each subsystem classifies its numeric return codes into the
//! shared [`ErrorKind`] set.
//!
//! # Security
//!
//! All length fields are validated before any slice is taken. The maximum
//! data-stream length is enforced on decode (16 MiB unless the caller chooses
//! otherwise) so a hostile peer cannot make us allocate unbounded buffers.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod central;
pub mod dataqueue;
pub mod ddm;
pub mod dss;
pub mod errors;
pub mod frame;
pub mod header;
pub mod ifs;
pub mod optional;
pub mod print;
pub mod retcode;
pub mod server;
pub mod signon;
pub mod template;
pub mod text;

pub use errors::{ProtocolError, Result};
pub use frame::{DataStream, FrameDecoder, Reply, ReplyMode, Request};
pub use header::DataStreamHeader;
pub use optional::{CodePointItem, LlWidth, OptionalSection, OptionalWriter};
pub use retcode::{ErrorKind, HostError, ReplyError, ReplyResult, SecurityFailure};
pub use server::ServerId;
pub use template::{TemplateReader, TemplateWriter};
pub use text::{Ccsid, CodePage, TextCodec};
