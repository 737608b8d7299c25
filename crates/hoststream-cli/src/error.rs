use hoststream_client::ClientError;
use hoststream_proto::ProtocolError;
use thiserror::Error;

/// Why a command failed.
#[derive(Debug, Error)]
pub enum CliError {
    /// Host or connection failure
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Input that does not decode
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Input is not hex
    #[error("invalid hex input: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Local file or terminal I/O
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Argument missing or inconsistent
    #[error("{0}")]
    Usage(String),
}
