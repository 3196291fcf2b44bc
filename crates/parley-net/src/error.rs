use std::net::SocketAddr;

use thiserror::Error;

use parley_shared::ProtocolError;

/// Errors raised by outbound and inbound networking.
///
/// Everything here is a connectivity or data problem the caller can recover
/// from by trying the next option.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out during {op} with {addr}")]
    Timeout { addr: SocketAddr, op: &'static str },

    #[error("Connection closed by {0}")]
    ConnectionClosed(SocketAddr),

    #[error("Framing error: {0}")]
    Codec(#[from] tokio_util::codec::LinesCodecError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Could not encode frame: {0}")]
    Encode(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The tracker answered `ERROR: <reason>`.
    #[error("Tracker error: {0}")]
    Tracker(String),

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),
}
