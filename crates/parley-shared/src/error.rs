use thiserror::Error;

/// Errors raised while parsing or encoding wire frames.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Empty frame")]
    EmptyFrame,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Invalid username: {0:?}")]
    InvalidUsername(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
