use thiserror::Error;

use parley_net::NetError;
use parley_store::StoreError;

/// Errors surfaced by node commands. None of them stop the node.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Network error: {0}")]
    Net(#[from] NetError),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("You must be logged in to {0}")]
    NotAuthenticated(&'static str),

    #[error("Cannot {0} while offline")]
    Offline(&'static str),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Channel already exists: {0}")]
    ChannelExists(String),

    #[error("Already joined {0}")]
    AlreadyJoined(String),

    #[error("Not a participant of {0}")]
    NotJoined(String),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Node has stopped")]
    Stopped,
}
