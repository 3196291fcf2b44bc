use thiserror::Error;

use parley_store::StoreError;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
}
