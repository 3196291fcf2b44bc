use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("No platform data directory available")]
    NoDataDir,

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found")]
    NotFound,

    /// A hosted channel with this name is already stored.
    #[error("Channel already exists: {0}")]
    ChannelExists(String),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    /// Member and visitor sets are stored as JSON arrays.
    #[error("Malformed JSON column: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;
