//! # parley-store
//!
//! SQLite persistence for Parley, shared by the tracker (channel backups) and
//! the nodes (local replicas and offline queues).
//!
//! [`Database`] wraps a `rusqlite::Connection` with typed helpers per table.
//! [`LocalStore`] layers an in-memory channel cache on top of it for a node;
//! every mutation is written through before the call returns.

pub mod channels;
pub mod database;
pub mod local;
pub mod migrations;
pub mod offline;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use local::LocalStore;
