//! Schema versions, tracked in SQLite's `user_version` pragma.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Version a fully migrated database reports.
pub const CURRENT_VERSION: u32 = 1;

/// Apply every migration newer than the file's recorded version.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let found: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if found >= CURRENT_VERSION {
        return Ok(());
    }
    tracing::debug!(found, target = CURRENT_VERSION, "schema out of date");

    if found < 1 {
        v001_initial::up(conn).map_err(|e| StoreError::Migration(format!("v001: {e}")))?;
        conn.pragma_update(None, "user_version", 1)?;
        tracing::info!("schema migrated to v1");
    }
    Ok(())
}
