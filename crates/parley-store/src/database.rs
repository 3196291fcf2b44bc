//! The SQLite handle shared by every table module.
//!
//! Opening a [`Database`] always brings the schema up to date first, so the
//! typed helpers in `channels` and `offline` can assume their tables exist.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations::run_migrations;

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Per-user data directory (`~/.local/share/parley` on Linux), created
    /// on first use.
    pub fn default_data_dir() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("org", "parley", "parley").ok_or(StoreError::NoDataDir)?;
        let dir = dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Open the file at `path`, creating it and its directory if needed.
    pub fn open_at(path: &Path) -> Result<Self> {
        match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)?,
            _ => {}
        }
        tracing::debug!(path = %path.display(), "opening database");

        let conn = Connection::open(path)?;
        // Readers (the tracker's request tasks) do not block the writer.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::prepare(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Mutable access, for transactions.
    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Backing file, or `None` in memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.conn
            .path()
            .map(PathBuf::from)
            .filter(|p| !p.as_os_str().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::CURRENT_VERSION;

    #[test]
    fn test_open_creates_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a").join("b").join("parley.db");

        let db = Database::open_at(&file).unwrap();
        assert!(file.exists());
        assert!(db.path().is_some());
        assert!(Database::open_in_memory().unwrap().path().is_none());
    }

    #[test]
    fn test_reopen_keeps_schema_version() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("parley.db");
        drop(Database::open_at(&file).unwrap());

        let db = Database::open_at(&file).unwrap();
        let version: u32 = db
            .conn()
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }
}
