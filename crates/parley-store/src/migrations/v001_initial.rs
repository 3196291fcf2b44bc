//! v001 -- Initial schema creation.
//!
//! Creates `channels`, `messages` and `offline_messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Channels
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS channels (
    name       TEXT PRIMARY KEY NOT NULL,
    host       TEXT,                          -- NULL for a shell
    members    TEXT NOT NULL DEFAULT '[]',    -- JSON array of usernames
    visitors   TEXT NOT NULL DEFAULT '[]',    -- JSON array of usernames
    updated_at TEXT NOT NULL                  -- RFC-3339
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    channel   TEXT NOT NULL,                  -- FK -> channels(name)
    position  INTEGER NOT NULL,               -- order within the channel
    sender    TEXT NOT NULL,
    content   TEXT NOT NULL,
    timestamp TEXT NOT NULL,                  -- RFC-3339
    status    TEXT NOT NULL,                  -- pending | sent | received

    PRIMARY KEY (channel, position),
    UNIQUE (channel, timestamp, sender, content),
    FOREIGN KEY (channel) REFERENCES channels(name) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Offline outbound queue, per authenticated user
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS offline_messages (
    username  TEXT NOT NULL,
    position  INTEGER NOT NULL,
    channel   TEXT NOT NULL,
    sender    TEXT NOT NULL,
    content   TEXT NOT NULL,
    timestamp TEXT NOT NULL,

    PRIMARY KEY (username, position)
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
