//! Persistence of [`Channel`] records and their message lists.

use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::params;

use parley_shared::{Channel, Message, MessageStatus};

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    /// Rewrite one channel record and its full message list in a single
    /// transaction.
    pub fn save_channel(&mut self, channel: &Channel) -> Result<()> {
        let members = serde_json::to_string(&channel.members)?;
        let visitors = serde_json::to_string(&channel.visitors)?;

        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO channels (name, host, members, visitors, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(name) DO UPDATE SET
                host = excluded.host,
                members = excluded.members,
                visitors = excluded.visitors,
                updated_at = excluded.updated_at",
            params![
                channel.name,
                channel.host,
                members,
                visitors,
                encode_ts(&Utc::now()),
            ],
        )?;
        tx.execute("DELETE FROM messages WHERE channel = ?1", params![channel.name])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO messages
                    (channel, position, sender, content, timestamp, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (position, msg) in channel.messages.iter().enumerate() {
                stmt.execute(params![
                    channel.name,
                    position as i64,
                    msg.sender,
                    msg.content,
                    encode_ts(&msg.timestamp),
                    msg.status.as_str(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Fetch a single channel with its ordered messages.
    pub fn load_channel(&self, name: &str) -> Result<Channel> {
        let mut channel = self
            .conn()
            .query_row(
                "SELECT name, host, members, visitors FROM channels WHERE name = ?1",
                params![name],
                row_to_channel,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;
        channel.messages = self.load_messages(name)?;
        Ok(channel)
    }

    /// Every stored channel, ordered by name.
    pub fn load_channels(&self) -> Result<Vec<Channel>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT name, host, members, visitors FROM channels ORDER BY name ASC")?;
        let rows = stmt.query_map([], row_to_channel)?;

        let mut channels = Vec::new();
        for row in rows {
            let mut channel = row?;
            channel.messages = self.load_messages(&channel.name)?;
            channels.push(channel);
        }
        Ok(channels)
    }

    fn load_messages(&self, channel: &str) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT channel, sender, content, timestamp, status
             FROM messages
             WHERE channel = ?1
             ORDER BY position ASC",
        )?;
        let rows = stmt.query_map(params![channel], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub(crate) fn decode_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn decode_set(idx: usize, raw: &str) -> rusqlite::Result<BTreeSet<String>> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Map a `rusqlite::Row` to a [`Channel`] without messages.
fn row_to_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
    let name: String = row.get(0)?;
    let host: Option<String> = row.get(1)?;
    let members: String = row.get(2)?;
    let visitors: String = row.get(3)?;

    Ok(Channel {
        name,
        host,
        members: decode_set(2, &members)?,
        visitors: decode_set(3, &visitors)?,
        messages: Vec::new(),
    })
}

/// Map a `rusqlite::Row` to a [`Message`].
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let channel: String = row.get(0)?;
    let sender: String = row.get(1)?;
    let content: String = row.get(2)?;
    let ts: String = row.get(3)?;
    let status: String = row.get(4)?;

    let status: MessageStatus = status.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Message {
        sender,
        content,
        channel,
        timestamp: decode_ts(3, &ts)?,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Channel {
        let mut ch = Channel::new("general", "alice");
        ch.add_member("bob");
        ch.add_visitor("carol");
        ch.merge_message(Message::compose("general", "alice", "first"));
        ch.merge_message(
            Message::compose("general", "bob", "second").with_status(MessageStatus::Received),
        );
        ch
    }

    #[test]
    fn test_save_and_load_channel() {
        let mut db = Database::open_in_memory().unwrap();
        let ch = sample();
        db.save_channel(&ch).unwrap();

        let loaded = db.load_channel("general").unwrap();
        assert_eq!(loaded, ch);
    }

    #[test]
    fn test_save_is_a_rewrite() {
        let mut db = Database::open_in_memory().unwrap();
        let mut ch = sample();
        db.save_channel(&ch).unwrap();

        ch.remove_participant("bob");
        let first = ch.messages[0].key();
        ch.mark_sent(&[first]);
        db.save_channel(&ch).unwrap();
        db.save_channel(&ch).unwrap();

        let loaded = db.load_channel("general").unwrap();
        assert!(!loaded.is_member("bob"));
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].status, MessageStatus::Sent);
    }

    #[test]
    fn test_load_missing_channel() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.load_channel("nope"), Err(StoreError::NotFound)));
    }

    #[test]
    fn test_shell_persists_without_host() {
        let mut db = Database::open_in_memory().unwrap();
        db.save_channel(&Channel::shell("lobby")).unwrap();
        db.save_channel(&sample()).unwrap();

        let all = db.load_channels().unwrap();
        let names: Vec<_> = all.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["general", "lobby"]);
        assert!(all[1].is_shell());
    }

    #[test]
    fn test_channels_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.db");
        {
            let mut db = Database::open_at(&path).unwrap();
            db.save_channel(&sample()).unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.load_channel("general").unwrap().messages.len(), 2);
    }
}
