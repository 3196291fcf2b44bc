//! Per-user queue of messages composed while presence was `offline`.

use rusqlite::params;

use parley_shared::{Message, MessageStatus};

use crate::channels::{decode_ts, encode_ts};
use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Replace `username`'s queue with `messages`, in order.
    pub fn save_offline_queue(&mut self, username: &str, messages: &[Message]) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "DELETE FROM offline_messages WHERE username = ?1",
            params![username],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO offline_messages
                    (username, position, channel, sender, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (position, msg) in messages.iter().enumerate() {
                stmt.execute(params![
                    username,
                    position as i64,
                    msg.channel,
                    msg.sender,
                    msg.content,
                    encode_ts(&msg.timestamp),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Queued messages for `username`, oldest first. Always `pending`.
    pub fn load_offline_queue(&self, username: &str) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT channel, sender, content, timestamp
             FROM offline_messages
             WHERE username = ?1
             ORDER BY position ASC",
        )?;
        let rows = stmt.query_map(params![username], |row| {
            let ts: String = row.get(3)?;
            Ok(Message {
                channel: row.get(0)?,
                sender: row.get(1)?,
                content: row.get(2)?,
                timestamp: decode_ts(3, &ts)?,
                status: MessageStatus::Pending,
            })
        })?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Drop `username`'s queue. Returns how many messages were removed.
    pub fn clear_offline_queue(&self, username: &str) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM offline_messages WHERE username = ?1",
            params![username],
        )?;
        Ok(affected)
    }
}
