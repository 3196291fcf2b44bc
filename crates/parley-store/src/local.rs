//! A node's local replica store.
//!
//! Channels live in memory for fast reads and are written through to the
//! [`Database`] on every mutation. A mutation is applied to a copy first, so a
//! failed write leaves the cache untouched.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use parley_shared::{Channel, Message};

use crate::database::Database;
use crate::error::{Result, StoreError};

struct Inner {
    db: Database,
    channels: BTreeMap<String, Channel>,
}

pub struct LocalStore {
    inner: Mutex<Inner>,
}

impl LocalStore {
    /// Open the store at `path`, loading every persisted channel.
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_database(Database::open_at(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_database(Database::open_in_memory()?)
    }

    fn from_database(db: Database) -> Result<Self> {
        let channels = db
            .load_channels()?
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect::<BTreeMap<_, _>>();
        tracing::debug!(channels = channels.len(), "local store loaded");
        Ok(Self {
            inner: Mutex::new(Inner { db, channels }),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn channel(&self, name: &str) -> Option<Channel> {
        self.lock().ok()?.channels.get(name).cloned()
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.lock()
            .map(|inner| inner.channels.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.lock()
            .map(|inner| inner.channels.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Channels where `user` is a member or visitor.
    pub fn joined_channels(&self, user: &str) -> Vec<String> {
        self.names_where(|c| c.is_participant(user))
    }

    /// Channels `user` hosts.
    pub fn hosted_channels(&self, user: &str) -> Vec<String> {
        self.names_where(|c| c.is_host(user))
    }

    fn names_where(&self, pred: impl Fn(&Channel) -> bool) -> Vec<String> {
        self.lock()
            .map(|inner| {
                inner
                    .channels
                    .values()
                    .filter(|c| pred(c))
                    .map(|c| c.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Make sure a channel named `name` exists locally. A known `host` is
    /// recorded on a replica that has none. Returns `true` if a shell was
    /// created.
    pub fn ensure_shell(&self, name: &str, host: Option<&str>) -> Result<bool> {
        let mut inner = self.lock()?;
        let existing = inner.channels.get(name).cloned();
        let created = existing.is_none();
        let mut channel = existing.unwrap_or_else(|| Channel::shell(name));

        let fill_host = match host {
            Some(host) if channel.host.is_none() => {
                channel.host = Some(host.to_string());
                channel.add_member(host);
                true
            }
            _ => false,
        };
        if created || fill_host {
            inner.db.save_channel(&channel)?;
            inner.channels.insert(name.to_string(), channel);
        }
        Ok(created)
    }

    /// Create `name` hosted by `host`. A hostless shell is upgraded in place,
    /// keeping its messages; an existing hosted channel is an error.
    pub fn create_channel(&self, name: &str, host: &str) -> Result<Channel> {
        let mut inner = self.lock()?;
        let channel = match inner.channels.get(name) {
            Some(existing) if !existing.is_shell() => {
                return Err(StoreError::ChannelExists(name.to_string()))
            }
            Some(shell) => {
                let mut channel = shell.clone();
                channel.host = Some(host.to_string());
                channel.add_member(host);
                channel
            }
            None => Channel::new(name, host),
        };
        inner.db.save_channel(&channel)?;
        inner.channels.insert(name.to_string(), channel.clone());
        Ok(channel)
    }

    /// Apply `f` to the channel and persist the result. `None` if the channel
    /// is unknown.
    pub fn update<R>(&self, name: &str, f: impl FnOnce(&mut Channel) -> R) -> Result<Option<R>> {
        let mut inner = self.lock()?;
        let Some(mut channel) = inner.channels.get(name).cloned() else {
            return Ok(None);
        };
        let out = f(&mut channel);
        inner.db.save_channel(&channel)?;
        inner.channels.insert(name.to_string(), channel);
        Ok(Some(out))
    }

    /// Merge messages from elsewhere into a known channel. Returns the
    /// number of new messages; unknown channels merge nothing.
    pub fn merge_remote(
        &self,
        name: &str,
        messages: Vec<Message>,
        local_user: Option<&str>,
    ) -> Result<usize> {
        let added = self
            .update(name, |c| c.merge_remote(messages, local_user))?
            .unwrap_or(0);
        if added > 0 {
            tracing::debug!(channel = %name, added, "merged remote messages");
        }
        Ok(added)
    }

    // ------------------------------------------------------------------
    // Offline queue
    // ------------------------------------------------------------------

    pub fn queue_offline(&self, user: &str, message: Message) -> Result<()> {
        let mut inner = self.lock()?;
        let mut queue = inner.db.load_offline_queue(user)?;
        queue.push(message);
        inner.db.save_offline_queue(user, &queue)
    }

    pub fn offline_queue(&self, user: &str) -> Result<Vec<Message>> {
        self.lock()?.db.load_offline_queue(user)
    }

    /// Return and clear `user`'s queue.
    pub fn take_offline_queue(&self, user: &str) -> Result<Vec<Message>> {
        let inner = self.lock()?;
        let queue = inner.db.load_offline_queue(user)?;
        if !queue.is_empty() {
            inner.db.clear_offline_queue(user)?;
        }
        Ok(queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_shared::MessageStatus;

    #[test]
    fn test_create_and_derived_sets() {
        let store = LocalStore::in_memory().unwrap();
        store.create_channel("general", "alice").unwrap();
        store.ensure_shell("random", None).unwrap();
        store
            .update("random", |c| c.add_visitor("alice"))
            .unwrap()
            .unwrap();

        assert_eq!(store.channel_names(), vec!["general", "random"]);
        assert_eq!(store.joined_channels("alice"), vec!["general", "random"]);
        assert_eq!(store.hosted_channels("alice"), vec!["general"]);
        assert!(store.joined_channels("bob").is_empty());
    }

    #[test]
    fn test_create_rejects_hosted_but_upgrades_shell() {
        let store = LocalStore::in_memory().unwrap();
        store.create_channel("general", "alice").unwrap();
        assert!(matches!(
            store.create_channel("general", "bob"),
            Err(StoreError::ChannelExists(_))
        ));

        assert!(store.ensure_shell("lobby", None).unwrap());
        assert!(!store.ensure_shell("lobby", None).unwrap());
        let ch = store.create_channel("lobby", "bob").unwrap();
        assert!(ch.is_host("bob"));
    }

    #[test]
    fn test_ensure_shell_fills_missing_host() {
        let store = LocalStore::in_memory().unwrap();
        store.ensure_shell("lobby", None).unwrap();
        store.ensure_shell("lobby", Some("carol")).unwrap();
        let ch = store.channel("lobby").unwrap();
        assert!(ch.is_host("carol"));
        assert!(ch.is_member("carol"));

        store.ensure_shell("lobby", Some("mallory")).unwrap();
        assert!(store.channel("lobby").unwrap().is_host("carol"));
    }

    #[test]
    fn test_update_unknown_channel() {
        let store = LocalStore::in_memory().unwrap();
        assert!(store.update("nope", |_| ()).unwrap().is_none());
        assert_eq!(store.merge_remote("nope", vec![], None).unwrap(), 0);
    }

    #[test]
    fn test_merge_remote_is_idempotent_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.db");
        let msg = Message::compose("general", "bob", "hello");
        {
            let store = LocalStore::open(&path).unwrap();
            store.create_channel("general", "alice").unwrap();
            assert_eq!(store.merge_remote("general", vec![msg.clone()], Some("alice")).unwrap(), 1);
            assert_eq!(store.merge_remote("general", vec![msg.clone()], Some("alice")).unwrap(), 0);
        }
        let store = LocalStore::open(&path).unwrap();
        let ch = store.channel("general").unwrap();
        assert_eq!(ch.messages.len(), 1);
        assert_eq!(ch.messages[0].status, MessageStatus::Received);
    }

    #[test]
    fn test_offline_queue_take_clears() {
        let store = LocalStore::in_memory().unwrap();
        store
            .queue_offline("bob", Message::compose("general", "bob", "one"))
            .unwrap();
        store
            .queue_offline("bob", Message::compose("general", "bob", "two"))
            .unwrap();
        assert_eq!(store.offline_queue("bob").unwrap().len(), 2);
        assert!(store.offline_queue("alice").unwrap().is_empty());

        let taken = store.take_offline_queue("bob").unwrap();
        assert_eq!(taken[0].content, "one");
        assert!(store.offline_queue("bob").unwrap().is_empty());
    }
}
