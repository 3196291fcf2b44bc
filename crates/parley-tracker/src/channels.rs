//! Backup copies of every channel pushed to the tracker.
//!
//! The directory applies the host-authority rule: only the current host (or
//! anyone, while no host is on record) may replace a channel's metadata.
//! Everyone else's push is downgraded to an append-only message merge.
//!
//! SQLite writes run on the blocking pool. The directory lock stays held
//! across them so backups hit the disk in the order they were applied.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use parley_shared::protocol::ChannelDebug;
use parley_shared::{Channel, ChannelSummary, ChannelSync, MessageStatus};
use parley_store::{Database, StoreError};

use crate::error::TrackerError;

/// What a single `sync_channel` changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub created: bool,
    pub metadata_replaced: bool,
    pub added: usize,
}

impl SyncOutcome {
    pub fn changed(&self) -> bool {
        self.created || self.metadata_replaced || self.added > 0
    }
}

struct Inner {
    channels: BTreeMap<String, Channel>,
    db: Option<Arc<std::sync::Mutex<Database>>>,
}

pub struct ChannelDirectory {
    inner: Mutex<Inner>,
}

impl ChannelDirectory {
    /// A directory backed by `db`, preloaded with everything stored there.
    pub fn open(db: Database) -> Result<Self, TrackerError> {
        let channels: BTreeMap<String, Channel> = db
            .load_channels()?
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();
        info!(channels = channels.len(), "channel backups loaded");
        Ok(Self {
            inner: Mutex::new(Inner {
                channels,
                db: Some(Arc::new(std::sync::Mutex::new(db))),
            }),
        })
    }

    /// A directory that keeps nothing across restarts.
    pub fn ephemeral() -> Self {
        Self {
            inner: Mutex::new(Inner {
                channels: BTreeMap::new(),
                db: None,
            }),
        }
    }

    pub async fn apply_sync(&self, sync: ChannelSync) -> Result<SyncOutcome, TrackerError> {
        let submitter = sync.effective_submitter().map(str::to_string);
        let incoming = sync.channel;
        let name = incoming.name.trim().to_string();
        if name.is_empty() {
            return Err(TrackerError::InvalidSnapshot("channel name is empty".into()));
        }

        let mut inner = self.inner.lock().await;
        let mut outcome = SyncOutcome::default();

        let mut channel = match inner.channels.get(&name) {
            Some(existing) => existing.clone(),
            None => {
                outcome.created = true;
                Channel::shell(&name)
            }
        };

        let authoritative = channel.host.is_none()
            || matches!((&channel.host, &submitter), (Some(h), Some(s)) if h == s);
        if authoritative {
            channel.adopt_metadata(&incoming, None);
            outcome.metadata_replaced = true;
        } else {
            debug!(
                channel = %name,
                host = ?channel.host,
                submitter = ?submitter,
                "non-host push, merging messages only"
            );
        }

        outcome.added = channel.merge_messages(incoming.messages.into_iter().map(|mut m| {
            m.status = MessageStatus::Sent;
            m.channel = name.clone();
            m
        }));

        if outcome.changed() {
            if let Some(db) = inner.db.clone() {
                let backup = channel.clone();
                tokio::task::spawn_blocking(move || {
                    let mut db = db.lock().map_err(|_| StoreError::Poisoned)?;
                    db.save_channel(&backup)
                })
                .await??;
            }
            inner.channels.insert(name.clone(), channel);
        }

        debug!(
            channel = %name,
            created = outcome.created,
            replaced = outcome.metadata_replaced,
            added = outcome.added,
            "channel synced"
        );
        Ok(outcome)
    }

    pub async fn get(&self, name: &str) -> Option<Channel> {
        self.inner.lock().await.channels.get(name).cloned()
    }

    /// Directory listing, sorted by name.
    pub async fn summaries(&self) -> Vec<ChannelSummary> {
        let inner = self.inner.lock().await;
        inner.channels.values().map(Channel::summary).collect()
    }

    pub async fn debug_view(&self) -> Vec<ChannelDebug> {
        let inner = self.inner.lock().await;
        inner
            .channels
            .values()
            .map(|c| ChannelDebug {
                name: c.name.clone(),
                host: c.host.clone(),
                members: c.members.iter().cloned().collect(),
                message_count: c.messages.len(),
            })
            .collect()
    }
}
