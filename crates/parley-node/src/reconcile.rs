//! Channel reconciliation: flush what this node wrote, pull what it missed.
//!
//! A run first refreshes the channel directory from the tracker, then for
//! each joined or hosted channel:
//!
//! 1. **Flush.** Pending messages go directly to every online participant
//!    and, independently, to the tracker. A message that reached either is
//!    marked `sent`. A host always pushes its full channel as a backup.
//! 2. **Pull.** A host merges the tracker's copy. Anyone else asks the host
//!    for its history and waits a bounded time for the pushed reply, falling
//!    back to the tracker's copy when the host cannot be reached.
//!
//! Hosts pull first: their push replaces the tracker's membership, so a
//! replica rebuilt from a shell has to take the backup's participants back
//! before it pushes. Merges only ever add messages.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use parley_shared::{MessageKey, NodeEvent, PresenceStatus};

use crate::context::NodeContext;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub channels: usize,
    pub flushed: usize,
    pub pulled: usize,
    pub tracker_reachable: bool,
}

#[derive(Clone)]
pub struct ReconcileEngine {
    ctx: NodeContext,
}

impl ReconcileEngine {
    pub fn new(ctx: NodeContext) -> Self {
        Self { ctx }
    }

    /// Reconcile every channel in the sync set. Does nothing for visitors or
    /// while offline.
    pub async fn run_all(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let Some(user) = self.ctx.session.user() else {
            return report;
        };
        if self.ctx.session.is_offline() {
            return report;
        }

        report.tracker_reachable = self.discover(&user).await;

        let sync_set: BTreeSet<String> = self
            .ctx
            .store
            .joined_channels(&user)
            .into_iter()
            .chain(self.ctx.store.hosted_channels(&user))
            .collect();

        for name in &sync_set {
            let hosting = self
                .ctx
                .store
                .channel(name)
                .is_some_and(|c| c.is_host(&user));
            if hosting {
                report.pulled += self.pull_history(name, &user).await;
                report.flushed += self.flush_pending(name, &user).await;
            } else {
                report.flushed += self.flush_pending(name, &user).await;
                report.pulled += self.pull_history(name, &user).await;
            }
        }
        report.channels = sync_set.len();

        info!(
            channels = report.channels,
            flushed = report.flushed,
            pulled = report.pulled,
            tracker = report.tracker_reachable,
            "reconciliation finished"
        );
        report
    }

    /// Create local shells for channels listed by the tracker. Returns
    /// whether the tracker answered.
    pub async fn discover(&self, user: &str) -> bool {
        let summaries = match self.ctx.tracker.list_channels().await {
            Ok(summaries) => summaries,
            Err(e) => {
                debug!(error = %e, "channel directory unavailable");
                return false;
            }
        };
        for summary in summaries {
            match self
                .ctx
                .store
                .ensure_shell(&summary.name, summary.host.as_deref())
            {
                Ok(true) if summary.host.as_deref() == Some(user) => {
                    info!(channel = %summary.name, "rediscovered hosted channel");
                }
                Ok(true) => debug!(channel = %summary.name, "new channel discovered"),
                Ok(false) => {}
                Err(e) => warn!(channel = %summary.name, error = %e, "could not store shell"),
            }
        }
        true
    }

    /// Deliver this node's pending messages in `name`. Returns how many were
    /// marked `sent`.
    pub async fn flush_pending(&self, name: &str, user: &str) -> usize {
        let Some(channel) = self.ctx.store.channel(name) else {
            return 0;
        };
        let pending = channel.pending();
        let hosting = channel.is_host(user);
        if pending.is_empty() && !hosting {
            return 0;
        }

        let mut delivered: HashSet<MessageKey> = HashSet::new();
        if !pending.is_empty() {
            let targets = self.ctx.online_participants(&channel, &[user]).await;
            if !targets.is_empty() {
                for message in &pending {
                    let accepted = self
                        .ctx
                        .deliver(&targets, &NodeEvent::message(message))
                        .await;
                    if accepted > 0 {
                        delivered.insert(message.key());
                    }
                }
            }
        }

        let snapshot = if hosting {
            channel.clone()
        } else {
            channel.with_messages(pending.clone())
        };
        if self.ctx.push_to_tracker(&snapshot).await {
            delivered.extend(pending.iter().map(|m| m.key()));
        }

        if delivered.is_empty() {
            return 0;
        }
        let keys: Vec<MessageKey> = delivered.into_iter().collect();
        match self.ctx.store.update(name, |c| c.mark_sent(&keys)) {
            Ok(Some(flipped)) => {
                debug!(channel = %name, flipped, "pending messages sent");
                flipped
            }
            Ok(None) => 0,
            Err(e) => {
                warn!(channel = %name, error = %e, "could not mark messages sent");
                0
            }
        }
    }

    /// Bring in messages this replica is missing. Returns how many were new.
    pub async fn pull_history(&self, name: &str, user: &str) -> usize {
        let Some(channel) = self.ctx.store.channel(name) else {
            return 0;
        };
        let before = channel.messages.len();

        if channel.is_host(user) {
            self.pull_from_tracker(name, user).await;
        } else {
            let answered = match channel.host.as_deref() {
                Some(host) => self.pull_from_host(name, host, user).await,
                None => false,
            };
            if !answered {
                self.pull_from_tracker(name, user).await;
            }
        }

        self.ctx
            .store
            .channel(name)
            .map(|c| c.messages.len().saturating_sub(before))
            .unwrap_or(0)
    }

    /// Ask the host for its history and wait for the pushed reply.
    async fn pull_from_host(&self, name: &str, host: &str, user: &str) -> bool {
        match self.ctx.tracker.check_status(host).await {
            Ok(Some(PresenceStatus::Online)) => {}
            Ok(_) => {
                debug!(channel = %name, host, "host offline, using tracker copy");
                return false;
            }
            Err(e) => {
                debug!(channel = %name, host, error = %e, "host status unknown");
                return false;
            }
        }
        let Some(host_addr) = self.ctx.resolve(host).await else {
            return false;
        };
        let Some(reply_to) = self.ctx.advertise() else {
            return false;
        };

        let as_visitor = self
            .ctx
            .store
            .channel(name)
            .map(|c| !c.is_member(user))
            .unwrap_or(true);
        let join = NodeEvent::JoinChannel {
            channel: name.to_string(),
            username: user.to_string(),
            as_visitor,
        };
        if let Err(e) = self.ctx.sender.send(host_addr, &join).await {
            debug!(channel = %name, error = %e, "host did not take join");
            return false;
        }

        let (request_id, reply) = self.ctx.waiters.register(name);
        let request = NodeEvent::RequestHistory {
            channel: name.to_string(),
            username: user.to_string(),
            reply_to: Some(reply_to),
            request_id: Some(request_id.clone()),
        };
        if let Err(e) = self.ctx.sender.send(host_addr, &request).await {
            debug!(channel = %name, error = %e, "history request failed");
            self.ctx.waiters.cancel(name, &request_id);
            return false;
        }

        match tokio::time::timeout(self.ctx.history_wait, reply).await {
            Ok(Ok(())) => true,
            _ => {
                debug!(channel = %name, host, "no history reply, using tracker copy");
                self.ctx.waiters.cancel(name, &request_id);
                false
            }
        }
    }

    /// Merge the tracker's backup. Non-hosts also take its metadata; a host
    /// whose replica lists nobody else takes the backup's participants.
    async fn pull_from_tracker(&self, name: &str, user: &str) {
        let remote = match self.ctx.tracker.get_channel(name).await {
            Ok(Some(remote)) => remote,
            Ok(None) => return,
            Err(e) => {
                debug!(channel = %name, error = %e, "tracker copy unavailable");
                return;
            }
        };
        let result = self.ctx.store.update(name, |c| {
            if c.is_host(user) {
                if c.is_host_only() && remote.is_host(user) {
                    let restored = c.absorb_participants(&remote);
                    if restored > 0 {
                        info!(channel = %name, restored, "participants restored from backup");
                    }
                }
            } else if remote.host.is_some() {
                c.adopt_metadata(&remote, Some(user));
            }
            c.merge_remote(remote.messages.clone(), Some(user))
        });
        if let Err(e) = result {
            warn!(channel = %name, error = %e, "could not merge tracker copy");
        }
    }
}
