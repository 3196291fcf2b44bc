//! Channel and message model with the merge rules every replica follows.
//!
//! A message is identified by its `(timestamp, sender, content)` triple.
//! Merging only ever adds messages whose key is absent, then re-sorts by
//! timestamp (stable, so ties keep insertion order). Nothing is overwritten.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::VISITOR;
use crate::types::{is_visitor_name, MessageStatus};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub sender: String,
    pub content: String,
    #[serde(default)]
    pub channel: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: MessageStatus,
}

/// Idempotency key of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageKey {
    pub timestamp: DateTime<Utc>,
    pub sender: String,
    pub content: String,
}

impl Message {
    /// A freshly authored message: stamped now, status `pending`.
    pub fn compose(channel: &str, sender: &str, content: &str) -> Self {
        Self {
            sender: sender.to_string(),
            content: content.to_string(),
            channel: channel.to_string(),
            timestamp: Utc::now(),
            status: MessageStatus::Pending,
        }
    }

    pub fn key(&self) -> MessageKey {
        MessageKey {
            timestamp: self.timestamp,
            sender: self.sender.clone(),
            content: self.content.clone(),
        }
    }

    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == MessageStatus::Pending
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// A channel replica. Also the JSON snapshot exchanged on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    pub name: String,
    /// Authoritative owner. `None` for a shell learned from the directory.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub members: BTreeSet<String>,
    #[serde(default)]
    pub visitors: BTreeSet<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Directory entry returned by `list_channels`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelSummary {
    pub name: String,
    #[serde(default)]
    pub host: Option<String>,
    pub members: usize,
    pub messages: usize,
}

impl Channel {
    /// A new channel owned by `host`, who becomes its first member.
    pub fn new(name: &str, host: &str) -> Self {
        let mut channel = Self::shell(name);
        if !is_visitor_name(host) {
            channel.host = Some(host.to_string());
            channel.add_member(host);
        }
        channel
    }

    /// An empty placeholder for a channel known only by name.
    pub fn shell(name: &str) -> Self {
        Self {
            name: name.to_string(),
            host: None,
            members: BTreeSet::new(),
            visitors: BTreeSet::new(),
            messages: Vec::new(),
        }
    }

    pub fn is_shell(&self) -> bool {
        self.host.is_none()
    }

    pub fn is_host(&self, user: &str) -> bool {
        self.host.as_deref() == Some(user)
    }

    pub fn is_member(&self, user: &str) -> bool {
        self.members.contains(user)
    }

    pub fn is_visitor(&self, user: &str) -> bool {
        self.visitors.contains(user)
    }

    pub fn is_participant(&self, user: &str) -> bool {
        self.is_member(user) || self.is_visitor(user)
    }

    /// Members, visitors, and the generic visitor label may read.
    pub fn can_read(&self, user: &str) -> bool {
        user == VISITOR || self.is_participant(user)
    }

    /// Only named members may write.
    pub fn can_write(&self, user: &str) -> bool {
        !is_visitor_name(user) && self.is_member(user)
    }

    /// Add a read-write member. Promotes an existing visitor.
    pub fn add_member(&mut self, user: &str) -> bool {
        if is_visitor_name(user) {
            return false;
        }
        self.visitors.remove(user);
        self.members.insert(user.to_string())
    }

    /// Add a read-only visitor unless already a member.
    pub fn add_visitor(&mut self, user: &str) -> bool {
        let user = if user.trim().is_empty() { VISITOR } else { user };
        if self.is_member(user) {
            return false;
        }
        self.visitors.insert(user.to_string())
    }

    pub fn remove_participant(&mut self, user: &str) -> bool {
        let was_member = self.members.remove(user);
        let was_visitor = self.visitors.remove(user);
        was_member || was_visitor
    }

    pub fn participants(&self) -> impl Iterator<Item = &String> {
        self.members.iter().chain(self.visitors.iter())
    }

    pub fn message_keys(&self) -> BTreeSet<MessageKey> {
        self.messages.iter().map(Message::key).collect()
    }

    /// Add one message if its key is absent. Returns whether it was added.
    pub fn merge_message(&mut self, message: Message) -> bool {
        self.merge_messages(std::iter::once(message)) == 1
    }

    /// Add every message whose key is absent, then re-sort once.
    pub fn merge_messages<I>(&mut self, messages: I) -> usize
    where
        I: IntoIterator<Item = Message>,
    {
        let mut seen: HashSet<MessageKey> = self.messages.iter().map(Message::key).collect();
        let mut added = 0;
        for message in messages {
            if seen.insert(message.key()) {
                self.messages.push(message);
                added += 1;
            }
        }
        if added > 0 {
            self.sort_messages();
        }
        added
    }

    /// Merge messages that arrived from elsewhere. They are stored as
    /// `received`, except copies of the local user's own messages, which are
    /// `sent` since they evidently left this node.
    pub fn merge_remote<I>(&mut self, messages: I, local_user: Option<&str>) -> usize
    where
        I: IntoIterator<Item = Message>,
    {
        let name = self.name.clone();
        self.merge_messages(messages.into_iter().map(|mut m| {
            m.status = match local_user {
                Some(user) if m.sender == user => MessageStatus::Sent,
                _ => MessageStatus::Received,
            };
            m.channel = name.clone();
            m
        }))
    }

    pub fn pending(&self) -> Vec<Message> {
        self.messages.iter().filter(|m| m.is_pending()).cloned().collect()
    }

    /// Flip matching `pending` messages to `sent`.
    pub fn mark_sent(&mut self, keys: &[MessageKey]) -> usize {
        let keys: HashSet<&MessageKey> = keys.iter().collect();
        let mut flipped = 0;
        for message in self.messages.iter_mut().filter(|m| m.is_pending()) {
            if keys.contains(&message.key()) {
                message.status = MessageStatus::Sent;
                flipped += 1;
            }
        }
        flipped
    }

    /// Take host and membership from a more authoritative copy while keeping
    /// the local user's own membership as this replica records it.
    pub fn adopt_metadata(&mut self, other: &Channel, local_user: Option<&str>) {
        let own = local_user.map(|u| (u, self.is_member(u), self.is_visitor(u)));

        if other.host.is_some() {
            self.host = other.host.clone();
        }
        self.members = other.members.clone();
        self.visitors = other.visitors.clone();

        if let Some((user, was_member, was_visitor)) = own {
            self.remove_participant(user);
            if was_member {
                self.add_member(user);
            } else if was_visitor {
                self.add_visitor(user);
            }
        }
        if let Some(host) = self.host.clone() {
            self.add_member(&host);
        }
        self.members.remove(VISITOR);
        let members = &self.members;
        self.visitors.retain(|v| !members.contains(v));
    }

    /// Whether nobody but the host is recorded as a participant.
    pub fn is_host_only(&self) -> bool {
        self.participants().all(|p| self.is_host(p))
    }

    /// Union in another copy's members and visitors. Host and messages are
    /// untouched. Returns how many participants were added.
    pub fn absorb_participants(&mut self, other: &Channel) -> usize {
        let mut added = 0;
        for member in &other.members {
            if self.add_member(member) {
                added += 1;
            }
        }
        for visitor in &other.visitors {
            if !self.is_participant(visitor) && self.add_visitor(visitor) {
                added += 1;
            }
        }
        added
    }

    pub fn summary(&self) -> ChannelSummary {
        ChannelSummary {
            name: self.name.clone(),
            host: self.host.clone(),
            members: self.members.len(),
            messages: self.messages.len(),
        }
    }

    /// A copy of the metadata holding only the given messages.
    pub fn with_messages(&self, messages: Vec<Message>) -> Self {
        Self {
            name: self.name.clone(),
            host: self.host.clone(),
            members: self.members.clone(),
            visitors: self.visitors.clone(),
            messages,
        }
    }

    fn sort_messages(&mut self) {
        // `sort_by` is stable: equal timestamps keep insertion order.
        self.messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn msg_at(sender: &str, content: &str, secs: i64) -> Message {
        let base = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        Message {
            sender: sender.into(),
            content: content.into(),
            channel: "general".into(),
            timestamp: base + Duration::seconds(secs),
            status: MessageStatus::Received,
        }
    }

    #[test]
    fn test_new_channel_host_is_member() {
        let ch = Channel::new("general", "alice");
        assert!(ch.is_host("alice"));
        assert!(ch.can_write("alice"));
        assert!(!ch.is_shell());
    }

    #[test]
    fn test_visitor_label_never_member() {
        let mut ch = Channel::new("general", "alice");
        assert!(!ch.add_member(VISITOR));
        assert!(ch.add_visitor(""));
        assert!(ch.can_read(VISITOR));
        assert!(!ch.can_write(VISITOR));
    }

    #[test]
    fn test_member_promotion_from_visitor() {
        let mut ch = Channel::new("general", "alice");
        ch.add_visitor("bob");
        assert!(ch.is_visitor("bob"));
        assert!(!ch.can_write("bob"));
        ch.add_member("bob");
        assert!(ch.is_member("bob"));
        assert!(!ch.is_visitor("bob"));
        assert!(!ch.add_visitor("bob"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut ch = Channel::new("general", "alice");
        let m = msg_at("bob", "hello", 5);
        assert!(ch.merge_message(m.clone()));
        assert!(!ch.merge_message(m.clone()));
        assert_eq!(ch.merge_messages(vec![m.clone(), m]), 0);
        assert_eq!(ch.messages.len(), 1);
    }

    #[test]
    fn test_merge_sorts_and_keeps_tie_order() {
        let mut ch = Channel::new("general", "alice");
        ch.merge_message(msg_at("bob", "late", 30));
        ch.merge_message(msg_at("bob", "tie-first", 10));
        ch.merge_message(msg_at("carol", "tie-second", 10));
        ch.merge_message(msg_at("alice", "early", 1));
        let contents: Vec<_> = ch.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["early", "tie-first", "tie-second", "late"]);
    }

    #[test]
    fn test_same_timestamp_different_content_both_kept() {
        let mut ch = Channel::new("general", "alice");
        ch.merge_message(msg_at("bob", "one", 1));
        ch.merge_message(msg_at("bob", "two", 1));
        assert_eq!(ch.messages.len(), 2);
    }

    #[test]
    fn test_convergence_regardless_of_order() {
        let a_msgs = vec![msg_at("alice", "a1", 1), msg_at("alice", "a2", 3)];
        let b_msgs = vec![msg_at("bob", "b1", 2), msg_at("bob", "b2", 4)];

        let mut backup = Channel::new("general", "alice");
        backup.merge_messages(b_msgs.clone());
        backup.merge_messages(a_msgs.clone());

        let mut a = Channel::new("general", "alice");
        a.merge_messages(a_msgs.clone());
        a.merge_messages(backup.messages.clone());

        let mut b = Channel::new("general", "alice");
        b.merge_messages(b_msgs);
        b.merge_messages(backup.messages.clone());
        b.merge_messages(a_msgs);

        assert_eq!(a.message_keys(), b.message_keys());
        assert_eq!(a.message_keys(), backup.message_keys());
        assert_eq!(a.messages.len(), 4);
    }

    #[test]
    fn test_merge_remote_statuses() {
        let mut ch = Channel::new("general", "alice");
        let own = msg_at("alice", "mine", 1).with_status(MessageStatus::Pending);
        let other = msg_at("bob", "theirs", 2).with_status(MessageStatus::Pending);
        assert_eq!(ch.merge_remote(vec![own, other], Some("alice")), 2);
        assert_eq!(ch.messages[0].status, MessageStatus::Sent);
        assert_eq!(ch.messages[1].status, MessageStatus::Received);
    }

    #[test]
    fn test_merge_never_overwrites_existing_status() {
        let mut ch = Channel::new("general", "alice");
        let pending = msg_at("alice", "draft", 1).with_status(MessageStatus::Pending);
        ch.merge_message(pending.clone());
        ch.merge_remote(vec![pending], Some("alice"));
        assert_eq!(ch.messages.len(), 1);
        assert_eq!(ch.messages[0].status, MessageStatus::Pending);
    }

    #[test]
    fn test_mark_sent_only_touches_pending() {
        let mut ch = Channel::new("general", "alice");
        let p = msg_at("alice", "p", 1).with_status(MessageStatus::Pending);
        let r = msg_at("bob", "r", 2);
        ch.merge_messages(vec![p.clone(), r.clone()]);
        assert_eq!(ch.pending().len(), 1);
        assert_eq!(ch.mark_sent(&[p.key(), r.key()]), 1);
        assert!(ch.pending().is_empty());
        assert_eq!(ch.messages[1].status, MessageStatus::Received);
    }

    #[test]
    fn test_adopt_metadata_preserves_own_membership() {
        let mut local = Channel::shell("general");
        local.add_member("bob");

        let mut authoritative = Channel::new("general", "alice");
        authoritative.add_member("carol");

        local.adopt_metadata(&authoritative, Some("bob"));
        assert!(local.is_host("alice"));
        assert!(local.is_member("carol"));
        assert!(local.is_member("bob"));

        // A replica that left does not get re-added.
        let mut left = Channel::new("general", "alice");
        let mut with_bob = authoritative.clone();
        with_bob.add_member("bob");
        left.adopt_metadata(&with_bob, Some("bob"));
        assert!(!left.is_participant("bob"));
    }

    #[test]
    fn test_absorb_participants_restores_lost_membership() {
        let mut recovered = Channel::new("general", "alice");
        assert!(recovered.is_host_only());

        let mut backup = Channel::new("general", "alice");
        backup.add_member("bob");
        backup.add_visitor("carol");
        backup.add_visitor(VISITOR);

        assert_eq!(recovered.absorb_participants(&backup), 3);
        assert!(recovered.is_host("alice"));
        assert!(recovered.is_member("bob"));
        assert!(recovered.is_visitor("carol"));
        assert!(!recovered.is_host_only());
        assert_eq!(recovered.absorb_participants(&backup), 0);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let mut ch = Channel::new("general", "alice");
        ch.merge_message(msg_at("alice", "hi", 0));
        let json = serde_json::to_value(&ch).unwrap();
        assert_eq!(json["name"], "general");
        assert_eq!(json["host"], "alice");
        assert_eq!(json["members"][0], "alice");
        assert_eq!(json["messages"][0]["status"], "received");

        let parsed: Channel =
            serde_json::from_str(r#"{"name":"x","host":"h","members":["h"],"messages":[]}"#)
                .unwrap();
        assert!(parsed.visitors.is_empty());
    }
}
