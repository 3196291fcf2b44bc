//! Handling of events pushed to this node by its peers.

use std::collections::BTreeSet;
use std::net::SocketAddr;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use parley_net::InboundHandler;
use parley_shared::types::is_visitor_name;
use parley_shared::{Channel, Message, NodeEvent};

use crate::context::NodeContext;

pub struct NodeInbound {
    ctx: NodeContext,
}

impl NodeInbound {
    pub fn new(ctx: NodeContext) -> Self {
        Self { ctx }
    }

    async fn on_message(&self, message: Message) {
        let name = message.channel.clone();
        let Some(channel) = self.ctx.store.channel(&name) else {
            debug!(channel = %name, "message for unknown channel ignored");
            return;
        };

        let me = self.ctx.session.username();
        let hosting = channel.is_host(&me);
        let sender = message.sender.clone();

        if hosting && is_visitor_name(&sender) {
            warn!(channel = %name, "rejected message from unauthenticated sender");
            return;
        }
        let admit = hosting && !channel.is_member(&sender);
        let local_user = self.ctx.session.user();

        let result = self.ctx.store.update(&name, |c| {
            if admit {
                c.add_member(&sender);
            }
            c.merge_remote(vec![message.clone()], local_user.as_deref())
        });
        let added = match result {
            Ok(Some(added)) => added,
            Ok(None) => return,
            Err(e) => {
                warn!(channel = %name, error = %e, "could not store message");
                return;
            }
        };
        if admit {
            info!(channel = %name, user = %sender, "sender admitted as member");
        }
        if !hosting || added == 0 {
            return;
        }

        // Relay as the host: fan out, then refresh the tracker backup.
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            let Some(channel) = ctx.store.channel(&name) else {
                return;
            };
            let targets = ctx
                .online_participants(&channel, &[sender.as_str(), me.as_str()])
                .await;
            let delivered = ctx.deliver(&targets, &NodeEvent::message(&message)).await;
            debug!(channel = %name, targets = targets.len(), delivered, "relayed message");
            ctx.push_to_tracker(&channel).await;
        });
    }

    async fn on_membership(&self, name: &str, username: &str, join: Option<bool>) {
        let result = self.ctx.store.update(name, |c| match join {
            Some(as_visitor) if as_visitor || is_visitor_name(username) => c.add_visitor(username),
            Some(_) => c.add_member(username),
            None => c.remove_participant(username),
        });
        let changed = match result {
            Ok(Some(changed)) => changed,
            Ok(None) => {
                debug!(channel = %name, "membership change for unknown channel ignored");
                return;
            }
            Err(e) => {
                warn!(channel = %name, error = %e, "could not store membership");
                return;
            }
        };
        debug!(channel = %name, user = %username, joined = join.is_some(), changed, "membership update");

        let me = self.ctx.session.username();
        let Some(channel) = self.ctx.store.channel(name) else {
            return;
        };
        if changed && channel.is_host(&me) {
            let ctx = self.ctx.clone();
            tokio::spawn(async move {
                ctx.push_to_tracker(&channel).await;
            });
        }
    }

    async fn on_history_request(
        &self,
        name: &str,
        requester: String,
        reply_to: Option<SocketAddr>,
        request_id: Option<String>,
    ) {
        let Some(channel) = self.ctx.store.channel(name) else {
            return;
        };
        if !channel.is_host(&self.ctx.session.username()) {
            debug!(channel = %name, "history request ignored, not the host");
            return;
        }
        if !channel.can_read(&requester) {
            warn!(channel = %name, user = %requester, "history request from non-participant");
            return;
        }

        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            let target = match reply_to {
                Some(addr) => Some(addr),
                None => ctx.resolve(&requester).await,
            };
            let Some(target) = target else {
                warn!(channel = %channel.name, user = %requester, "no address to send history to");
                return;
            };
            let reply = NodeEvent::history_reply(&channel, request_id);
            if let Err(e) = ctx.sender.send(target, &reply).await {
                warn!(channel = %channel.name, peer = %target, error = %e, "history reply failed");
            }
        });
    }

    /// Merge a pushed history reply. Metadata is only taken from replies
    /// that name a host.
    async fn on_history(
        &self,
        name: &str,
        messages: Vec<Message>,
        host: Option<String>,
        members: Option<BTreeSet<String>>,
        visitors: Option<BTreeSet<String>>,
        request_id: Option<String>,
    ) {
        let me = self.ctx.session.username();
        let local_user = self.ctx.session.user();

        let result = self.ctx.store.update(name, |c| {
            if c.is_host(&me) {
                return None;
            }
            if host.is_some() {
                let other = Channel {
                    name: c.name.clone(),
                    host,
                    members: members.unwrap_or_else(|| c.members.clone()),
                    visitors: visitors.unwrap_or_else(|| c.visitors.clone()),
                    messages: Vec::new(),
                };
                c.adopt_metadata(&other, local_user.as_deref());
            }
            Some(c.merge_remote(messages, local_user.as_deref()))
        });

        match result {
            Ok(Some(Some(added))) => debug!(channel = %name, added, "history merged"),
            Ok(Some(None)) => debug!(channel = %name, "history for hosted channel ignored"),
            Ok(None) => debug!(channel = %name, "history for unknown channel ignored"),
            Err(e) => warn!(channel = %name, error = %e, "could not store history"),
        }
        self.ctx.waiters.complete(name, request_id.as_deref());
    }
}

#[async_trait]
impl InboundHandler for NodeInbound {
    async fn handle(&self, event: NodeEvent, remote: SocketAddr) {
        debug!(peer = %remote, channel = %event.channel(), "inbound event");
        match event {
            event @ NodeEvent::Message { .. } => {
                if let Some(message) = event.into_message() {
                    self.on_message(message).await;
                }
            }
            NodeEvent::JoinChannel {
                channel,
                username,
                as_visitor,
            } => self.on_membership(&channel, &username, Some(as_visitor)).await,
            NodeEvent::LeaveChannel { channel, username } => {
                self.on_membership(&channel, &username, None).await
            }
            NodeEvent::RequestHistory {
                channel,
                username,
                reply_to,
                request_id,
            } => {
                self.on_history_request(&channel, username, reply_to, request_id)
                    .await
            }
            NodeEvent::ChannelHistory {
                channel,
                messages,
                host,
                members,
                visitors,
                request_id,
            } => {
                self.on_history(&channel, messages, host, members, visitors, request_id)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use parley_net::{PeerSender, TrackerClient};
    use parley_shared::MessageStatus;
    use parley_store::LocalStore;

    fn context(user: &str) -> NodeContext {
        // Nothing listens on the tracker address; every call fails fast.
        let tracker = TrackerClient::new("127.0.0.1:9".parse().unwrap(), Duration::from_millis(50));
        let ctx = NodeContext::new(
            Arc::new(LocalStore::in_memory().unwrap()),
            tracker,
            PeerSender::new(Duration::from_millis(50)),
            Duration::from_millis(100),
        );
        ctx.session.set_user(Some(user.into()));
        ctx
    }

    fn remote() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    fn message(sender: &str, content: &str) -> NodeEvent {
        NodeEvent::message(&Message::compose("general", sender, content))
    }

    #[tokio::test]
    async fn test_unknown_channel_ignored() {
        let ctx = context("bob");
        NodeInbound::new(ctx.clone()).handle(message("alice", "hi"), remote()).await;
        assert!(ctx.store.channel("general").is_none());
    }

    #[tokio::test]
    async fn test_host_admits_sender_and_merges_once() {
        let ctx = context("alice");
        ctx.store.create_channel("general", "alice").unwrap();
        let inbound = NodeInbound::new(ctx.clone());

        let event = message("bob", "hello");
        inbound.handle(event.clone(), remote()).await;
        inbound.handle(event, remote()).await;

        let ch = ctx.store.channel("general").unwrap();
        assert!(ch.is_member("bob"));
        assert_eq!(ch.messages.len(), 1);
        assert_eq!(ch.messages[0].status, MessageStatus::Received);
    }

    #[tokio::test]
    async fn test_host_rejects_visitor_sender() {
        let ctx = context("alice");
        ctx.store.create_channel("general", "alice").unwrap();
        NodeInbound::new(ctx.clone())
            .handle(message("visitor", "spam"), remote())
            .await;
        assert!(ctx.store.channel("general").unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn test_join_and_leave() {
        let ctx = context("alice");
        ctx.store.create_channel("general", "alice").unwrap();
        let inbound = NodeInbound::new(ctx.clone());

        inbound
            .handle(
                NodeEvent::JoinChannel {
                    channel: "general".into(),
                    username: "visitor".into(),
                    as_visitor: true,
                },
                remote(),
            )
            .await;
        inbound
            .handle(
                NodeEvent::JoinChannel {
                    channel: "general".into(),
                    username: "bob".into(),
                    as_visitor: false,
                },
                remote(),
            )
            .await;
        let ch = ctx.store.channel("general").unwrap();
        assert!(ch.is_visitor("visitor"));
        assert!(ch.is_member("bob"));

        inbound
            .handle(
                NodeEvent::LeaveChannel {
                    channel: "general".into(),
                    username: "bob".into(),
                },
                remote(),
            )
            .await;
        assert!(!ctx.store.channel("general").unwrap().is_participant("bob"));
    }

    #[tokio::test]
    async fn test_history_reply_merges_and_wakes_waiter() {
        let ctx = context("bob");
        ctx.store.ensure_shell("general", None).unwrap();
        ctx.store.update("general", |c| c.add_member("bob")).unwrap();
        let (request_id, rx) = ctx.waiters.register("general");

        let mut host_copy = Channel::new("general", "alice");
        host_copy.add_member("carol");
        host_copy.merge_message(Message::compose("general", "alice", "welcome"));
        host_copy.merge_message(Message::compose("general", "bob", "mine"));

        NodeInbound::new(ctx.clone())
            .handle(NodeEvent::history_reply(&host_copy, Some(request_id)), remote())
            .await;
        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .unwrap()
            .unwrap();

        let ch = ctx.store.channel("general").unwrap();
        assert!(ch.is_host("alice"));
        assert!(ch.is_member("carol"));
        assert!(ch.is_member("bob"));
        assert_eq!(ch.messages.len(), 2);
        let mine = ch.messages.iter().find(|m| m.sender == "bob").unwrap();
        assert_eq!(mine.status, MessageStatus::Sent);
    }
}
