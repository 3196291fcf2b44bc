use serde_json::json;
use tracing::{debug, info, warn};

use parley_shared::{Message, NodeEvent};

use crate::command::CommandResult;
use crate::error::NodeError;
use crate::node::Node;

/// `list_all`: the tracker's channel directory. Unknown channels become
/// local shells.
pub async fn list_all(node: &Node) -> Result<CommandResult, NodeError> {
    let summaries = node.ctx.tracker.list_channels().await?;
    for summary in &summaries {
        node.ctx
            .store
            .ensure_shell(&summary.name, summary.host.as_deref())?;
    }
    Ok(CommandResult::ok_with(
        format!("{} channels on the tracker", summaries.len()),
        &summaries,
    ))
}

/// `channels`
pub fn channels(node: &Node) -> CommandResult {
    let user = node.ctx.session.username();
    let store = &node.ctx.store;
    CommandResult::ok_with(
        "Channels",
        &json!({
            "joined": store.joined_channels(&user),
            "hosted": store.hosted_channels(&user),
            "known": store.channel_names(),
        }),
    )
}

/// `join <channel>`
pub async fn join(node: &Node, name: &str) -> Result<CommandResult, NodeError> {
    let ctx = &node.ctx;
    let user = ctx.session.username();
    let authenticated = ctx.session.is_authenticated();
    let offline = ctx.session.is_offline();

    match ctx.store.channel(name) {
        Some(existing) if existing.is_participant(&user) => {
            return Err(NodeError::AlreadyJoined(name.to_string()));
        }
        Some(_) => {}
        None if offline => {
            ctx.store.ensure_shell(name, None)?;
        }
        None => match ctx.tracker.get_channel(name).await {
            Ok(Some(remote)) => {
                ctx.store.ensure_shell(name, remote.host.as_deref())?;
                let local_user = ctx.session.user();
                ctx.store.update(name, |c| {
                    c.adopt_metadata(&remote, local_user.as_deref());
                    c.merge_remote(remote.messages.clone(), local_user.as_deref())
                })?;
            }
            Ok(None) if authenticated => {
                let channel = ctx.store.create_channel(name, &user)?;
                let backed_up = ctx.push_to_tracker(&channel).await;
                info!(channel = %name, host = %user, "channel created on join");
                return Ok(CommandResult::ok_with(
                    format!("Created {name}, you are the host"),
                    &json!({ "channel": channel.summary(), "backed_up": backed_up }),
                ));
            }
            Ok(None) => return Err(NodeError::UnknownChannel(name.to_string())),
            Err(e) => {
                warn!(channel = %name, error = %e, "tracker unreachable, joining local shell");
                ctx.store.ensure_shell(name, None)?;
            }
        },
    }

    ctx.store.update(name, |c| {
        if authenticated {
            c.add_member(&user)
        } else {
            c.add_visitor(&user)
        }
    })?;

    let mut notified = 0;
    let mut pulled = 0;
    if !offline {
        if let Some(channel) = ctx.store.channel(name) {
            let targets = ctx.online_participants(&channel, &[user.as_str()]).await;
            let event = NodeEvent::JoinChannel {
                channel: name.to_string(),
                username: user.clone(),
                as_visitor: !authenticated,
            };
            notified = ctx.deliver(&targets, &event).await;
        }
        pulled = node.engine.pull_history(name, &user).await;
    }

    let channel = ctx
        .store
        .channel(name)
        .ok_or_else(|| NodeError::UnknownChannel(name.to_string()))?;
    info!(channel = %name, user = %user, visitor = !authenticated, notified, pulled, "joined");
    Ok(CommandResult::ok_with(
        format!("Joined {name}"),
        &json!({
            "channel": channel.summary(),
            "visitor": !authenticated,
            "notified": notified,
            "pulled": pulled,
        }),
    ))
}

/// `leave <channel>`
pub async fn leave(node: &Node, name: &str) -> Result<CommandResult, NodeError> {
    let ctx = &node.ctx;
    let user = ctx.session.username();
    let offline = ctx.session.is_offline();

    let channel = ctx
        .store
        .channel(name)
        .ok_or_else(|| NodeError::UnknownChannel(name.to_string()))?;
    if !channel.is_participant(&user) {
        return Err(NodeError::NotJoined(name.to_string()));
    }

    // The tracker keeps the last full copy, with the host still a member.
    if channel.is_host(&user) && !offline {
        ctx.push_to_tracker(&channel).await;
    }
    ctx.store.update(name, |c| c.remove_participant(&user))?;

    let mut notified = 0;
    if !offline {
        let targets = ctx.online_participants(&channel, &[user.as_str()]).await;
        let event = NodeEvent::LeaveChannel {
            channel: name.to_string(),
            username: user.clone(),
        };
        notified = ctx.deliver(&targets, &event).await;
    }

    info!(channel = %name, user = %user, notified, "left");
    Ok(CommandResult::ok(format!("Left {name}")))
}

/// `create <channel>`
pub async fn create(node: &Node, name: &str) -> Result<CommandResult, NodeError> {
    let ctx = &node.ctx;
    let user = ctx
        .session
        .user()
        .ok_or(NodeError::NotAuthenticated("create a channel"))?;
    let offline = ctx.session.is_offline();

    if ctx.store.channel(name).is_some_and(|c| !c.is_shell()) {
        return Err(NodeError::ChannelExists(name.to_string()));
    }
    if !offline {
        match ctx.tracker.get_channel(name).await {
            Ok(Some(_)) => return Err(NodeError::ChannelExists(name.to_string())),
            Ok(None) => {}
            Err(e) => warn!(channel = %name, error = %e, "tracker unreachable, creating locally"),
        }
    }

    let channel = ctx.store.create_channel(name, &user)?;
    let backed_up = !offline && ctx.push_to_tracker(&channel).await;

    info!(channel = %name, host = %user, backed_up, "channel created");
    Ok(CommandResult::ok_with(
        format!("Created {name}"),
        &json!({ "channel": channel.summary(), "backed_up": backed_up }),
    ))
}

/// `history <channel>`: ordered messages, including any still sitting in
/// this user's offline queue.
pub async fn history(node: &Node, name: &str) -> Result<CommandResult, NodeError> {
    let ctx = &node.ctx;
    let user = ctx.session.username();

    let channel = ctx
        .store
        .channel(name)
        .ok_or_else(|| NodeError::UnknownChannel(name.to_string()))?;
    if !channel.can_read(&user) {
        return Err(NodeError::Permission(format!("{user} cannot read {name}")));
    }

    if !ctx.session.is_offline() && channel.messages.is_empty() {
        let pulled = node.engine.pull_history(name, &user).await;
        debug!(channel = %name, pulled, "history pulled before display");
    }

    let mut messages: Vec<Message> = ctx
        .store
        .channel(name)
        .map(|c| c.messages)
        .unwrap_or_default();
    if let Some(me) = ctx.session.user() {
        let queued = ctx.store.offline_queue(&me)?;
        messages.extend(queued.into_iter().filter(|m| m.channel == name));
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    }

    Ok(CommandResult::ok_with(
        format!("{} messages in {name}", messages.len()),
        &messages,
    ))
}
