use serde_json::json;
use tracing::info;

use parley_shared::{Message, MessageStatus};

use crate::command::CommandResult;
use crate::error::NodeError;
use crate::node::Node;

/// `send <channel> <text>`
///
/// Offline, the message only goes to the offline queue. Otherwise it is
/// stored as `pending` and flushed right away; it ends up `sent` if a peer or
/// the tracker took it.
pub async fn send(node: &Node, name: &str, text: &str) -> Result<CommandResult, NodeError> {
    let ctx = &node.ctx;
    let user = ctx
        .session
        .user()
        .ok_or(NodeError::NotAuthenticated("send messages"))?;
    let channel = ctx
        .store
        .channel(name)
        .ok_or_else(|| NodeError::UnknownChannel(name.to_string()))?;
    if !channel.can_write(&user) {
        return Err(NodeError::Permission(format!("{user} is not a member of {name}")));
    }

    let message = Message::compose(name, &user, text);
    if ctx.session.is_offline() {
        ctx.store.queue_offline(&user, message.clone())?;
        info!(channel = %name, "message queued while offline");
        return Ok(CommandResult::ok_with("Queued until back online", &message));
    }

    ctx.store.update(name, |c| c.merge_message(message.clone()))?;
    let flushed = node.engine.flush_pending(name, &user).await;

    let key = message.key();
    let status = ctx
        .store
        .channel(name)
        .and_then(|c| c.messages.into_iter().find(|m| m.key() == key))
        .map(|m| m.status)
        .unwrap_or(MessageStatus::Pending);

    info!(channel = %name, status = status.as_str(), flushed, "message sent");
    Ok(CommandResult::ok_with(
        format!("Message {}", status.as_str()),
        &json!({ "message": message.with_status(status), "flushed": flushed }),
    ))
}

/// `sync`
pub async fn sync(node: &Node) -> Result<CommandResult, NodeError> {
    if !node.ctx.session.is_authenticated() {
        return Err(NodeError::NotAuthenticated("sync"));
    }
    if node.ctx.session.is_offline() {
        return Err(NodeError::Offline("sync"));
    }
    let report = node.engine.run_all().await;
    Ok(CommandResult::ok_with(
        format!(
            "Synced {} channels: {} sent, {} pulled",
            report.channels, report.flushed, report.pulled
        ),
        &report,
    ))
}
