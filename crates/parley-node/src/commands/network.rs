use serde_json::json;
use tracing::{info, warn};

use parley_shared::PresenceStatus;

use crate::command::{CommandResult, HELP};
use crate::error::NodeError;
use crate::node::Node;

/// `list`: registers and returns the tracker's peer list.
pub async fn list(node: &Node) -> Result<CommandResult, NodeError> {
    let peers = node.register(true).await?.unwrap_or_default();
    Ok(CommandResult::ok_with(
        format!("{} peers", peers.len()),
        &peers,
    ))
}

/// `status check <user>`
pub async fn check_status(node: &Node, username: &str) -> Result<CommandResult, NodeError> {
    match node.ctx.tracker.check_status(username).await? {
        Some(status) => Ok(CommandResult::ok_with(
            format!("{username} is {status}"),
            &json!({ "username": username, "status": status }),
        )),
        None => Err(NodeError::UnknownUser(username.to_string())),
    }
}

/// `debug`: the tracker's operator view of its channel backups.
pub async fn debug(node: &Node) -> Result<CommandResult, NodeError> {
    let channels = node.ctx.tracker.debug().await?;
    Ok(CommandResult::ok_with(
        format!("{} channels tracked by {}", channels.len(), node.ctx.tracker.addr()),
        &channels,
    ))
}

pub fn help() -> CommandResult {
    CommandResult::ok(HELP)
}

/// `exit`: back up hosted channels, announce the shutdown and stop.
pub async fn exit(node: &Node) -> Result<CommandResult, NodeError> {
    let ctx = &node.ctx;
    let mut backed_up = 0;
    if let Some(user) = ctx.session.user() {
        if !ctx.session.is_offline() {
            for name in ctx.store.hosted_channels(&user) {
                if let Some(channel) = ctx.store.channel(&name) {
                    if ctx.push_to_tracker(&channel).await {
                        backed_up += 1;
                    }
                }
            }
        }
    }

    ctx.session.set_status(PresenceStatus::Offline);
    if let Err(e) = node.register(false).await {
        warn!(error = %e, "shutdown not announced to tracker");
    }
    info!(backed_up, "exiting");
    Ok(CommandResult::ok_with("Goodbye", &json!({ "backed_up": backed_up })))
}
