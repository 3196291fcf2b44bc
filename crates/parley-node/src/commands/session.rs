use serde_json::json;
use tracing::{info, warn};

use parley_shared::types::{is_single_token, is_visitor_name};
use parley_shared::PresenceStatus;

use crate::command::CommandResult;
use crate::error::NodeError;
use crate::node::Node;

/// `login:<name>`
pub async fn login(node: &Node, name: &str) -> Result<CommandResult, NodeError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(NodeError::InvalidCommand("username cannot be empty".into()));
    }
    if is_visitor_name(name) {
        return Err(NodeError::InvalidCommand(format!("'{name}' is reserved")));
    }
    if !is_single_token(name) {
        return Err(NodeError::InvalidCommand(format!(
            "'{name}' contains whitespace"
        )));
    }

    let ctx = &node.ctx;
    ctx.session.set_user(Some(name.to_string()));
    let queued = ctx.store.offline_queue(name)?.len();

    let registered = match node.register(false).await {
        Ok(_) => true,
        Err(e) => {
            warn!(user = name, error = %e, "login not announced to tracker");
            false
        }
    };

    let report = if ctx.session.is_offline() {
        None
    } else {
        node.drain_offline_queue(name)?;
        Some(node.engine.run_all().await)
    };

    info!(user = name, queued, registered, "logged in");
    Ok(CommandResult::ok_with(
        format!("Logged in as {name}"),
        &json!({
            "username": name,
            "status": ctx.session.status(),
            "queued": queued,
            "tracker": registered,
            "reconcile": report,
        }),
    ))
}

/// `logout`
pub async fn logout(node: &Node) -> Result<CommandResult, NodeError> {
    let Some(previous) = node.ctx.session.user() else {
        return Ok(CommandResult::ok("Already browsing as visitor"));
    };
    node.ctx.session.set_user(None);
    if let Err(e) = node.register(false).await {
        warn!(error = %e, "logout not announced to tracker");
    }
    info!(user = %previous, "logged out");
    Ok(CommandResult::ok(format!("{previous} logged out")))
}

/// `status <online|offline|invisible>`
pub async fn set_status(node: &Node, status: PresenceStatus) -> Result<CommandResult, NodeError> {
    let ctx = &node.ctx;
    let user = ctx
        .session
        .user()
        .ok_or(NodeError::NotAuthenticated("change status"))?;

    let previous = ctx.session.set_status(status);
    let registered = match node.register(false).await {
        Ok(_) => true,
        Err(e) => {
            warn!(%status, error = %e, "status not announced to tracker");
            false
        }
    };

    let mut drained = 0;
    let mut report = None;
    if previous.is_offline() && !status.is_offline() {
        drained = node.drain_offline_queue(&user)?;
        report = Some(node.engine.run_all().await);
    }

    info!(user = %user, from = %previous, to = %status, "status changed");
    Ok(CommandResult::ok_with(
        format!("Status set to {status}"),
        &json!({
            "status": status,
            "tracker": registered,
            "drained": drained,
            "reconcile": report,
        }),
    ))
}
