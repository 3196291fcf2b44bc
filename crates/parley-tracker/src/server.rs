//! TCP front of the tracker: accept loop, per-connection framing and request
//! dispatch.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use parley_net::framing::framed;
use parley_shared::{PresenceStatus, TrackerReply, TrackerRequest};

use crate::channels::ChannelDirectory;
use crate::probe::is_reachable;
use crate::registry::PeerRegistry;

/// Shared state handed to every connection task.
#[derive(Clone)]
pub struct TrackerState {
    pub registry: PeerRegistry,
    pub channels: Arc<ChannelDirectory>,
    pub probe_timeout: Duration,
}

impl TrackerState {
    pub fn new(channels: ChannelDirectory, probe_timeout: Duration) -> Self {
        Self {
            registry: PeerRegistry::new(),
            channels: Arc::new(channels),
            probe_timeout,
        }
    }
}

/// Accept connections forever, one task each.
pub async fn serve(listener: TcpListener, state: TrackerState) {
    loop {
        let (socket, remote) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        let state = state.clone();
        tokio::spawn(async move {
            handle_connection(socket, remote, state).await;
            debug!(peer = %remote, "disconnected");
        });
    }
}

async fn handle_connection(socket: TcpStream, remote: SocketAddr, state: TrackerState) {
    let mut stream = framed(socket);
    while let Some(frame) = stream.next().await {
        let line = match frame {
            Ok(line) => line,
            Err(e) => {
                warn!(peer = %remote, error = %e, "frame error");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let reply = dispatch(&state, &line).await;
        if let Err(e) = stream.send(reply.to_line()).await {
            debug!(peer = %remote, error = %e, "reply not delivered");
            break;
        }
    }
}

/// Answer one request line. Malformed requests get `ERROR: <reason>`.
pub async fn dispatch(state: &TrackerState, line: &str) -> TrackerReply {
    let request = match TrackerRequest::parse(line) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "rejected request");
            return TrackerReply::error(e);
        }
    };

    match request {
        TrackerRequest::SendInfo {
            ip,
            port,
            username,
            status,
            get_peers,
        } => {
            state
                .registry
                .register(SocketAddr::new(ip, port), &username, status)
                .await;
            if !get_peers {
                return TrackerReply::Ok(None);
            }
            match serde_json::to_string(&state.registry.list().await) {
                Ok(body) => TrackerReply::Ok(Some(body)),
                Err(e) => TrackerReply::error(e),
            }
        }

        TrackerRequest::GetList => {
            json_or_error(TrackerReply::json(&state.registry.list().await))
        }

        TrackerRequest::Ping => TrackerReply::Pong,

        TrackerRequest::CheckStatus(username) => check_status(state, &username).await,

        TrackerRequest::SyncChannel(sync) => match state.channels.apply_sync(sync).await {
            Ok(_) => TrackerReply::Ok(None),
            Err(e) => {
                warn!(error = %e, "sync_channel failed");
                TrackerReply::error(e)
            }
        },

        TrackerRequest::GetChannel(name) => match state.channels.get(&name).await {
            Some(channel) => json_or_error(TrackerReply::json(&channel)),
            None => TrackerReply::error("Channel not found"),
        },

        TrackerRequest::ListChannels => {
            json_or_error(TrackerReply::json(&state.channels.summaries().await))
        }

        TrackerRequest::Debug => {
            json_or_error(TrackerReply::json(&state.channels.debug_view().await))
        }
    }
}

async fn check_status(state: &TrackerState, username: &str) -> TrackerReply {
    let Some(record) = state.registry.lookup(username).await else {
        return TrackerReply::error("Unknown user");
    };
    if !record.probeable() {
        return TrackerReply::Status(PresenceStatus::Offline);
    }

    let addr = record.peer.addr();
    let reachable = is_reachable(addr, state.probe_timeout).await;
    state.registry.record_probe(addr, reachable, Utc::now()).await;
    info!(username, peer = %addr, reachable, "status check");

    TrackerReply::Status(if reachable {
        PresenceStatus::Online
    } else {
        PresenceStatus::Offline
    })
}

fn json_or_error(reply: Result<TrackerReply, parley_shared::ProtocolError>) -> TrackerReply {
    reply.unwrap_or_else(TrackerReply::error)
}
