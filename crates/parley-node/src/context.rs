//! Everything the control loop, the inbound handler and the reconciliation
//! engine share.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tracing::{debug, warn};

use parley_net::{PeerSender, TrackerClient};
use parley_shared::{Channel, NodeEvent, Peer};
use parley_store::LocalStore;

use crate::history::HistoryWaiters;
use crate::session::Session;

#[derive(Clone)]
pub struct NodeContext {
    pub store: Arc<LocalStore>,
    pub session: Session,
    pub tracker: TrackerClient,
    pub sender: PeerSender,
    pub waiters: HistoryWaiters,
    pub history_wait: Duration,
    advertise: Arc<OnceLock<SocketAddr>>,
    peer_cache: Arc<Mutex<Vec<Peer>>>,
}

impl NodeContext {
    pub fn new(
        store: Arc<LocalStore>,
        tracker: TrackerClient,
        sender: PeerSender,
        history_wait: Duration,
    ) -> Self {
        Self {
            store,
            session: Session::new(),
            tracker,
            sender,
            waiters: HistoryWaiters::new(),
            history_wait,
            advertise: Arc::new(OnceLock::new()),
            peer_cache: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set once the listener is bound.
    pub fn set_advertise(&self, addr: SocketAddr) {
        let _ = self.advertise.set(addr);
    }

    /// The address other nodes should use to reach this one.
    pub fn advertise(&self) -> Option<SocketAddr> {
        self.advertise.get().copied()
    }

    /// The tracker's peer list, or the last one seen if it is unreachable.
    pub async fn known_peers(&self) -> Vec<Peer> {
        match self.tracker.peers().await {
            Ok(peers) => {
                self.remember_peers(peers.clone());
                peers
            }
            Err(e) => {
                debug!(error = %e, "using cached peer list");
                self.peer_cache
                    .lock()
                    .map(|cache| cache.clone())
                    .unwrap_or_default()
            }
        }
    }

    pub fn remember_peers(&self, peers: Vec<Peer>) {
        if let Ok(mut cache) = self.peer_cache.lock() {
            *cache = peers;
        }
    }

    /// Last known address of `username`, preferring the freshest record.
    pub async fn resolve(&self, username: &str) -> Option<SocketAddr> {
        self.known_peers()
            .await
            .into_iter()
            .filter(|p| p.username == username)
            .max_by_key(|p| p.last_seen)
            .map(|p| p.addr())
    }

    /// Addresses of the channel's online participants, minus the given
    /// usernames and this node itself.
    pub async fn online_participants(&self, channel: &Channel, exclude: &[&str]) -> Vec<SocketAddr> {
        let me = self.advertise();
        let mut addrs: Vec<SocketAddr> = self
            .known_peers()
            .await
            .into_iter()
            .filter(|p| p.is_online())
            .filter(|p| channel.is_participant(&p.username))
            .filter(|p| !exclude.contains(&p.username.as_str()))
            .map(|p| p.addr())
            .filter(|addr| Some(*addr) != me)
            .collect();
        addrs.sort();
        addrs.dedup();
        addrs
    }

    /// Send `event` to each target; returns how many accepted it.
    pub async fn deliver(&self, targets: &[SocketAddr], event: &NodeEvent) -> usize {
        self.sender
            .broadcast(targets, event)
            .await
            .iter()
            .filter(|(_, outcome)| outcome.is_ok())
            .count()
    }

    /// Push `channel` to the tracker under the current username.
    pub async fn push_to_tracker(&self, channel: &Channel) -> bool {
        let submitter = self.session.username();
        match self.tracker.sync_channel(channel, &submitter).await {
            Ok(()) => {
                debug!(channel = %channel.name, messages = channel.messages.len(), "pushed to tracker");
                true
            }
            Err(e) => {
                warn!(channel = %channel.name, error = %e, "tracker push failed");
                false
            }
        }
    }
}
