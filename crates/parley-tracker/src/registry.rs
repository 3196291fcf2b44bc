//! In-memory peer registry keyed by advertised address.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use parley_shared::{Peer, PresenceStatus};

#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub peer: Peer,
    /// The node itself said it is going offline. Probes never override this.
    pub explicit_offline: bool,
    /// Set by the first failed probe, cleared by any sign of life.
    pub unreachable_since: Option<DateTime<Utc>>,
}

impl PeerRecord {
    /// Whether a probe is allowed to decide this peer's status.
    pub fn probeable(&self) -> bool {
        !self.explicit_offline && self.peer.status != PresenceStatus::Invisible
    }
}

#[derive(Clone, Default)]
pub struct PeerRegistry {
    peers: Arc<Mutex<HashMap<SocketAddr, PeerRecord>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert the record for `addr`.
    pub async fn register(&self, addr: SocketAddr, username: &str, status: PresenceStatus) {
        let mut peers = self.peers.lock().await;
        let record = peers.entry(addr).or_insert_with(|| {
            info!(peer = %addr, username, "new peer registered");
            PeerRecord {
                peer: Peer::new(addr, username, status),
                explicit_offline: false,
                unreachable_since: None,
            }
        });

        record.peer = Peer::new(addr, username, status);
        record.explicit_offline = status.is_offline();
        record.unreachable_since = None;
        debug!(peer = %addr, username = %record.peer.username, %status, "peer registered");
    }

    /// Every peer, with invisible ones shown as offline.
    pub async fn list(&self) -> Vec<Peer> {
        let peers = self.peers.lock().await;
        let mut out: Vec<Peer> = peers
            .values()
            .map(|r| {
                let mut peer = r.peer.clone();
                peer.status = peer.status.public();
                peer
            })
            .collect();
        out.sort_by(|a, b| a.username.cmp(&b.username).then(a.addr().cmp(&b.addr())));
        out
    }

    /// The most recently seen record registered under `username`.
    pub async fn lookup(&self, username: &str) -> Option<PeerRecord> {
        let peers = self.peers.lock().await;
        peers
            .values()
            .filter(|r| r.peer.username == username)
            .max_by_key(|r| r.peer.last_seen)
            .cloned()
    }

    /// Apply the result of a reachability probe of `addr`.
    pub async fn record_probe(&self, addr: SocketAddr, reachable: bool, now: DateTime<Utc>) {
        let mut peers = self.peers.lock().await;
        let Some(record) = peers.get_mut(&addr) else {
            return;
        };
        // The peer may have re-registered while the probe was in flight.
        if !record.probeable() {
            return;
        }
        if reachable {
            if record.peer.status != PresenceStatus::Online {
                info!(peer = %addr, username = %record.peer.username, "peer reachable again");
            }
            record.peer.status = PresenceStatus::Online;
            record.peer.last_seen = now;
            record.unreachable_since = None;
        } else {
            if record.peer.status == PresenceStatus::Online {
                info!(peer = %addr, username = %record.peer.username, "peer unreachable");
            }
            record.peer.status = PresenceStatus::Offline;
            record.unreachable_since.get_or_insert(now);
        }
    }

    /// Addresses the sweep should probe: probeable and unseen for longer
    /// than `liveness`.
    pub async fn stale(&self, now: DateTime<Utc>, liveness: Duration) -> Vec<SocketAddr> {
        let peers = self.peers.lock().await;
        peers
            .iter()
            .filter(|(_, r)| r.probeable() && older_than(r.peer.last_seen, now, liveness))
            .map(|(addr, _)| *addr)
            .collect()
    }

    /// Drop records unreachable for longer than `window`, and explicitly
    /// offline records unseen for that long. Returns the removed addresses.
    pub async fn evict(&self, now: DateTime<Utc>, window: Duration) -> Vec<SocketAddr> {
        let mut peers = self.peers.lock().await;
        let mut evicted = Vec::new();
        peers.retain(|addr, r| {
            let gone = match r.unreachable_since {
                Some(since) => older_than(since, now, window),
                None => r.explicit_offline && older_than(r.peer.last_seen, now, window),
            };
            if gone {
                evicted.push(*addr);
            }
            !gone
        });
        evicted
    }

    pub async fn len(&self) -> usize {
        self.peers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.lock().await.is_empty()
    }

    #[cfg(test)]
    pub(crate) async fn backdate(&self, addr: SocketAddr, by: chrono::Duration) {
        if let Some(r) = self.peers.lock().await.get_mut(&addr) {
            r.peer.last_seen = r.peer.last_seen - by;
        }
    }
}

fn older_than(then: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    (now - then).to_std().map(|age| age > window).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn test_register_upserts_by_address() {
        let reg = PeerRegistry::new();
        reg.register(addr(9001), "alice", PresenceStatus::Online).await;
        reg.register(addr(9001), "alicia", PresenceStatus::Online).await;
        reg.register(addr(9002), "", PresenceStatus::Online).await;

        let peers = reg.list().await;
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].username, "alicia");
        assert_eq!(peers[1].username, "visitor");
    }

    #[tokio::test]
    async fn test_invisible_listed_as_offline() {
        let reg = PeerRegistry::new();
        reg.register(addr(9001), "alice", PresenceStatus::Invisible).await;
        assert_eq!(reg.list().await[0].status, PresenceStatus::Offline);
        assert_eq!(
            reg.lookup("alice").await.unwrap().peer.status,
            PresenceStatus::Invisible
        );
    }

    #[tokio::test]
    async fn test_explicit_offline_survives_probe() {
        let reg = PeerRegistry::new();
        reg.register(addr(9001), "alice", PresenceStatus::Offline).await;
        reg.record_probe(addr(9001), true, Utc::now()).await;

        let rec = reg.lookup("alice").await.unwrap();
        assert!(rec.explicit_offline);
        assert_eq!(rec.peer.status, PresenceStatus::Offline);

        reg.register(addr(9001), "alice", PresenceStatus::Online).await;
        assert!(!reg.lookup("alice").await.unwrap().explicit_offline);
    }

    #[tokio::test]
    async fn test_stale_skips_offline_and_invisible() {
        let reg = PeerRegistry::new();
        reg.register(addr(1), "a", PresenceStatus::Online).await;
        reg.register(addr(2), "b", PresenceStatus::Offline).await;
        reg.register(addr(3), "c", PresenceStatus::Invisible).await;
        for port in 1..=3 {
            reg.backdate(addr(port), chrono::Duration::seconds(120)).await;
        }

        let stale = reg.stale(Utc::now(), Duration::from_secs(90)).await;
        assert_eq!(stale, vec![addr(1)]);
    }

    #[tokio::test]
    async fn test_eviction_after_window() {
        let reg = PeerRegistry::new();
        reg.register(addr(1), "a", PresenceStatus::Online).await;
        reg.register(addr(2), "b", PresenceStatus::Online).await;
        let start = Utc::now();
        reg.record_probe(addr(1), false, start).await;

        let hour = Duration::from_secs(3600);
        assert!(reg.evict(start + chrono::Duration::minutes(30), hour).await.is_empty());
        let evicted = reg.evict(start + chrono::Duration::minutes(61), hour).await;
        assert_eq!(evicted, vec![addr(1)]);
        assert_eq!(reg.len().await, 1);
    }

    #[tokio::test]
    async fn test_lookup_prefers_most_recent() {
        let reg = PeerRegistry::new();
        reg.register(addr(1), "alice", PresenceStatus::Online).await;
        reg.register(addr(2), "alice", PresenceStatus::Online).await;
        reg.backdate(addr(1), chrono::Duration::seconds(10)).await;
        assert_eq!(reg.lookup("alice").await.unwrap().peer.addr(), addr(2));
    }
}
