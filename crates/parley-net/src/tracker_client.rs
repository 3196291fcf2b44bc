//! Typed client for the tracker's line protocol.
//!
//! Every call opens a fresh connection bounded by the client timeout, so a
//! dead tracker costs at most one timeout per call and never a panic.

use std::net::SocketAddr;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;

use parley_shared::protocol::ChannelDebug;
use parley_shared::{
    Channel, ChannelSummary, ChannelSync, Peer, PresenceStatus, TrackerReply, TrackerRequest,
};

use crate::error::NetError;
use crate::framing::request_line;

#[derive(Debug, Clone)]
pub struct TrackerClient {
    addr: SocketAddr,
    timeout: Duration,
}

impl TrackerClient {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn request(&self, req: &TrackerRequest) -> Result<TrackerReply, NetError> {
        let line = req.to_line()?;
        let reply = request_line(self.addr, &line, self.timeout).await?;
        match TrackerReply::parse(&reply)? {
            TrackerReply::Error(reason) => Err(NetError::Tracker(reason)),
            other => Ok(other),
        }
    }

    /// Register this node's advertised address, name and presence. With
    /// `get_peers` the tracker inlines its peer list.
    pub async fn register(
        &self,
        advertise: SocketAddr,
        username: &str,
        status: PresenceStatus,
        get_peers: bool,
    ) -> Result<Option<Vec<Peer>>, NetError> {
        let req = TrackerRequest::SendInfo {
            ip: advertise.ip(),
            port: advertise.port(),
            username: username.to_string(),
            status,
            get_peers,
        };
        match self.request(&req).await? {
            TrackerReply::Ok(None) => Ok(None),
            TrackerReply::Ok(Some(body)) => Ok(Some(serde_json::from_str(&body)?)),
            other => Err(unexpected(other)),
        }
    }

    pub async fn peers(&self) -> Result<Vec<Peer>, NetError> {
        self.json(&TrackerRequest::GetList).await
    }

    pub async fn ping(&self) -> Result<(), NetError> {
        match self.request(&TrackerRequest::Ping).await? {
            TrackerReply::Pong => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn is_reachable(&self) -> bool {
        match self.ping().await {
            Ok(()) => true,
            Err(e) => {
                debug!(tracker = %self.addr, error = %e, "tracker unreachable");
                false
            }
        }
    }

    /// Presence of `username` as the tracker sees it. `None` if the tracker
    /// has never heard of that user.
    pub async fn check_status(&self, username: &str) -> Result<Option<PresenceStatus>, NetError> {
        match self
            .request(&TrackerRequest::CheckStatus(username.to_string()))
            .await
        {
            Ok(TrackerReply::Status(status)) => Ok(Some(status)),
            Ok(other) => Err(unexpected(other)),
            Err(NetError::Tracker(reason)) if reason.eq_ignore_ascii_case("unknown user") => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn sync_channel(&self, channel: &Channel, submitter: &str) -> Result<(), NetError> {
        let req = TrackerRequest::SyncChannel(ChannelSync::new(channel.clone(), submitter));
        match self.request(&req).await? {
            TrackerReply::Ok(_) => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// The tracker's backup copy of `name`, if it has one.
    pub async fn get_channel(&self, name: &str) -> Result<Option<Channel>, NetError> {
        match self.json(&TrackerRequest::GetChannel(name.to_string())).await {
            Ok(channel) => Ok(Some(channel)),
            Err(NetError::Tracker(reason)) if reason.eq_ignore_ascii_case("channel not found") => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn list_channels(&self) -> Result<Vec<ChannelSummary>, NetError> {
        self.json(&TrackerRequest::ListChannels).await
    }

    pub async fn debug(&self) -> Result<Vec<ChannelDebug>, NetError> {
        self.json(&TrackerRequest::Debug).await
    }

    async fn json<T: DeserializeOwned>(&self, req: &TrackerRequest) -> Result<T, NetError> {
        match self.request(req).await? {
            TrackerReply::Json(body) => Ok(serde_json::from_str(&body)?),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(reply: TrackerReply) -> NetError {
    NetError::UnexpectedReply(reply.to_line())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;

    use crate::framing::framed;

    /// A tracker stand-in answering each request with a canned line.
    async fn canned(reply: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let mut stream = framed(socket);
                if stream.next().await.is_some() {
                    let _ = stream.send(reply).await;
                }
            }
        });
        addr
    }

    fn client(addr: SocketAddr) -> TrackerClient {
        TrackerClient::new(addr, Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_check_status_unknown_user() {
        let addr = canned("ERROR: Unknown user").await;
        assert_eq!(client(addr).check_status("ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_check_status_offline() {
        let addr = canned("STATUS: offline").await;
        assert_eq!(
            client(addr).check_status("alice").await.unwrap(),
            Some(PresenceStatus::Offline)
        );
    }

    #[tokio::test]
    async fn test_get_channel_not_found() {
        let addr = canned("ERROR: Channel not found").await;
        assert!(client(addr).get_channel("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_with_inline_peers() {
        let addr = canned(
            r#"OK [{"ip":"127.0.0.1","port":9001,"username":"alice","status":"online"}]"#,
        )
        .await;
        let peers = client(addr)
            .register("127.0.0.1:9002".parse().unwrap(), "bob", PresenceStatus::Online, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].username, "alice");
    }

    #[tokio::test]
    async fn test_unreachable_tracker() {
        let dead = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap()
        };
        let c = client(dead);
        assert!(!c.is_reachable().await);
        assert!(c.list_channels().await.is_err());
    }
}
