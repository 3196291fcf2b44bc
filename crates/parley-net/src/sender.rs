//! One-shot delivery of [`NodeEvent`]s to other nodes.

use std::net::SocketAddr;
use std::time::Duration;

use futures::future::join_all;
use tracing::debug;

use parley_shared::NodeEvent;

use crate::error::NetError;
use crate::framing::send_line;

/// Sends each event over its own short-lived connection.
#[derive(Debug, Clone)]
pub struct PeerSender {
    timeout: Duration,
}

impl PeerSender {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn send(&self, addr: SocketAddr, event: &NodeEvent) -> Result<(), NetError> {
        let line = event.to_line()?;
        send_line(addr, &line, self.timeout).await
    }

    /// Send `event` to every target concurrently. One slow or dead target
    /// never holds up the others.
    pub async fn broadcast(
        &self,
        targets: &[SocketAddr],
        event: &NodeEvent,
    ) -> Vec<(SocketAddr, Result<(), NetError>)> {
        let line = match event.to_line() {
            Ok(line) => line,
            Err(e) => {
                let reason = e.to_string();
                return targets
                    .iter()
                    .map(|addr| (*addr, Err(NetError::Encode(reason.clone()))))
                    .collect();
            }
        };

        let sends = targets.iter().map(|addr| {
            let line = line.as_str();
            async move {
                let outcome = send_line(*addr, line, self.timeout).await;
                if let Err(e) = &outcome {
                    debug!(peer = %addr, error = %e, "peer delivery failed");
                }
                (*addr, outcome)
            }
        });
        join_all(sends).await
    }
}
