//! Inbound accept loop for node ↔ node events.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tokio_util::codec::LinesCodecError;

use parley_shared::NodeEvent;

use crate::error::NetError;
use crate::framing::framed;

/// Receives every well-formed event decoded by the listener.
#[async_trait]
pub trait InboundHandler: Send + Sync + 'static {
    async fn handle(&self, event: NodeEvent, remote: SocketAddr);
}

/// Bind `bind` and serve connections in the background, one task each.
///
/// Returns the bound address (useful with port 0) and the accept loop task.
pub async fn spawn_listener<H: InboundHandler>(
    bind: SocketAddr,
    handler: Arc<H>,
) -> Result<(SocketAddr, JoinHandle<()>), NetError> {
    let listener = TcpListener::bind(bind).await?;
    let local = listener.local_addr()?;
    info!(addr = %local, "node listener started");

    let task = tokio::spawn(async move {
        loop {
            let (socket, remote) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                serve_connection(socket, remote, handler).await;
            });
        }
    });

    Ok((local, task))
}

async fn serve_connection<H: InboundHandler>(socket: TcpStream, remote: SocketAddr, handler: Arc<H>) {
    let mut stream = framed(socket);
    while let Some(frame) = stream.next().await {
        let line = match frame {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!(peer = %remote, "oversized frame dropped");
                continue;
            }
            Err(LinesCodecError::Io(e)) => {
                debug!(peer = %remote, error = %e, "connection error");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match NodeEvent::from_line(&line) {
            Ok(event) => handler.handle(event, remote).await,
            Err(e) => warn!(peer = %remote, error = %e, "malformed frame dropped"),
        }
    }
}
