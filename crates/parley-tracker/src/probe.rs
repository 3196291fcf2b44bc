use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;

/// Whether something accepts TCP connections at `addr` within `limit`.
/// The connection is closed immediately without sending a frame.
pub async fn is_reachable(addr: SocketAddr, limit: Duration) -> bool {
    matches!(
        tokio::time::timeout(limit, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_probe_open_and_closed_ports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap();
        assert!(is_reachable(open, Duration::from_millis(500)).await);

        drop(listener);
        assert!(!is_reachable(open, Duration::from_millis(500)).await);
    }
}
