//! Newline-delimited framing over short-lived TCP connections.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};

use parley_shared::constants::MAX_FRAME_LENGTH;

use crate::error::NetError;

pub type LineStream = Framed<TcpStream, LinesCodec>;

pub fn line_codec() -> LinesCodec {
    LinesCodec::new_with_max_length(MAX_FRAME_LENGTH)
}

pub fn framed(stream: TcpStream) -> LineStream {
    Framed::new(stream, line_codec())
}

async fn bounded<T, F>(
    addr: SocketAddr,
    op: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, NetError>
where
    F: std::future::Future<Output = Result<T, NetError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| NetError::Timeout { addr, op })?
}

/// Dial `addr`, giving up after `limit`.
pub async fn connect(addr: SocketAddr, limit: Duration) -> Result<LineStream, NetError> {
    bounded(addr, "connect", limit, async {
        Ok::<_, NetError>(framed(TcpStream::connect(addr).await?))
    })
    .await
}

/// Open a connection, write one frame and close it.
pub async fn send_line(addr: SocketAddr, line: &str, limit: Duration) -> Result<(), NetError> {
    let mut stream = connect(addr, limit).await?;
    bounded(addr, "write", limit, async {
        stream.send(line).await?;
        SinkExt::<&str>::close(&mut stream).await?;
        Ok::<_, NetError>(())
    })
    .await
}

/// Open a connection, write one frame and wait for one reply frame.
pub async fn request_line(addr: SocketAddr, line: &str, limit: Duration) -> Result<String, NetError> {
    let mut stream = connect(addr, limit).await?;
    bounded(addr, "write", limit, async {
        stream.send(line).await?;
        Ok::<_, NetError>(())
    })
    .await?;
    bounded(addr, "read", limit, async {
        match stream.next().await {
            Some(frame) => Ok::<_, NetError>(frame?),
            None => Err(NetError::ConnectionClosed(addr)),
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const LIMIT: Duration = Duration::from_millis(500);

    #[tokio::test]
    async fn test_request_line_echo() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut stream = framed(socket);
            let line = stream.next().await.unwrap().unwrap();
            stream.send(format!("echo {line}")).await.unwrap();
        });

        let reply = request_line(addr, "ping", LIMIT).await.unwrap();
        assert_eq!(reply, "echo ping");
    }

    #[tokio::test]
    async fn test_send_line_delivers_then_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut stream = framed(socket);
            let line = stream.next().await.unwrap().unwrap();
            (line, stream.next().await.is_none())
        });

        send_line(addr, "hello", LIMIT).await.unwrap();
        let (line, closed) = received.await.unwrap();
        assert_eq!(line, "hello");
        assert!(closed);
    }

    #[tokio::test]
    async fn test_connect_refused_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(send_line(addr, "hello", LIMIT).await.is_err());
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let err = request_line(addr, "ping", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::Timeout { op: "read", .. }));
    }
}
