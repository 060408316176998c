//! Stream abstraction for admin connections.

use pin_project_lite::pin_project;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::net::TcpStream;

pin_project! {
    /// A byte stream carrying admin frames: a TCP socket, or an in-memory
    /// pipe for embedding and tests.
    #[project = AdminStreamProj]
    pub enum AdminStream {
        Tcp { #[pin] stream: TcpStream },
        Duplex { #[pin] stream: DuplexStream },
    }
}

impl AdminStream {
    /// Returns the remote address, if the stream has one.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match self {
            AdminStream::Tcp { stream } => stream.peer_addr().ok(),
            AdminStream::Duplex { .. } => None,
        }
    }

    /// Disables Nagle's algorithm on TCP streams.
    pub fn set_nodelay(&self) -> io::Result<()> {
        match self {
            AdminStream::Tcp { stream } => stream.set_nodelay(true),
            AdminStream::Duplex { .. } => Ok(()),
        }
    }

    pub fn is_tcp(&self) -> bool {
        matches!(self, AdminStream::Tcp { .. })
    }
}

impl From<TcpStream> for AdminStream {
    fn from(stream: TcpStream) -> Self {
        AdminStream::Tcp { stream }
    }
}

impl From<DuplexStream> for AdminStream {
    fn from(stream: DuplexStream) -> Self {
        AdminStream::Duplex { stream }
    }
}

impl AsyncRead for AdminStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            AdminStreamProj::Tcp { stream } => stream.poll_read(cx, buf),
            AdminStreamProj::Duplex { stream } => stream.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for AdminStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            AdminStreamProj::Tcp { stream } => stream.poll_write(cx, buf),
            AdminStreamProj::Duplex { stream } => stream.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            AdminStreamProj::Tcp { stream } => stream.poll_flush(cx),
            AdminStreamProj::Duplex { stream } => stream.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            AdminStreamProj::Tcp { stream } => stream.poll_shutdown(cx),
            AdminStreamProj::Duplex { stream } => stream.poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_duplex_passthrough() {
        let (a, b) = tokio::io::duplex(64);
        let mut a = AdminStream::from(a);
        let mut b = AdminStream::from(b);

        assert!(!a.is_tcp());
        assert!(a.peer_addr().is_none());
        a.set_nodelay().unwrap();

        a.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        b.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_tcp_peer_addr() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        let client = AdminStream::from(client);
        let server = AdminStream::from(server);
        assert!(server.is_tcp());
        server.set_nodelay().unwrap();
        assert_eq!(client.peer_addr(), Some(addr));
    }
}
