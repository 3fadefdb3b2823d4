use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{ready, TryFutureExt};
use thiserror::Error;
use tokio::io::{
    AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf, ReadHalf,
    WriteHalf,
};

use crate::wire::WireRecord;

pub mod config;
pub mod networking;

/// Remote end of a stream, used to label transport failures.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Link {
    Dealer,
    Peer,
    Store,
    Client(usize),
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Link::Dealer => write!(f, "dealer"),
            Link::Peer => write!(f, "peer"),
            Link::Store => write!(f, "bundle store"),
            Link::Client(id) => write!(f, "client {}", id),
        }
    }
}

/// Error type for channels.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Error while sending message to {link}: {source}")]
    Send {
        link: Link,
        #[source]
        source: io::Error,
    },
    #[error("Error while receiving message from {link}: {source}")]
    Recv {
        link: Link,
        #[source]
        source: io::Error,
    },
}

impl TransportError {
    pub fn send(link: Link) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Send { link, source }
    }

    pub fn recv(link: Link) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Recv { link, source }
    }

    pub fn link(&self) -> Link {
        match self {
            Self::Send { link, .. } | Self::Recv { link, .. } => *link,
        }
    }

    pub fn kind(&self) -> io::ErrorKind {
        match self {
            Self::Send { source, .. } | Self::Recv { source, .. } => source.kind(),
        }
    }
}

/// Stream wrapper counting the bytes that pass through it.
#[derive(Debug)]
pub struct Metered<S> {
    inner: S,
    bytes: u64,
}

impl<S> Metered<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, bytes: 0 }
    }

    /// Bytes read or written so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Metered<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        this.bytes += (buf.filled().len() - before) as u64;
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncBufRead + Unpin> AsyncBufRead for Metered<S> {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        Pin::new(&mut self.get_mut().inner).poll_fill_buf(cx)
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        let this = self.get_mut();
        this.bytes += amt as u64;
        Pin::new(&mut this.inner).consume(amt);
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Metered<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let written = ready!(Pin::new(&mut this.inner).poll_write(cx, buf))?;
        this.bytes += written as u64;
        Poll::Ready(Ok(written))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Write one record and flush.
pub async fn send_record<W, M>(writer: &mut W, record: &M, link: Link) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin + Send,
    M: WireRecord + Sync,
{
    let bytes = record.to_bytes();
    async {
        writer.write_all(&bytes).await?;
        writer.flush().await
    }
    .await
    .map_err(TransportError::send(link))
}

/// Read one record.
pub async fn recv_record<T, M>(reader: &mut T, link: Link) -> Result<M, TransportError>
where
    T: AsyncRead + Unpin + Send,
    M: WireRecord,
{
    M::decode(reader).await.map_err(TransportError::recv(link))
}

/// Connection to the counter-peer, split into unidirectional halves.
pub struct PeerLink<S> {
    reader: Metered<ReadHalf<S>>,
    writer: Metered<WriteHalf<S>>,
}

impl<S> PeerLink<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    pub fn new(stream: S) -> Self {
        // Split halves let the send and the receive of one exchange make
        // progress at the same time.
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Metered::new(reader),
            writer: Metered::new(writer),
        }
    }

    /// Concurrently send `msg` and receive the counter-peer's message of the
    /// same type.
    pub async fn exchange<M: WireRecord + Sync>(&mut self, msg: &M) -> Result<M, TransportError> {
        let Self { reader, writer } = self;
        let send_future = send_record(writer, msg, Link::Peer);
        let recv_future = M::decode(reader).map_err(TransportError::recv(Link::Peer));
        let ((), received) = futures::try_join!(send_future, recv_future)?;
        Ok(received)
    }

    pub fn bytes_read(&self) -> u64 {
        self.reader.bytes()
    }

    pub fn bytes_written(&self) -> u64 {
        self.writer.bytes()
    }
}

/// Create a connected pair of in-process peer links for tests.
pub fn mock_peer_links(max_buf_size: usize) -> (PeerLink<DuplexStream>, PeerLink<DuplexStream>) {
    let (a, b) = tokio::io::duplex(max_buf_size);
    (PeerLink::new(a), PeerLink::new(b))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

    use super::*;
    use crate::{Ring, Z64};

    #[tokio::test]
    async fn test_exchange() {
        let (mut a, mut b) = mock_peer_links(64);
        let (one, two) = (Z64::new(1), Z64::new(2));
        let (from_b, from_a) =
            futures::try_join!(a.exchange(&one), b.exchange(&two)).unwrap();
        assert_eq!(from_b, Z64::new(2));
        assert_eq!(from_a, Z64::new(1));
        assert_eq!(a.bytes_written(), 8);
        assert_eq!(a.bytes_read(), 8);
    }

    #[tokio::test]
    async fn test_exchange_with_closed_peer() {
        let (mut a, b) = mock_peer_links(64);
        drop(b);
        let err = a.exchange(&Z64::one()).await.unwrap_err();
        assert_eq!(err.link(), Link::Peer);
    }

    #[tokio::test]
    async fn test_metered_buffered_reader() {
        let mut reader = Metered::new(BufReader::new(Cursor::new(vec![7u8; 20])));
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(reader.bytes(), 8);
        assert!(!reader.fill_buf().await.unwrap().is_empty());
        assert_eq!(reader.bytes(), 8);
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(reader.bytes(), 16);
    }

    #[tokio::test]
    async fn test_recv_truncated_record() {
        let mut reader = Cursor::new(vec![1u8, 2, 3]);
        let err = recv_record::<_, Z64>(&mut reader, Link::Store)
            .await
            .unwrap_err();
        assert_eq!(err.link(), Link::Store);
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
