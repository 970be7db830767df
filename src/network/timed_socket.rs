use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::time;

use crate::network::{PeerAddr, TransportStream};
use crate::{AppError, AppResult};

/// One connected endpoint with bounded-time read/write.
///
/// A deadline is applied by racing the single blocking operation against a
/// timer; an expired deadline yields `Ok(None)` and is not an error. Close
/// is idempotent; after it, read/write attempts fail with
/// [`AppError::SocketClosed`]. Dropping the socket releases the transport on
/// every exit path, including panics.
///
/// `split` hands out the two halves so a handler can read and write
/// concurrently (the relay registers its write half with its peer).
#[derive(Debug)]
pub struct TimedSocket {
    reader: SocketReader,
    writer: SocketWriter,
}

impl TimedSocket {
    pub fn new(stream: TransportStream, peer: PeerAddr) -> TimedSocket {
        let (read_half, write_half) = tokio::io::split(stream);
        TimedSocket {
            reader: SocketReader {
                inner: Some(read_half),
                peer: peer.clone(),
            },
            writer: SocketWriter {
                inner: Some(write_half),
                peer,
            },
        }
    }

    pub fn peer_addr(&self) -> &PeerAddr {
        &self.reader.peer
    }

    /// Reads up to `max_bytes`. `Ok(None)` means the deadline elapsed with
    /// no data; an empty result means the peer closed in an orderly way.
    /// Without a deadline, blocks until data or close.
    pub async fn receive(
        &mut self,
        max_bytes: usize,
        timeout: Option<Duration>,
    ) -> AppResult<Option<Bytes>> {
        self.reader.receive(max_bytes, timeout).await
    }

    /// Writes at most `data.len()` bytes. `Ok(None)` means the deadline
    /// elapsed before anything was written; a partial write (fewer bytes
    /// than given) is a valid outcome and the caller retries the remainder.
    pub async fn send(&mut self, data: &[u8], timeout: Option<Duration>) -> AppResult<Option<usize>> {
        self.writer.send(data, timeout).await
    }

    /// Retries [`send`](Self::send) until all of `data` is written.
    pub async fn send_all(&mut self, data: &[u8], timeout: Option<Duration>) -> AppResult<()> {
        self.writer.send_all(data, timeout).await
    }

    pub fn is_closed(&self) -> bool {
        self.reader.inner.is_none() && self.writer.inner.is_none()
    }

    pub async fn close(&mut self) {
        self.writer.close().await;
        self.reader.close();
    }

    pub fn split(self) -> (SocketReader, SocketWriter) {
        (self.reader, self.writer)
    }
}

/// Read half of a [`TimedSocket`].
#[derive(Debug)]
pub struct SocketReader {
    inner: Option<ReadHalf<TransportStream>>,
    peer: PeerAddr,
}

impl SocketReader {
    pub fn peer_addr(&self) -> &PeerAddr {
        &self.peer
    }

    pub async fn receive(
        &mut self,
        max_bytes: usize,
        timeout: Option<Duration>,
    ) -> AppResult<Option<Bytes>> {
        let reader = self.inner.as_mut().ok_or(AppError::SocketClosed)?;
        let mut buf = vec![0u8; max_bytes];
        let n = match timeout {
            Some(limit) => match time::timeout(limit, reader.read(&mut buf)).await {
                Ok(read_result) => read_result?,
                Err(_) => return Ok(None),
            },
            None => reader.read(&mut buf).await?,
        };
        buf.truncate(n);
        Ok(Some(Bytes::from(buf)))
    }

    pub fn close(&mut self) {
        self.inner.take();
    }
}

/// Write half of a [`TimedSocket`].
#[derive(Debug)]
pub struct SocketWriter {
    inner: Option<WriteHalf<TransportStream>>,
    peer: PeerAddr,
}

impl SocketWriter {
    pub fn peer_addr(&self) -> &PeerAddr {
        &self.peer
    }

    pub async fn send(&mut self, data: &[u8], timeout: Option<Duration>) -> AppResult<Option<usize>> {
        let writer = self.inner.as_mut().ok_or(AppError::SocketClosed)?;
        let n = match timeout {
            Some(limit) => match time::timeout(limit, writer.write(data)).await {
                Ok(write_result) => write_result?,
                Err(_) => return Ok(None),
            },
            None => writer.write(data).await?,
        };
        Ok(Some(n))
    }

    pub async fn send_all(&mut self, data: &[u8], timeout: Option<Duration>) -> AppResult<()> {
        let mut remaining = data;
        while !remaining.is_empty() {
            match self.send(remaining, timeout).await? {
                Some(0) => {
                    return Err(AppError::Connection(format!(
                        "peer {} stopped accepting data",
                        self.peer
                    )))
                }
                Some(n) => remaining = &remaining[n..],
                None => {
                    return Err(AppError::Connection(format!(
                        "send to {} timed out",
                        self.peer
                    )))
                }
            }
        }
        Ok(())
    }

    pub async fn close(&mut self) {
        if let Some(mut writer) = self.inner.take() {
            let _ = writer.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    async fn socket_pair() -> (TimedSocket, TimedSocket) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, (server, server_peer)) =
            tokio::join!(TcpStream::connect(addr), async {
                listener.accept().await.unwrap()
            });
        let client = client.unwrap();
        let client_peer = client.peer_addr().unwrap();
        (
            TimedSocket::new(TransportStream::Tcp(client), PeerAddr::Tcp(client_peer)),
            TimedSocket::new(TransportStream::Tcp(server), PeerAddr::Tcp(server_peer)),
        )
    }

    #[tokio::test]
    async fn test_receive_deadline_returns_none() {
        let (mut a, _b) = socket_pair().await;
        let started = time::Instant::now();
        let result = a.receive(64, Some(Duration::from_millis(100))).await;
        assert!(matches!(result, Ok(None)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_send_receive_roundtrip() -> AppResult<()> {
        let (mut a, mut b) = socket_pair().await;
        a.send_all(b"hello", None).await?;
        let data = b.receive(64, Some(Duration::from_secs(1))).await?.unwrap();
        assert_eq!(&data[..], b"hello");
        Ok(())
    }

    #[tokio::test]
    async fn test_receive_empty_on_orderly_close() -> AppResult<()> {
        let (mut a, mut b) = socket_pair().await;
        a.close().await;
        let data = b.receive(64, Some(Duration::from_secs(1))).await?.unwrap();
        assert!(data.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut a, _b) = socket_pair().await;
        a.close().await;
        a.close().await;
        assert!(a.is_closed());

        assert!(matches!(
            a.receive(1, None).await,
            Err(AppError::SocketClosed)
        ));
        assert!(matches!(
            a.send(b"x", None).await,
            Err(AppError::SocketClosed)
        ));
    }
}
