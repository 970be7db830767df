use std::fmt;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};

use crate::{AppError, AppResult};

/// Supported transport families. The relay bridges one listener of each
/// kind; adding a kind means adding a variant here and in the address,
/// listener and stream enums below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    Bluetooth,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Tcp => write!(f, "tcp"),
            TransportKind::Bluetooth => write!(f, "bluetooth"),
        }
    }
}

/// Address a listener binds to, family-specific.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindAddress {
    Tcp(SocketAddr),
    /// Adapter MAC plus RFCOMM channel.
    Rfcomm { adapter: String, channel: u8 },
}

impl BindAddress {
    pub fn kind(&self) -> TransportKind {
        match self {
            BindAddress::Tcp(_) => TransportKind::Tcp,
            BindAddress::Rfcomm { .. } => TransportKind::Bluetooth,
        }
    }
}

impl fmt::Display for BindAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindAddress::Tcp(addr) => write!(f, "tcp://{}", addr),
            BindAddress::Rfcomm { adapter, channel } => {
                write!(f, "rfcomm://{}:{}", adapter, channel)
            }
        }
    }
}

/// Remote endpoint of an accepted or dialed connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAddr {
    Tcp(SocketAddr),
    Rfcomm { address: String, channel: u8 },
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerAddr::Tcp(addr) => write!(f, "{}", addr),
            PeerAddr::Rfcomm { address, channel } => write!(f, "{}:{}", address, channel),
        }
    }
}

/// A bound, listening endpoint of one transport kind.
#[derive(Debug)]
pub enum TransportListener {
    Tcp(TcpListener),
    #[cfg(feature = "bluetooth")]
    Rfcomm {
        listener: bluer::rfcomm::Listener,
        addr: BindAddress,
    },
}

impl TransportListener {
    /// Binds `addr` and starts listening with the given backlog. Any
    /// failure here is fatal for the listener being started.
    pub async fn bind(addr: &BindAddress, backlog: u32) -> AppResult<TransportListener> {
        match addr {
            BindAddress::Tcp(socket_addr) => {
                let socket = if socket_addr.is_ipv4() {
                    TcpSocket::new_v4()
                } else {
                    TcpSocket::new_v6()
                }
                .map_err(|e| AppError::Bind(format!("create socket for {}: {}", addr, e)))?;
                socket
                    .set_reuseaddr(true)
                    .map_err(|e| AppError::Bind(format!("set reuseaddr on {}: {}", addr, e)))?;
                socket
                    .bind(*socket_addr)
                    .map_err(|e| AppError::Bind(format!("bind {}: {}", addr, e)))?;
                let listener = socket
                    .listen(backlog)
                    .map_err(|e| AppError::Bind(format!("listen on {}: {}", addr, e)))?;
                Ok(TransportListener::Tcp(listener))
            }
            #[cfg(feature = "bluetooth")]
            BindAddress::Rfcomm { adapter, channel } => {
                let address = adapter.parse::<bluer::Address>().map_err(|e| {
                    AppError::InvalidValue(format!("adapter address {}: {}", adapter, e))
                })?;
                let socket_addr = bluer::rfcomm::SocketAddr::new(address, *channel);
                let listener = bluer::rfcomm::Listener::bind(socket_addr)
                    .await
                    .map_err(|e| AppError::Bind(format!("bind {}: {}", addr, e)))?;
                Ok(TransportListener::Rfcomm {
                    listener,
                    addr: addr.clone(),
                })
            }
            #[cfg(not(feature = "bluetooth"))]
            BindAddress::Rfcomm { .. } => Err(AppError::Bind(format!(
                "bind {}: bluetooth transport support not compiled in",
                addr
            ))),
        }
    }

    /// Accepts exactly one pending connection.
    pub async fn accept(&self) -> AppResult<(TransportStream, PeerAddr)> {
        match self {
            TransportListener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                Ok((TransportStream::Tcp(stream), PeerAddr::Tcp(peer)))
            }
            #[cfg(feature = "bluetooth")]
            TransportListener::Rfcomm { listener, .. } => {
                let (stream, peer) = listener
                    .accept()
                    .await
                    .map_err(|e| AppError::Connection(format!("rfcomm accept: {}", e)))?;
                Ok((
                    TransportStream::Rfcomm(stream),
                    PeerAddr::Rfcomm {
                        address: peer.addr.to_string(),
                        channel: peer.channel,
                    },
                ))
            }
        }
    }

    /// Address the listener actually bound (a TCP port of 0 resolves to the
    /// assigned ephemeral port).
    pub fn local_addr(&self) -> AppResult<BindAddress> {
        match self {
            TransportListener::Tcp(listener) => Ok(BindAddress::Tcp(listener.local_addr()?)),
            #[cfg(feature = "bluetooth")]
            TransportListener::Rfcomm { addr, .. } => Ok(addr.clone()),
        }
    }
}

/// One connected endpoint of any transport kind.
#[derive(Debug)]
pub enum TransportStream {
    Tcp(TcpStream),
    #[cfg(feature = "bluetooth")]
    Rfcomm(bluer::rfcomm::Stream),
}

impl AsyncRead for TransportStream {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            TransportStream::Tcp(stream) => std::pin::Pin::new(stream).poll_read(cx, buf),
            #[cfg(feature = "bluetooth")]
            TransportStream::Rfcomm(stream) => std::pin::Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TransportStream {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        match self.get_mut() {
            TransportStream::Tcp(stream) => std::pin::Pin::new(stream).poll_write(cx, buf),
            #[cfg(feature = "bluetooth")]
            TransportStream::Rfcomm(stream) => std::pin::Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            TransportStream::Tcp(stream) => std::pin::Pin::new(stream).poll_flush(cx),
            #[cfg(feature = "bluetooth")]
            TransportStream::Rfcomm(stream) => std::pin::Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            TransportStream::Tcp(stream) => std::pin::Pin::new(stream).poll_shutdown(cx),
            #[cfg(feature = "bluetooth")]
            TransportStream::Rfcomm(stream) => std::pin::Pin::new(stream).poll_shutdown(cx),
        }
    }
}
