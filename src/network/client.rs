use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpStream;

use crate::network::{BindAddress, PeerAddr, TimedSocket, TransportStream};
use crate::{AppError, AppResult};

/// Connecting counterpart of the listener side: dials a server and exposes
/// the same bounded-time receive/send surface.
#[derive(Debug)]
pub struct SocketClient {
    socket: TimedSocket,
}

impl SocketClient {
    pub async fn connect(addr: &BindAddress) -> AppResult<SocketClient> {
        match addr {
            BindAddress::Tcp(socket_addr) => {
                let stream = TcpStream::connect(socket_addr)
                    .await
                    .map_err(|e| AppError::Connection(format!("connect to {}: {}", addr, e)))?;
                let peer = PeerAddr::Tcp(stream.peer_addr()?);
                Ok(SocketClient {
                    socket: TimedSocket::new(TransportStream::Tcp(stream), peer),
                })
            }
            #[cfg(feature = "bluetooth")]
            BindAddress::Rfcomm { adapter, channel } => {
                let address = adapter.parse::<bluer::Address>().map_err(|e| {
                    AppError::InvalidValue(format!("adapter address {}: {}", adapter, e))
                })?;
                let socket_addr = bluer::rfcomm::SocketAddr::new(address, *channel);
                let stream = bluer::rfcomm::Stream::connect(socket_addr)
                    .await
                    .map_err(|e| AppError::Connection(format!("connect to {}: {}", addr, e)))?;
                let peer = PeerAddr::Rfcomm {
                    address: adapter.clone(),
                    channel: *channel,
                };
                Ok(SocketClient {
                    socket: TimedSocket::new(TransportStream::Rfcomm(stream), peer),
                })
            }
            #[cfg(not(feature = "bluetooth"))]
            BindAddress::Rfcomm { .. } => Err(AppError::Connection(format!(
                "connect to {}: bluetooth transport support not compiled in",
                addr
            ))),
        }
    }

    pub fn peer_addr(&self) -> &PeerAddr {
        self.socket.peer_addr()
    }

    pub async fn receive(
        &mut self,
        max_bytes: usize,
        timeout: Option<Duration>,
    ) -> AppResult<Option<Bytes>> {
        self.socket.receive(max_bytes, timeout).await
    }

    pub async fn send(&mut self, data: &[u8], timeout: Option<Duration>) -> AppResult<Option<usize>> {
        self.socket.send(data, timeout).await
    }

    pub async fn send_all(&mut self, data: &[u8], timeout: Option<Duration>) -> AppResult<()> {
        self.socket.send_all(data, timeout).await
    }

    pub async fn close(&mut self) {
        self.socket.close().await
    }

    pub fn into_socket(self) -> TimedSocket {
        self.socket
    }
}
