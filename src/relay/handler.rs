use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::network::{PeerAddr, TimedSocket};
use crate::service::{ConnectionHandler, HandlerFactory, Shutdown};
use crate::AppResult;

use super::{PeerRegistry, RelaySide};

/// Builds one [`RelayHandler`] per accepted connection, all sharing the
/// same registry.
#[derive(Debug)]
pub struct RelayHandlerFactory {
    side: RelaySide,
    registry: Arc<PeerRegistry>,
    chunk_size: usize,
}

impl RelayHandlerFactory {
    pub fn new(side: RelaySide, registry: Arc<PeerRegistry>, chunk_size: usize) -> Self {
        RelayHandlerFactory {
            side,
            registry,
            chunk_size,
        }
    }
}

impl HandlerFactory for RelayHandlerFactory {
    type Handler = RelayHandler;

    fn create(&self, _peer: &PeerAddr) -> RelayHandler {
        RelayHandler {
            side: self.side,
            registry: self.registry.clone(),
            chunk_size: self.chunk_size,
        }
    }
}

/// One end of the byte bridge.
///
/// Registers its socket's write half under its side, then loops: race the
/// stop signal against a blocking chunk read from its own socket, and
/// forward every non-empty chunk to the peer side's registered write half,
/// retrying partial writes. Chunks read before the peer side connects are
/// dropped with a warning. On peer close, stop or error, the handler
/// unregisters and closes both halves.
#[derive(Debug)]
pub struct RelayHandler {
    side: RelaySide,
    registry: Arc<PeerRegistry>,
    chunk_size: usize,
}

impl ConnectionHandler for RelayHandler {
    async fn run(self, socket: TimedSocket, mut shutdown: Shutdown) -> AppResult<()> {
        let peer_side = self.side.peer();
        let (mut reader, writer) = socket.split();
        let entry = self.registry.register(self.side, writer);
        info!(
            "{} relay endpoint connected from {}",
            self.side,
            reader.peer_addr()
        );

        let result = async {
            loop {
                let chunk = tokio::select! {
                    _ = shutdown.recv() => {
                        debug!("{} relay endpoint stopping on shutdown signal", self.side);
                        break;
                    }
                    received = reader.receive(self.chunk_size, None) => {
                        match received? {
                            Some(data) if data.is_empty() => {
                                debug!("{} relay client closed the connection", self.side);
                                break;
                            }
                            Some(data) => data,
                            None => continue,
                        }
                    }
                };

                match self.registry.peer(self.side) {
                    Some(peer_writer) => {
                        // a stalled peer client can block this write for an
                        // unbounded time, so the forward must lose the race
                        // against the stop signal and release the lock
                        let forward = async {
                            let mut peer_writer = peer_writer.lock().await;
                            peer_writer.send_all(&chunk, None).await
                        };
                        tokio::select! {
                            _ = shutdown.recv() => {
                                debug!(
                                    "{} relay endpoint stopping mid-forward on shutdown signal",
                                    self.side
                                );
                                break;
                            }
                            forwarded = forward => {
                                if let Err(err) = forwarded {
                                    // the peer handler notices its own socket
                                    // state and exits by itself, keep serving
                                    // this side
                                    warn!("forward to {} side failed: {}", peer_side, err);
                                }
                            }
                        }
                    }
                    None => {
                        warn!(
                            "no {} endpoint connected, dropping {} bytes",
                            peer_side,
                            chunk.len()
                        );
                    }
                }
            }
            Ok(())
        }
        .await;

        self.registry.unregister(self.side, &entry);
        // the peer handler may still hold the lock mid-forward; in that case
        // the write half closes when the last Arc drops
        if let Ok(mut writer) = entry.try_lock() {
            writer.close().await;
        }
        drop(entry);
        reader.close();
        result
    }
}
