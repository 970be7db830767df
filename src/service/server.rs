use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::network::{BindAddress, PeerAddr, TimedSocket, TransportListener};
use crate::AppResult;

use super::{Shutdown, StopSignal};

/// Per-connection unit of work.
///
/// `run` is invoked once per accepted connection, on its own task. The
/// expected shape is a loop that races the shutdown token against one
/// bounded socket operation per iteration, exiting on shutdown, peer close
/// or an unrecoverable error. The handler owns its socket: every exit path
/// releases the transport (explicitly via `close`, or through drop when the
/// loop exits early), and no other task ever touches it.
pub trait ConnectionHandler: Send + 'static {
    fn run(
        self,
        socket: TimedSocket,
        shutdown: Shutdown,
    ) -> impl Future<Output = AppResult<()>> + Send;
}

/// Produces one handler per accepted connection.
pub trait HandlerFactory: Send + Sync + 'static {
    type Handler: ConnectionHandler;

    fn create(&self, peer: &PeerAddr) -> Self::Handler;
}

/// Listener lifecycle. A constructed [`ListenerServer`] is `Created`;
/// `start` moves it to `Listening`; the stop signal drives
/// `Stopping -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Listening,
    Stopping,
    Stopped,
}

/// Per-listener settings, resolved from the file-facing config sections.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub bind: BindAddress,
    pub backlog: u32,
    /// Bounds concurrently live handlers; the accept loop stops accepting
    /// while the pool is at this size. Independent of `backlog`.
    pub max_connections: usize,
    /// Cadence of the reap pass. Shutdown responsiveness does not depend on
    /// it; every blocking point also races the stop signal.
    pub reap_interval: Duration,
}

/// Tracked collection of live handler tasks for one listener. Mutated only
/// by the owning accept loop: append on spawn, remove on reap.
#[derive(Debug, Default)]
pub struct HandlerPool {
    handlers: Vec<JoinHandle<()>>,
}

impl HandlerPool {
    pub fn new() -> HandlerPool {
        HandlerPool {
            handlers: Vec::new(),
        }
    }

    /// Starts `handler` on a new task and tracks it. The cloned
    /// `shutdown_complete` sender is dropped when the handler finishes,
    /// which is what lets the driver wait for all handlers at shutdown.
    pub fn spawn<H: ConnectionHandler>(
        &mut self,
        handler: H,
        socket: TimedSocket,
        shutdown: Shutdown,
        shutdown_complete: mpsc::Sender<()>,
    ) {
        let peer = socket.peer_addr().clone();
        let handle = tokio::spawn(async move {
            let _shutdown_complete = shutdown_complete;
            if let Err(err) = handler.run(socket, shutdown).await {
                // handler errors are isolated here, they never reach the
                // accept loop
                error!("connection handler for {} failed: {}", peer, err);
            }
        });
        self.handlers.push(handle);
    }

    /// Removes every handler whose task has terminated. Safe to call
    /// repeatedly; a no-op on an empty or all-alive pool.
    pub fn reap(&mut self) {
        self.handlers.retain(|handle| !handle.is_finished());
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// One accept loop: binds an address, feeds accepted connections to its
/// handler pool, reaps finished handlers and stops cooperatively.
#[derive(Debug)]
pub struct ListenerServer<F: HandlerFactory> {
    config: ListenerConfig,
    factory: F,
    stop: StopSignal,
    shutdown_complete_tx: mpsc::Sender<()>,
}

impl<F: HandlerFactory> ListenerServer<F> {
    pub fn new(
        config: ListenerConfig,
        factory: F,
        stop: StopSignal,
        shutdown_complete_tx: mpsc::Sender<()>,
    ) -> ListenerServer<F> {
        ListenerServer {
            config,
            factory,
            stop,
            shutdown_complete_tx,
        }
    }

    /// Binds and listens, then spawns the accept loop. Returns once the
    /// listener is `Listening`; a bind/listen failure is surfaced here and
    /// aborts only this listener's startup.
    pub async fn start(self) -> AppResult<ServerHandle> {
        let listener = TransportListener::bind(&self.config.bind, self.config.backlog).await?;
        let local_addr = listener.local_addr()?;
        info!("{} listening on {}", self.config.bind.kind(), local_addr);

        let (state_tx, state_rx) = watch::channel(ServerState::Listening);
        let loop_addr = local_addr.clone();
        tokio::spawn(self.run(listener, loop_addr, state_tx));

        Ok(ServerHandle {
            local_addr,
            state: state_rx,
        })
    }

    async fn run(
        self,
        listener: TransportListener,
        local_addr: BindAddress,
        state_tx: watch::Sender<ServerState>,
    ) {
        let mut pool = HandlerPool::new();
        let mut shutdown = self.stop.token();
        let mut reap_tick = time::interval(self.config.reap_interval);
        reap_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    let _ = state_tx.send(ServerState::Stopping);
                    break;
                }
                _ = reap_tick.tick() => {
                    pool.reap();
                }
                accepted = listener.accept(), if pool.len() < self.config.max_connections => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("accepted connection from {} on {}", peer, local_addr);
                            pool.reap();
                            let handler = self.factory.create(&peer);
                            pool.spawn(
                                handler,
                                TimedSocket::new(stream, peer),
                                self.stop.token(),
                                self.shutdown_complete_tx.clone(),
                            );
                        }
                        Err(err) => {
                            // per-accept errors never abort the loop
                            warn!("accept on {} failed: {}", local_addr, err);
                            time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
            }
        }

        // close the listening socket, then report. Handler tasks are not
        // joined here; they observe the same stop signal on their own.
        drop(listener);
        let _ = state_tx.send(ServerState::Stopped);
        debug!("listener on {} stopped", local_addr);
    }
}

/// Join/wait surface for a started listener.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: BindAddress,
    state: watch::Receiver<ServerState>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> &BindAddress {
        &self.local_addr
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Resolves once the listener reaches `Stopped`.
    pub async fn join(&mut self) {
        while *self.state.borrow() != ServerState::Stopped {
            if self.state.changed().await.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_reap_on_empty_pool_is_noop() {
        let mut pool = HandlerPool::new();
        pool.reap();
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_reap_removes_only_finished_handlers() {
        let mut pool = HandlerPool::new();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        pool.handlers.push(tokio::spawn(async move {
            let _ = release_rx.await;
        }));
        pool.handlers.push(tokio::spawn(async {}));

        // let the second task run to completion
        time::sleep(Duration::from_millis(50)).await;
        pool.reap();
        assert_eq!(pool.len(), 1);

        release_tx.send(()).unwrap();
        time::sleep(Duration::from_millis(50)).await;
        pool.reap();
        assert!(pool.is_empty());
    }
}
