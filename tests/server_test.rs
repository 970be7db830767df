use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use portrelay::{
    setup_local_tracing, AppError, AppResult, BindAddress, ConnectionHandler, HandlerFactory,
    ListenerConfig, ListenerServer, PeerAddr, ServerState, Shutdown, SocketClient, StopSignal,
    TimedSocket,
};
use rstest::rstest;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{self, timeout, Instant};

fn listener_config(max_connections: usize, backlog: u32) -> ListenerConfig {
    ListenerConfig {
        bind: BindAddress::Tcp("127.0.0.1:0".parse().unwrap()),
        backlog,
        max_connections,
        reap_interval: Duration::from_millis(100),
    }
}

/// Counts accepted connections, then idles until shutdown.
#[derive(Clone)]
struct IdleFactory {
    accepted: Arc<AtomicUsize>,
}

struct IdleHandler {
    accepted: Arc<AtomicUsize>,
}

impl HandlerFactory for IdleFactory {
    type Handler = IdleHandler;

    fn create(&self, _peer: &PeerAddr) -> IdleHandler {
        IdleHandler {
            accepted: self.accepted.clone(),
        }
    }
}

impl ConnectionHandler for IdleHandler {
    async fn run(self, mut socket: TimedSocket, mut shutdown: Shutdown) -> AppResult<()> {
        self.accepted.fetch_add(1, Ordering::SeqCst);
        shutdown.recv().await;
        socket.close().await;
        Ok(())
    }
}

/// Counts accepted connections and reads until peer close or shutdown,
/// surfacing read errors.
#[derive(Clone)]
struct DrainFactory {
    accepted: Arc<AtomicUsize>,
}

struct DrainHandler {
    accepted: Arc<AtomicUsize>,
}

impl HandlerFactory for DrainFactory {
    type Handler = DrainHandler;

    fn create(&self, _peer: &PeerAddr) -> DrainHandler {
        DrainHandler {
            accepted: self.accepted.clone(),
        }
    }
}

impl ConnectionHandler for DrainHandler {
    async fn run(self, mut socket: TimedSocket, mut shutdown: Shutdown) -> AppResult<()> {
        self.accepted.fetch_add(1, Ordering::SeqCst);
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                received = socket.receive(1024, None) => {
                    match received? {
                        Some(data) if data.is_empty() => break,
                        _ => {}
                    }
                }
            }
        }
        socket.close().await;
        Ok(())
    }
}

async fn wait_for_count(counter: &AtomicUsize, expected: usize) {
    timeout(Duration::from_secs(5), async {
        while counter.load(Ordering::SeqCst) < expected {
            time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("expected connection count not reached");
}

#[tokio::test]
async fn test_every_client_gets_exactly_one_handler() -> AppResult<()> {
    setup_local_tracing()?;
    let stop = StopSignal::new();
    let (shutdown_complete_tx, _shutdown_complete_rx) = mpsc::channel(1);
    let accepted = Arc::new(AtomicUsize::new(0));
    let server = ListenerServer::new(
        listener_config(8, 8),
        IdleFactory {
            accepted: accepted.clone(),
        },
        stop.clone(),
        shutdown_complete_tx,
    );
    let handle = server.start().await?;
    let addr = handle.local_addr().clone();

    let mut clients = Vec::new();
    for _ in 0..5 {
        clients.push(SocketClient::connect(&addr).await?);
    }

    wait_for_count(&accepted, 5).await;
    // and not more than one handler per client
    time::sleep(Duration::from_millis(200)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 5);

    stop.stop();
    Ok(())
}

#[tokio::test]
async fn test_stop_with_zero_clients_reaches_stopped() -> AppResult<()> {
    let stop = StopSignal::new();
    let (shutdown_complete_tx, _shutdown_complete_rx) = mpsc::channel(1);
    let server = ListenerServer::new(
        listener_config(4, 1),
        IdleFactory {
            accepted: Arc::new(AtomicUsize::new(0)),
        },
        stop.clone(),
        shutdown_complete_tx,
    );
    let mut handle = server.start().await?;
    assert_eq!(handle.state(), ServerState::Listening);

    stop.stop();
    timeout(Duration::from_secs(2), handle.join())
        .await
        .expect("listener did not stop in time");
    assert_eq!(handle.state(), ServerState::Stopped);
    Ok(())
}

#[rstest]
#[case(Duration::from_millis(100))]
#[case(Duration::from_millis(250))]
#[tokio::test]
async fn test_bounded_receive_returns_none_within_deadline(
    #[case] limit: Duration,
) -> AppResult<()> {
    let stop = StopSignal::new();
    let (shutdown_complete_tx, _shutdown_complete_rx) = mpsc::channel(1);
    let server = ListenerServer::new(
        listener_config(4, 1),
        IdleFactory {
            accepted: Arc::new(AtomicUsize::new(0)),
        },
        stop.clone(),
        shutdown_complete_tx,
    );
    let handle = server.start().await?;

    let mut client = SocketClient::connect(handle.local_addr()).await?;
    let started = Instant::now();
    let received = client.receive(64, Some(limit)).await?;
    let elapsed = started.elapsed();

    assert!(received.is_none());
    assert!(elapsed >= limit);
    assert!(elapsed < limit + Duration::from_millis(400));

    stop.stop();
    Ok(())
}

#[tokio::test]
async fn test_reset_connection_does_not_kill_listener() -> AppResult<()> {
    let stop = StopSignal::new();
    let (shutdown_complete_tx, _shutdown_complete_rx) = mpsc::channel(1);
    let accepted = Arc::new(AtomicUsize::new(0));
    let server = ListenerServer::new(
        listener_config(4, 4),
        DrainFactory {
            accepted: accepted.clone(),
        },
        stop.clone(),
        shutdown_complete_tx,
    );
    let handle = server.start().await?;
    let addr = match handle.local_addr() {
        BindAddress::Tcp(addr) => *addr,
        other => panic!("unexpected bind address {}", other),
    };

    // force an RST on close
    let stream = TcpStream::connect(addr).await?;
    stream.set_linger(Some(Duration::ZERO))?;
    wait_for_count(&accepted, 1).await;
    drop(stream);

    time::sleep(Duration::from_millis(200)).await;
    assert_eq!(handle.state(), ServerState::Listening);

    let mut client = SocketClient::connect(handle.local_addr()).await?;
    wait_for_count(&accepted, 2).await;
    client.send_all(b"still alive", None).await?;

    stop.stop();
    Ok(())
}

#[tokio::test]
async fn test_pool_full_defers_new_handlers() -> AppResult<()> {
    let stop = StopSignal::new();
    let (shutdown_complete_tx, _shutdown_complete_rx) = mpsc::channel(1);
    let accepted = Arc::new(AtomicUsize::new(0));
    let server = ListenerServer::new(
        listener_config(1, 4),
        IdleFactory {
            accepted: accepted.clone(),
        },
        stop.clone(),
        shutdown_complete_tx,
    );
    let handle = server.start().await?;

    let _first = SocketClient::connect(handle.local_addr()).await?;
    wait_for_count(&accepted, 1).await;

    // sits in the listen backlog, no handler until a slot frees up
    let _second = SocketClient::connect(handle.local_addr()).await?;
    time::sleep(Duration::from_millis(300)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 1);

    stop.stop();
    Ok(())
}

#[tokio::test]
async fn test_dialed_socket_converts_for_split_io() -> AppResult<()> {
    let stop = StopSignal::new();
    let (shutdown_complete_tx, _shutdown_complete_rx) = mpsc::channel(1);
    let accepted = Arc::new(AtomicUsize::new(0));
    let server = ListenerServer::new(
        listener_config(4, 1),
        DrainFactory {
            accepted: accepted.clone(),
        },
        stop.clone(),
        shutdown_complete_tx,
    );
    let handle = server.start().await?;

    let client = SocketClient::connect(handle.local_addr()).await?;
    let (mut reader, mut writer) = client.into_socket().split();

    writer.send_all(b"ping", None).await?;
    wait_for_count(&accepted, 1).await;

    // the drain handler never writes back
    assert!(reader
        .receive(16, Some(Duration::from_millis(100)))
        .await?
        .is_none());

    writer.close().await;
    reader.close();
    stop.stop();
    Ok(())
}

#[tokio::test]
async fn test_bind_failure_is_fatal_for_startup() -> AppResult<()> {
    let stop = StopSignal::new();
    let (shutdown_complete_tx, _shutdown_complete_rx) = mpsc::channel(1);
    let factory = IdleFactory {
        accepted: Arc::new(AtomicUsize::new(0)),
    };
    let first = ListenerServer::new(
        listener_config(4, 1),
        factory.clone(),
        stop.clone(),
        shutdown_complete_tx.clone(),
    );
    let handle = first.start().await?;

    let mut occupied = listener_config(4, 1);
    occupied.bind = handle.local_addr().clone();
    let second = ListenerServer::new(occupied, factory, stop.clone(), shutdown_complete_tx);
    let result = second.start().await;
    assert!(matches!(result, Err(AppError::Bind(_))));

    stop.stop();
    Ok(())
}
