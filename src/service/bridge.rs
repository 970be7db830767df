use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, trace};

use crate::network::BindAddress;
use crate::relay::{PeerRegistry, RelayHandlerFactory, RelaySide};
use crate::{AppError, AppResult};

use super::config::RelayConfig;
use super::server::{ListenerConfig, ListenerServer, ServerHandle};
use super::StopSignal;

/// Drives the whole relay: one listener per transport, a shared peer
/// registry, and the process-wide stop signal.
#[derive(Debug, Clone, Default)]
pub struct Bridge {
    stop: StopSignal,
}

impl Bridge {
    pub fn new() -> Bridge {
        Bridge {
            stop: StopSignal::new(),
        }
    }

    /// Idempotent; every accept loop and handler observes the signal on its
    /// own.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Starts the configured listeners and runs until ctrl-c or
    /// [`stop`](Self::stop), then waits for every listener and handler to
    /// finish.
    ///
    /// A bind failure aborts only the affected listener; the bridge keeps
    /// running as long as at least one listener came up.
    pub async fn run(&self, config: &RelayConfig) -> AppResult<()> {
        let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel::<()>(1);
        let registry = Arc::new(PeerRegistry::new());
        let reap_interval = Duration::from_millis(config.relay.reap_interval_ms);
        let chunk_size = config.relay.chunk_size;

        let mut handles: Vec<ServerHandle> = Vec::new();
        let mut first_error: Option<AppError> = None;

        let tcp_addr = format!("{}:{}", config.tcp.ip, config.tcp.port)
            .parse::<std::net::SocketAddr>()
            .map_err(|e| {
                AppError::InvalidValue(format!(
                    "tcp bind address {}:{}: {}",
                    config.tcp.ip, config.tcp.port, e
                ))
            })?;
        let tcp_server = ListenerServer::new(
            ListenerConfig {
                bind: BindAddress::Tcp(tcp_addr),
                backlog: config.tcp.backlog,
                max_connections: config.tcp.max_connections,
                reap_interval,
            },
            RelayHandlerFactory::new(RelaySide::Tcp, registry.clone(), chunk_size),
            self.stop.clone(),
            shutdown_complete_tx.clone(),
        );
        match tcp_server.start().await {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                error!("tcp listener failed to start: {}", err);
                first_error = Some(err);
            }
        }

        if config.bluetooth.enabled {
            let bt_server = ListenerServer::new(
                ListenerConfig {
                    bind: BindAddress::Rfcomm {
                        adapter: config.bluetooth.address.clone(),
                        channel: config.bluetooth.channel,
                    },
                    backlog: config.bluetooth.backlog,
                    max_connections: config.bluetooth.max_connections,
                    reap_interval,
                },
                RelayHandlerFactory::new(RelaySide::Bluetooth, registry.clone(), chunk_size),
                self.stop.clone(),
                shutdown_complete_tx.clone(),
            );
            match bt_server.start().await {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    error!("bluetooth listener failed to start: {}", err);
                    first_error.get_or_insert(err);
                }
            }
        }

        if handles.is_empty() {
            return Err(first_error
                .unwrap_or_else(|| AppError::Bind("no listener configured".to_string())));
        }

        let mut shutdown = self.stop.token();
        tokio::select! {
            _ = shutdown.recv() => {
                info!("stop requested");
            }
            ctrl_c = signal::ctrl_c() => {
                if let Err(err) = ctrl_c {
                    error!("failed to listen for ctrl-c: {}", err);
                }
                info!("shutting down");
                self.stop.stop();
            }
        }

        for handle in &mut handles {
            handle.join().await;
        }

        // every handler holds a clone of this sender, recv returns once the
        // last one is dropped
        drop(shutdown_complete_tx);
        trace!("waiting for handlers to finish...");
        let _ = shutdown_complete_rx.recv().await;
        info!("relay shutdown complete");
        Ok(())
    }
}
