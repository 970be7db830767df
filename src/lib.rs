mod network;
mod relay;
mod service;

pub use network::{
    BindAddress, PeerAddr, SocketClient, SocketReader, SocketWriter, TimedSocket, TransportKind,
    TransportListener, TransportStream,
};
pub use relay::{PeerRegistry, RegisteredWriter, RelayHandler, RelayHandlerFactory, RelaySide};
pub use service::{
    global_config, setup_local_tracing, setup_tracing, AppError, AppResult, BluetoothConfig,
    Bridge, ConnectionHandler, HandlerFactory, HandlerPool, ListenerConfig, ListenerServer,
    RelayConfig, RelaySettings, ServerHandle, ServerState, Shutdown, StopSignal, TcpConfig,
    GLOBAL_CONFIG,
};
