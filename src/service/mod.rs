pub use app_error::{AppError, AppResult};
pub use bridge::Bridge;
pub use config::{
    global_config, BluetoothConfig, RelayConfig, RelaySettings, TcpConfig, GLOBAL_CONFIG,
};
pub use server::{
    ConnectionHandler, HandlerFactory, HandlerPool, ListenerConfig, ListenerServer, ServerHandle,
    ServerState,
};
pub use shutdown::{Shutdown, StopSignal};
pub use tracing_config::{setup_local_tracing, setup_tracing};

mod app_error;
mod bridge;
mod config;
mod server;
mod shutdown;
mod tracing_config;
