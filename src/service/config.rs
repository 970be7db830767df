extern crate config as _;

use std::path::Path;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use super::{AppError, AppResult};

pub static GLOBAL_CONFIG: OnceCell<RelayConfig> = OnceCell::new();
pub fn global_config() -> &'static RelayConfig {
    GLOBAL_CONFIG.get().unwrap()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TcpConfig {
    pub ip: String,
    pub port: u16,
    pub backlog: u32,
    /// Upper bound on concurrently live handlers, not just the listen
    /// backlog. The accept loop stops accepting while the pool is full.
    pub max_connections: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        TcpConfig {
            ip: "0.0.0.0".to_string(),
            port: 8888,
            backlog: 1,
            max_connections: 16,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BluetoothConfig {
    pub enabled: bool,
    /// Local adapter address, e.g. "B8:27:EB:CD:16:89".
    pub address: String,
    /// RFCOMM channel number.
    pub channel: u8,
    pub backlog: u32,
    pub max_connections: usize,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        BluetoothConfig {
            enabled: false,
            address: "00:00:00:00:00:00".to_string(),
            channel: 10,
            backlog: 1,
            max_connections: 16,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RelaySettings {
    /// Largest chunk moved per forwarding read.
    pub chunk_size: usize,
    /// Cadence of the pool reap tick in the accept loop.
    pub reap_interval_ms: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        RelaySettings {
            chunk_size: 1024,
            reap_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RelayConfig {
    pub tcp: TcpConfig,
    pub bluetooth: BluetoothConfig,
    pub relay: RelaySettings,
}

impl RelayConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<RelayConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .build()?;

        let relay_config: RelayConfig = config.try_deserialize()?;

        Ok(relay_config)
    }
}
