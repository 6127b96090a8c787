use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

use crate::socket::{Backoff, ReconnectPolicy, SocketConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub socket: SocketSettings,
    pub audio: AudioConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SocketSettings {
    pub url: String,
    pub max_reconnect_attempts: u32,
    pub reconnect_interval_ms: u64,
    pub max_reconnect_delay_ms: u64,
    pub backoff: Backoff,
    /// 0 disables keepalive pings
    pub heartbeat_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// Preferred capture rate; the device default is used if unsupported
    pub sample_rate: u32,
    /// Input device name; the host default when unset
    pub input_device: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub reminders_path: String,
}

impl Config {
    /// Layered load: built-in defaults, then `path` (any format the `config`
    /// crate understands, optional), then `MEMORY_KEEPER__SECTION__KEY` env vars.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("service.name", "memory-keeper")?
            .set_default("socket.url", "ws://localhost:8000/ws")?
            .set_default("socket.max_reconnect_attempts", 5_i64)?
            .set_default("socket.reconnect_interval_ms", 3000_i64)?
            .set_default("socket.max_reconnect_delay_ms", 30_000_i64)?
            .set_default("socket.backoff", "linear")?
            .set_default("socket.heartbeat_interval_ms", 15_000_i64)?
            .set_default("audio.sample_rate", 16_000_i64)?
            .set_default("storage.reminders_path", "data/reminders.json")?
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("MEMORY_KEEPER")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn socket_config(&self) -> SocketConfig {
        SocketConfig {
            url: self.socket.url.clone(),
            heartbeat_interval: Duration::from_millis(self.socket.heartbeat_interval_ms),
            policy: ReconnectPolicy {
                base_interval: Duration::from_millis(self.socket.reconnect_interval_ms),
                max_attempts: self.socket.max_reconnect_attempts,
                backoff: self.socket.backoff,
                max_delay: Duration::from_millis(self.socket.max_reconnect_delay_ms),
            },
        }
    }
}
