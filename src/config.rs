//! Server configuration parameters
//!
//! Capacity limits for the client resource registry plus the identity and
//! trace settings applied when the server connects. Loaded from JSON on
//! the host; the compact postcard form is used where a config blob has
//! to travel over the RPC channel.

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::registry::{MAX_CLIENTS, MAX_INSTANCES};

/// Highest trace level understood by `debug_level`.
pub const MAX_DEBUG_LEVEL: u8 = 4;

/// Core server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    // --- Identity ---
    /// Name the server registers under with the transport.
    pub server_name: heapless::String<32>,
    /// Chipset identifier handed to the accelerator at connect time.
    pub chipset_id: u32,

    // --- Registry capacity ---
    /// Maximum concurrent clients.
    pub max_clients: usize,
    /// Maximum engines per client.
    pub max_engines: usize,
    /// Maximum decode codecs per client.
    pub max_decoders: usize,
    /// Maximum encode codecs per client.
    pub max_encoders: usize,

    // --- Codec housekeeping ---
    /// Scratch buffer size for the version query issued after create.
    pub version_buffer_size: usize,
    /// Budget the accelerator port gets to drain a disconnecting client.
    pub idle_timeout_ms: u32,

    // --- Tracing ---
    /// 0 = off, 1 = errors .. 4 = debug.
    pub debug_level: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let mut server_name = heapless::String::new();
        let _ = server_name.push_str("rpmsg-dce");
        Self {
            server_name,
            chipset_id: 0,

            max_clients: 10,
            max_engines: 5,
            max_decoders: 5,
            max_encoders: 5,

            version_buffer_size: 128,
            idle_timeout_ms: 1000,

            debug_level: 3,
        }
    }
}

impl ServerConfig {
    /// Reject values the registry cannot honour. Nothing is clamped.
    pub fn validate(&self) -> Result<()> {
        if self.server_name.is_empty() {
            return Err(ConfigError::EmptyName.into());
        }
        if self.max_clients == 0 || self.max_clients > MAX_CLIENTS {
            return Err(ConfigError::ClientsOutOfRange.into());
        }
        for cap in [self.max_engines, self.max_decoders, self.max_encoders] {
            if cap == 0 || cap > MAX_INSTANCES {
                return Err(ConfigError::CapacityOutOfRange.into());
            }
        }
        if self.version_buffer_size == 0 {
            return Err(ConfigError::EmptyVersionBuffer.into());
        }
        if self.debug_level > MAX_DEBUG_LEVEL {
            return Err(ConfigError::DebugLevel(self.debug_level).into());
        }
        Ok(())
    }

    /// `log` filter equivalent to `debug_level`.
    pub fn level_filter(&self) -> LevelFilter {
        match self.debug_level {
            0 => LevelFilter::Off,
            1 => LevelFilter::Error,
            2 => LevelFilter::Warn,
            3 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|_| ConfigError::Unparseable)?;
        config.validate()?;
        Ok(config)
    }
}
