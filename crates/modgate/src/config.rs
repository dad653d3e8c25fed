use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use modgate_transport::{Endpoint, TransportError};
use serde::Deserialize;
use tracing::info;

/// Errors loading or validating gateway configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config file is not valid JSON.
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A device's endpoint string could not be parsed.
    #[error("device {name:?}: {source}")]
    Endpoint {
        name: String,
        source: TransportError,
    },

    /// The device table is empty.
    #[error("no devices configured")]
    NoDevices,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Gateway configuration file contents.
///
/// ```json
/// {
///   "devices": {
///     "nucleo_f4": "/dev/ttyACM0",
///     "nucleo_f7": "/dev/ttyACM1:921600",
///     "renode": "tcp:localhost:3456"
///   }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Logical device name → endpoint string.
    pub devices: HashMap<String, String>,
}

impl GatewayConfig {
    /// Load the config file. Read once at startup; never reloaded.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: GatewayConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(config)
    }

    /// Parse endpoint strings and build the immutable device table.
    pub fn into_table(self) -> Result<DeviceTable> {
        DeviceTable::from_entries(self.devices)
    }
}

/// Immutable logical-name → endpoint table with per-device command locks.
///
/// The table is built once at startup; afterwards it is read-only and
/// needs no locking of its own. Each device carries a mutex serializing
/// transport sessions to its physical channel.
#[derive(Debug)]
pub struct DeviceTable {
    entries: HashMap<String, DeviceEntry>,
}

impl DeviceTable {
    /// Build the table from `name → endpoint string` pairs.
    pub fn from_entries(devices: HashMap<String, String>) -> Result<Self> {
        if devices.is_empty() {
            return Err(ConfigError::NoDevices);
        }
        let mut entries = HashMap::with_capacity(devices.len());
        for (name, spec) in devices {
            let endpoint = Endpoint::parse(&spec).map_err(|source| ConfigError::Endpoint {
                name: name.clone(),
                source,
            })?;
            info!(device = %name, endpoint = %endpoint, "registered device");
            entries.insert(
                name.clone(),
                DeviceEntry {
                    name,
                    endpoint,
                    lock: Mutex::new(()),
                },
            );
        }
        Ok(Self { entries })
    }

    /// Resolve a logical device name.
    pub fn get(&self, name: &str) -> Option<&DeviceEntry> {
        self.entries.get(name)
    }

    /// Registered device names, for diagnostics.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// One configured device: its endpoint and its channel lock.
#[derive(Debug)]
pub struct DeviceEntry {
    name: String,
    endpoint: Endpoint,
    lock: Mutex<()>,
}

impl DeviceEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Acquire the device's channel lock for one full transport session.
    ///
    /// At most one in-flight command per device endpoint; concurrent
    /// requests for the same device queue here instead of interleaving
    /// writes on the physical channel.
    pub fn lock_channel(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
