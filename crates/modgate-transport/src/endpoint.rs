use std::fmt;

use crate::error::{Result, TransportError};

/// Default baud rate for serial devices.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Physical address of a device behind the gateway.
///
/// Endpoint strings come from static gateway configuration:
/// `tcp:<host>:<port>` (or `tcp:<port>`, implying localhost) selects a
/// TCP-bridged device such as an emulator; anything else is a local serial
/// device path, optionally suffixed with `:<baud>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP-bridged device, e.g. a Renode UART bridge.
    Tcp { host: String, port: u16 },
    /// Local serial UART device.
    Serial { path: String, baud: u32 },
}

impl Endpoint {
    /// Parse an endpoint string from configuration.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(TransportError::InvalidEndpoint {
                spec: spec.to_string(),
                reason: "empty endpoint".to_string(),
            });
        }

        if let Some(rest) = spec.strip_prefix("tcp:") {
            let (host, port_str) = match rest.rsplit_once(':') {
                Some((host, port)) => (host, port),
                None => ("localhost", rest),
            };
            if host.is_empty() {
                return Err(TransportError::InvalidEndpoint {
                    spec: spec.to_string(),
                    reason: "empty host".to_string(),
                });
            }
            let port: u16 = port_str.parse().map_err(|_| TransportError::InvalidEndpoint {
                spec: spec.to_string(),
                reason: format!("invalid port {port_str:?}"),
            })?;
            return Ok(Endpoint::Tcp {
                host: host.to_string(),
                port,
            });
        }

        // Serial path, with an optional trailing `:<baud>`.
        if let Some((path, baud_str)) = spec.rsplit_once(':') {
            if let Ok(baud) = baud_str.parse::<u32>() {
                if path.is_empty() {
                    return Err(TransportError::InvalidEndpoint {
                        spec: spec.to_string(),
                        reason: "empty serial path".to_string(),
                    });
                }
                return Ok(Endpoint::Serial {
                    path: path.to_string(),
                    baud,
                });
            }
        }

        Ok(Endpoint::Serial {
            path: spec.to_string(),
            baud: DEFAULT_BAUD,
        })
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            Endpoint::Tcp { .. } => "tcp-bridge",
            Endpoint::Serial { .. } => "serial-uart",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "tcp:{host}:{port}"),
            Endpoint::Serial { path, baud } => write!(f, "{path}:{baud}"),
        }
    }
}
