use std::io::{ErrorKind, Read};

use bytes::{Buf, Bytes, BytesMut};
use serde::Deserialize;

use crate::error::{Result, WireError};

/// Default RESULT wait in seconds when the client omits `result_timeout`.
pub const DEFAULT_RESULT_TIMEOUT_SECS: f64 = 10.0;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Default maximum header line size: 64 KiB.
pub const DEFAULT_MAX_HEADER: usize = 64 * 1024;

const READ_CHUNK_SIZE: usize = 4 * 1024;

/// One client request, decoded from the envelope header line.
#[derive(Debug, Clone)]
pub enum Request {
    Load(LoadRequest),
    Start(StartRequest),
    Stop(StopRequest),
    Status(StatusRequest),
    BuildAndLoad(BuildAndLoadRequest),
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadRequest {
    pub device: String,
    pub module_id: String,
    pub blob_size: usize,
    pub blob_crc32: String,
    #[serde(default)]
    pub replace: bool,
    #[serde(default)]
    pub replace_victim: Option<String>,
    /// Client-side file name, carried for logging only.
    #[serde(default)]
    pub blob_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    pub device: String,
    pub module_id: String,
    #[serde(default)]
    pub func_name: Option<String>,
    #[serde(default)]
    pub func_args: Option<String>,
    #[serde(default)]
    pub wait_result: bool,
    #[serde(default = "default_result_timeout")]
    pub result_timeout: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopRequest {
    pub device: String,
    pub module_id: String,
    #[serde(default = "default_result_timeout")]
    pub result_timeout: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusRequest {
    pub device: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildAndLoadRequest {
    pub device: String,
    pub module_id: String,
    #[serde(default)]
    pub mode: BuildMode,
    pub source_size: usize,
    pub source_crc32: String,
    #[serde(default)]
    pub replace: bool,
    #[serde(default)]
    pub replace_victim: Option<String>,
    /// Client-side file name, carried for logging only.
    #[serde(default)]
    pub source_name: Option<String>,
}

/// Artifact kind produced by the build step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Compile C to a portable .wasm module.
    #[default]
    Wasm,
    /// Compile C to .wasm, then ahead-of-time to .aot.
    Aot,
}

impl BuildMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildMode::Wasm => "wasm",
            BuildMode::Aot => "aot",
        }
    }
}

fn default_result_timeout() -> f64 {
    DEFAULT_RESULT_TIMEOUT_SECS
}

impl Request {
    /// Parse one header line.
    pub fn parse(header: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(header.trim())?;
        let cmd = value
            .get("cmd")
            .and_then(serde_json::Value::as_str)
            .ok_or(WireError::MissingField { field: "cmd" })?
            .to_string();

        let request = match cmd.as_str() {
            "load" => Request::Load(serde_json::from_value(value)?),
            "start" => Request::Start(serde_json::from_value(value)?),
            "stop" => Request::Stop(serde_json::from_value(value)?),
            "status" => Request::Status(serde_json::from_value(value)?),
            "build_and_load" => Request::BuildAndLoad(serde_json::from_value(value)?),
            other => return Err(WireError::UnknownCommand(other.to_string())),
        };
        Ok(request)
    }

    /// Logical device name the request targets.
    pub fn device(&self) -> &str {
        match self {
            Request::Load(r) => &r.device,
            Request::Start(r) => &r.device,
            Request::Stop(r) => &r.device,
            Request::Status(r) => &r.device,
            Request::BuildAndLoad(r) => &r.device,
        }
    }

    /// Declared binary payload, if this command carries one.
    ///
    /// Returns `(size, declared_crc32)`.
    pub fn declared_payload(&self) -> Option<(usize, &str)> {
        match self {
            Request::Load(r) => Some((r.blob_size, r.blob_crc32.as_str())),
            Request::BuildAndLoad(r) => Some((r.source_size, r.source_crc32.as_str())),
            _ => None,
        }
    }

    /// Wire name of the command, for logs and error messages.
    pub fn command_name(&self) -> &'static str {
        match self {
            Request::Load(_) => "load",
            Request::Start(_) => "start",
            Request::Stop(_) => "stop",
            Request::Status(_) => "status",
            Request::BuildAndLoad(_) => "build_and_load",
        }
    }
}

/// Envelope decoding limits.
#[derive(Debug, Clone)]
pub struct WireConfig {
    /// Maximum header line size in bytes.
    pub max_header_size: usize,
    /// Maximum declared payload size in bytes.
    pub max_payload_size: usize,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            max_header_size: DEFAULT_MAX_HEADER,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Reads one request envelope from a client connection.
///
/// Handles the header/payload split internally: bytes that arrive after
/// the header newline in the same chunk are kept buffered and served to
/// `read_payload`.
pub struct EnvelopeReader<R> {
    inner: R,
    buf: BytesMut,
    config: WireConfig,
}

impl<R: Read> EnvelopeReader<R> {
    /// Create an envelope reader with default limits.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, WireConfig::default())
    }

    /// Create an envelope reader with explicit limits.
    pub fn with_config(inner: R, config: WireConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            config,
        }
    }

    /// Read and parse the newline-terminated header line.
    pub fn read_header(&mut self) -> Result<Request> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let line = self.buf.split_to(pos + 1);
                let header = String::from_utf8_lossy(&line[..pos]).into_owned();
                return Request::parse(&header);
            }

            if self.buf.len() > self.config.max_header_size {
                return Err(WireError::HeaderTooLarge {
                    len: self.buf.len(),
                    max: self.config.max_header_size,
                });
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(WireError::Io(err)),
            };
            if read == 0 {
                return Err(WireError::ConnectionClosed);
            }
            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Read exactly `declared` payload bytes following the header.
    ///
    /// Bytes already buffered past the header newline are consumed first;
    /// the rest is pulled from the connection. A close or stall before the
    /// declared length arrives is an explicit `ShortPayload` error; a
    /// truncated blob is never returned for checksumming.
    pub fn read_payload(&mut self, declared: usize) -> Result<Bytes> {
        if declared > self.config.max_payload_size {
            return Err(WireError::PayloadTooLarge {
                size: declared,
                max: self.config.max_payload_size,
            });
        }

        let mut payload = BytesMut::with_capacity(declared);
        let buffered = declared.min(self.buf.len());
        payload.extend_from_slice(&self.buf[..buffered]);
        self.buf.advance(buffered);

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        while payload.len() < declared {
            let want = (declared - payload.len()).min(chunk.len());
            let read = match self.inner.read(&mut chunk[..want]) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if is_timeout(&err) => {
                    return Err(WireError::ShortPayload {
                        expected: declared,
                        got: payload.len(),
                    })
                }
                Err(err) => return Err(WireError::Io(err)),
            };
            if read == 0 {
                return Err(WireError::ShortPayload {
                    expected: declared,
                    got: payload.len(),
                });
            }
            payload.extend_from_slice(&chunk[..read]);
        }

        Ok(payload.freeze())
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
