/// Errors that can occur while decoding or encoding the client envelope.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The request header line was not valid JSON.
    #[error("malformed request header: {0}")]
    MalformedHeader(#[from] serde_json::Error),

    /// The header is missing a required field.
    #[error("request header missing field {field:?}")]
    MissingField { field: &'static str },

    /// The header names a command the gateway does not know.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The header line exceeds the configured maximum.
    #[error("header too large ({len} bytes, max {max})")]
    HeaderTooLarge { len: usize, max: usize },

    /// The declared payload exceeds the configured maximum.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The connection closed or stalled before the declared payload arrived.
    #[error("short payload: expected {expected} bytes, got {got}")]
    ShortPayload { expected: usize, got: usize },

    /// The payload checksum did not match the declared value.
    #[error("CRC mismatch expected={expected} got={got}")]
    ChecksumMismatch { expected: String, got: String },

    /// The connection closed before a complete header was received.
    #[error("connection closed (incomplete request)")]
    ConnectionClosed,

    /// An I/O error occurred while reading the envelope.
    #[error("envelope I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WireError>;
