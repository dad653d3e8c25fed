/// Errors that can occur on a device link.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint string could not be parsed.
    #[error("invalid endpoint {spec:?}: {reason}")]
    InvalidEndpoint { spec: String, reason: String },

    /// The endpoint refused the connection or is otherwise unreachable.
    #[error("endpoint {endpoint} unreachable: {source}")]
    Unreachable {
        endpoint: String,
        source: std::io::Error,
    },

    /// The serial device could not be opened.
    #[error("failed to open serial port {path}: {source}")]
    SerialOpen {
        path: String,
        source: serialport::Error,
    },

    /// A serial-port control operation failed.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// An I/O error occurred on the link.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
