use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

use modgate_wire::Response;

/// Errors talking to a running gateway.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The gateway address refused the connection.
    #[error("failed to connect to gateway {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the gateway connection.
    #[error("gateway I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The gateway closed the connection without a response line.
    #[error("gateway closed without a response")]
    NoResponse,

    /// The response line was not valid JSON.
    #[error("invalid gateway response: {0}")]
    Invalid(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Send one envelope to a running gateway and read the single response.
///
/// One request per connection: header line, optional raw blob, one JSON
/// response line back, then the connection is done.
pub fn send_request(
    addr: &str,
    header: &serde_json::Value,
    blob: Option<&[u8]>,
    timeout: Duration,
) -> Result<Response> {
    let stream = TcpStream::connect(addr).map_err(|source| ClientError::Connect {
        addr: addr.to_string(),
        source,
    })?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;

    let mut writer = stream.try_clone()?;
    writer.write_all(header.to_string().as_bytes())?;
    writer.write_all(b"\n")?;
    if let Some(blob) = blob {
        writer.write_all(blob)?;
    }
    writer.flush()?;

    let mut line = String::new();
    let read = BufReader::new(stream).read_line(&mut line)?;
    if read == 0 {
        return Err(ClientError::NoResponse);
    }
    Ok(Response::parse(&line)?)
}
