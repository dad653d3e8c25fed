use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};

/// Per-read poll timeout; deadline-bounded reads loop on this.
const READ_POLL: Duration = Duration::from_millis(100);

/// A connected byte channel to exactly one device endpoint.
///
/// Wraps either a serial port or a TCP socket behind identical
/// line-oriented semantics; callers never branch on the variant. A link
/// lives for the duration of a single device command and releases the
/// underlying resource on drop.
pub struct DeviceLink {
    inner: LinkInner,
}

enum LinkInner {
    Tcp(TcpStream),
    Serial(Box<dyn serialport::SerialPort>),
}

impl DeviceLink {
    /// Open a link to the given endpoint.
    pub fn open(endpoint: &Endpoint) -> Result<Self> {
        match endpoint {
            Endpoint::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port)).map_err(|source| {
                    TransportError::Unreachable {
                        endpoint: endpoint.to_string(),
                        source,
                    }
                })?;
                stream.set_read_timeout(Some(READ_POLL))?;
                debug!(endpoint = %endpoint, "opened tcp device link");
                Ok(Self {
                    inner: LinkInner::Tcp(stream),
                })
            }
            Endpoint::Serial { path, baud } => {
                let port = serialport::new(path, *baud)
                    .timeout(READ_POLL)
                    .open()
                    .map_err(|source| TransportError::SerialOpen {
                        path: path.clone(),
                        source,
                    })?;
                debug!(endpoint = %endpoint, "opened serial device link");
                Ok(Self {
                    inner: LinkInner::Serial(port),
                })
            }
        }
    }

    /// Wrap an already-connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        stream.set_read_timeout(Some(READ_POLL))?;
        Ok(Self {
            inner: LinkInner::Tcp(stream),
        })
    }

    /// Write raw bytes verbatim and flush.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.inner {
            LinkInner::Tcp(stream) => {
                stream.write_all(data)?;
                stream.flush()?;
            }
            LinkInner::Serial(port) => {
                port.write_all(data)?;
                port.flush()?;
            }
        }
        Ok(())
    }

    /// Write an ASCII command line, appending a single newline.
    pub fn write_line(&mut self, text: &str) -> Result<()> {
        trace!(line = text, "device <<");
        let mut data = Vec::with_capacity(text.len() + 1);
        data.extend_from_slice(text.as_bytes());
        data.push(b'\n');
        self.write_bytes(&data)
    }

    /// Read one newline-terminated line, waiting at most `deadline`.
    ///
    /// Returns the line without its terminator. If the peer closes or the
    /// deadline elapses with unterminated bytes already buffered, those
    /// bytes are returned as a partial line; `None` means no data arrived
    /// at all.
    pub fn read_line(&mut self, deadline: Duration) -> Result<Option<String>> {
        let until = Instant::now() + deadline;
        let mut buf: Vec<u8> = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            if Instant::now() >= until {
                break;
            }
            match self.read(&mut byte) {
                Ok(0) => break, // peer closed
                Ok(_) => {
                    if byte[0] == b'\n' {
                        break;
                    }
                    buf.push(byte[0]);
                }
                Err(err) if is_poll_timeout(&err) => continue,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        if buf.is_empty() {
            return Ok(None);
        }

        // Device lines are ASCII; drop anything else and trailing CRs.
        let line: String = buf
            .iter()
            .filter(|b| b.is_ascii())
            .map(|&b| b as char)
            .collect();
        let line = line.trim_end_matches('\r').to_string();
        trace!(line = %line, "device >>");
        Ok(Some(line))
    }

    /// Discard any bytes currently buffered on the link without blocking.
    ///
    /// Leaves the channel ready for a fresh command/ack exchange.
    pub fn drain_input(&mut self) -> Result<()> {
        match &mut self.inner {
            LinkInner::Tcp(stream) => {
                stream.set_nonblocking(true)?;
                let mut scratch = [0u8; 256];
                let drained = loop {
                    match stream.read(&mut scratch) {
                        Ok(0) => break Ok(()),
                        Ok(n) => trace!(bytes = n, "drained stale input"),
                        Err(err) if err.kind() == ErrorKind::WouldBlock => break Ok(()),
                        Err(err) => break Err(err),
                    }
                };
                stream.set_nonblocking(false)?;
                drained.map_err(TransportError::Io)
            }
            LinkInner::Serial(port) => {
                port.clear(serialport::ClearBuffer::Input)?;
                Ok(())
            }
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            LinkInner::Tcp(_) => "tcp-bridge",
            LinkInner::Serial(_) => "serial-uart",
        }
    }
}

impl Read for DeviceLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkInner::Tcp(stream) => stream.read(buf),
            LinkInner::Serial(port) => port.read(buf),
        }
    }
}

impl std::fmt::Debug for DeviceLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLink")
            .field("transport", &self.transport_name())
            .finish()
    }
}

fn is_poll_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    fn loopback_pair() -> (DeviceLink, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = thread::spawn(move || listener.accept().unwrap().0);
        let endpoint = Endpoint::Tcp {
            host: addr.ip().to_string(),
            port: addr.port(),
        };
        let link = DeviceLink::open(&endpoint).unwrap();
        let peer = accepted.join().unwrap();
        (link, peer)
    }

    #[test]
    fn write_line_appends_newline() {
        let (mut link, mut peer) = loopback_pair();
        link.write_line("STATUS").unwrap();

        let mut buf = [0u8; 7];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"STATUS\n");
    }

    #[test]
    fn read_line_strips_terminator() {
        let (mut link, mut peer) = loopback_pair();
        peer.write_all(b"LOAD_OK module_id=m1\r\n").unwrap();

        let line = link.read_line(Duration::from_secs(1)).unwrap();
        assert_eq!(line.as_deref(), Some("LOAD_OK module_id=m1"));
    }

    #[test]
    fn read_line_times_out_with_none() {
        let (mut link, _peer) = loopback_pair();
        let line = link.read_line(Duration::from_millis(150)).unwrap();
        assert_eq!(line, None);
    }

    #[test]
    fn read_line_returns_partial_on_peer_close() {
        let (mut link, mut peer) = loopback_pair();
        peer.write_all(b"STATUS modules=1").unwrap();
        drop(peer);

        let line = link.read_line(Duration::from_secs(1)).unwrap();
        assert_eq!(line.as_deref(), Some("STATUS modules=1"));
    }

    #[test]
    fn read_line_returns_none_on_close_without_data() {
        let (mut link, peer) = loopback_pair();
        drop(peer);

        let line = link.read_line(Duration::from_secs(1)).unwrap();
        assert_eq!(line, None);
    }

    #[test]
    fn drain_input_discards_buffered_bytes() {
        let (mut link, mut peer) = loopback_pair();
        peer.write_all(b"stale line one\nstale two\n").unwrap();
        // Give the kernel a moment to deliver before draining.
        thread::sleep(Duration::from_millis(50));

        link.drain_input().unwrap();
        peer.write_all(b"FRESH\n").unwrap();

        let line = link.read_line(Duration::from_secs(1)).unwrap();
        assert_eq!(line.as_deref(), Some("FRESH"));
    }

    #[test]
    fn open_unreachable_endpoint_fails() {
        // Bind then drop to obtain a port that is very likely closed.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = Endpoint::Tcp {
            host: addr.ip().to_string(),
            port: addr.port(),
        };
        let err = DeviceLink::open(&endpoint).unwrap_err();
        assert!(matches!(err, TransportError::Unreachable { .. }));
    }

    #[test]
    fn read_line_skips_non_ascii_bytes() {
        let (mut link, mut peer) = loopback_pair();
        peer.write_all(b"RES\xffULT status=OK\n").unwrap();

        let line = link.read_line(Duration::from_secs(1)).unwrap();
        assert_eq!(line.as_deref(), Some("RESULT status=OK"));
    }
}
