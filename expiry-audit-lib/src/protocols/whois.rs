//! Raw WHOIS protocol client.
//!
//! WHOIS has no framing: the client writes one query line and the server
//! streams its answer, then closes the connection. Each connect, write and
//! read gets its own timeout. No retries happen at this layer.

use super::servers::ServerEndpoint;
use crate::error::ProtocolError;
use std::io::{Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::mpsc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RESPONSE_SIZE: usize = 1024 * 1024;
const READ_CHUNK: usize = 4096;

/// Async WHOIS client on tokio sockets.
#[derive(Debug, Clone)]
pub struct WhoisClient {
    timeout: Duration,
}

impl Default for WhoisClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WhoisClient {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `domain` to `server` and return the full decoded response.
    #[instrument(skip(self, server), fields(server = %server.host, port = server.port))]
    pub async fn query(&self, domain: &str, server: &ServerEndpoint) -> Result<String, ProtocolError> {
        let addr = server.addr();

        let mut stream = timeout(self.timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ProtocolError::timeout(&addr, "connect", self.timeout))?
            .map_err(|e| ProtocolError::socket(&addr, format!("connect failed: {}", e)))?;

        let line = format!("{}\r\n", domain);
        timeout(self.timeout, stream.write_all(line.as_bytes()))
            .await
            .map_err(|_| ProtocolError::timeout(&addr, "write", self.timeout))?
            .map_err(|e| ProtocolError::socket(&addr, format!("write failed: {}", e)))?;

        let mut response = Vec::new();
        let mut buf = [0u8; READ_CHUNK];

        loop {
            let n = timeout(self.timeout, stream.read(&mut buf))
                .await
                .map_err(|_| ProtocolError::timeout(&addr, "read", self.timeout))?
                .map_err(|e| ProtocolError::socket(&addr, format!("read failed: {}", e)))?;
            if n == 0 {
                break;
            }
            response.extend_from_slice(&buf[..n]);
            if response.len() > MAX_RESPONSE_SIZE {
                return Err(ProtocolError::socket(&addr, "response too large"));
            }
        }

        debug!(bytes = response.len(), "WHOIS response received");
        Ok(decode(response))
    }
}

/// Resolve `addr` on a helper thread so a stalled resolver is bounded by
/// `limit`. The helper is left to finish on its own after a timeout.
fn resolve_within<F>(addr: &str, limit: Duration, resolver: F) -> Result<Vec<SocketAddr>, ProtocolError>
where
    F: FnOnce(&str) -> std::io::Result<Vec<SocketAddr>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let target = addr.to_string();
    std::thread::Builder::new()
        .name("whois-resolve".to_string())
        .spawn(move || {
            let _ = tx.send(resolver(&target));
        })
        .map_err(|e| ProtocolError::socket(addr, format!("resolve failed: {}", e)))?;

    match rx.recv_timeout(limit) {
        Ok(Ok(candidates)) => Ok(candidates),
        Ok(Err(e)) => Err(ProtocolError::socket(addr, format!("resolve failed: {}", e))),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(ProtocolError::timeout(addr, "resolve", limit)),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(ProtocolError::socket(addr, "resolve failed: resolver exited"))
        }
    }
}

/// Blocking WHOIS client on std sockets, for backends that run on the
/// blocking thread pool.
#[derive(Debug, Clone)]
pub struct BlockingWhoisClient {
    timeout: Duration,
}

impl Default for BlockingWhoisClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockingWhoisClient {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[instrument(skip(self, server), fields(server = %server.host, port = server.port))]
    pub fn query(&self, domain: &str, server: &ServerEndpoint) -> Result<String, ProtocolError> {
        let addr = server.addr();
        let io_err = |op: &'static str, e: std::io::Error| match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                ProtocolError::timeout(&addr, op, self.timeout)
            }
            _ => ProtocolError::socket(&addr, format!("{} failed: {}", op, e)),
        };

        let candidates = resolve_within(&addr, self.timeout, |a| {
            a.to_socket_addrs().map(|it| it.collect())
        })?;

        let mut last_err = None;
        let mut stream = None;
        for candidate in candidates {
            match std::net::TcpStream::connect_timeout(&candidate, self.timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_err = Some(io_err("connect", e)),
            }
        }
        let mut stream = match stream {
            Some(s) => s,
            None => {
                return Err(last_err
                    .unwrap_or_else(|| ProtocolError::socket(&addr, "no address resolved")))
            }
        };

        stream
            .set_read_timeout(Some(self.timeout))
            .and_then(|_| stream.set_write_timeout(Some(self.timeout)))
            .map_err(|e| io_err("configure", e))?;

        stream
            .write_all(format!("{}\r\n", domain).as_bytes())
            .map_err(|e| io_err("write", e))?;

        let mut response = Vec::new();
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let n = stream.read(&mut buf).map_err(|e| io_err("read", e))?;
            if n == 0 {
                break;
            }
            response.extend_from_slice(&buf[..n]);
            if response.len() > MAX_RESPONSE_SIZE {
                return Err(ProtocolError::socket(&addr, "response too large"));
            }
        }

        debug!(bytes = response.len(), "WHOIS response received");
        Ok(decode(response))
    }
}

/// UTF-8, falling back to Latin-1 for registries that still send it.
fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}
