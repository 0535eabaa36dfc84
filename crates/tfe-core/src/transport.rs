//! Message-based instrument transport
//!
//! [`Transport`] is the contract every SCPI driver is written against:
//! `write` sends a command, `ask` sends a query and returns the reply line.
//! Exactly one request is outstanding at a time; implementations serialize
//! access internally so a driver can hand clones of the same
//! [`SharedTransport`] to each of its parameters.
//!
//! [`TcpScpiTransport`] speaks SCPI over a raw socket (VISA `::SOCKET`
//! resources). With the `instrument_visa` feature, `VisaTransport` covers
//! every other VISA resource type.

use crate::error::{InstrumentError, InstrumentResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Raw SCPI socket port used by Keysight/Agilent instruments.
pub const DEFAULT_SCPI_PORT: u16 = 5025;

/// Default read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Request/response channel to one instrument.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a command that produces no reply.
    async fn write(&self, command: &str) -> InstrumentResult<()>;

    /// Send a query and return the trimmed reply.
    async fn ask(&self, command: &str) -> InstrumentResult<String>;

    /// Current read timeout.
    fn timeout(&self) -> Duration;

    /// Change the read timeout for subsequent requests.
    fn set_timeout(&self, timeout: Duration);

    /// Line terminator appended to every command.
    fn terminator(&self) -> &str;
}

/// Transport shared between a driver and its parameters.
pub type SharedTransport = Arc<dyn Transport>;

// =============================================================================
// TCP socket transport
// =============================================================================

/// SCPI over a raw TCP socket.
pub struct TcpScpiTransport {
    stream: Mutex<BufReader<TcpStream>>,
    timeout: parking_lot::Mutex<Duration>,
    terminator: String,
    address: String,
}

impl TcpScpiTransport {
    /// Connect to `host:port`, or to a VISA socket resource such as
    /// `TCPIP0::192.168.1.20::5025::SOCKET`.
    pub async fn connect(address: &str, connect_timeout: Duration) -> InstrumentResult<Self> {
        let target = match parse_socket_resource(address) {
            Some((host, port)) => format!("{}:{}", host, port),
            None => address.to_string(),
        };

        let stream = timeout(connect_timeout, TcpStream::connect(&target))
            .await
            .map_err(|_| InstrumentError::Timeout {
                command: format!("connect {}", target),
                timeout: connect_timeout,
            })??;

        // Replies are short lines; Nagle only adds latency.
        stream.set_nodelay(true)?;

        tracing::info!(address = %target, "Connected to SCPI instrument");

        Ok(Self {
            stream: Mutex::new(BufReader::new(stream)),
            timeout: parking_lot::Mutex::new(DEFAULT_TIMEOUT),
            terminator: "\n".to_string(),
            address: target,
        })
    }

    /// Set the line terminator (default `"\n"`).
    pub fn with_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.terminator = terminator.into();
        self
    }

    /// Set the initial read timeout.
    pub fn with_timeout(self, duration: Duration) -> Self {
        *self.timeout.lock() = duration;
        self
    }

    /// Resolved `host:port` of the instrument.
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn send(&self, stream: &mut BufReader<TcpStream>, command: &str) -> InstrumentResult<()> {
        let line = format!("{}{}", command, self.terminator);
        stream.get_mut().write_all(line.as_bytes()).await?;
        stream.get_mut().flush().await?;
        Ok(())
    }

    /// Discard bytes left over from an earlier query that timed out.
    async fn flush_input_buffer(stream: &mut BufReader<TcpStream>) -> InstrumentResult<()> {
        let buffered = stream.buffer().len();
        if buffered > 0 {
            tracing::debug!(bytes = buffered, "Discarding buffered reply bytes");
            stream.consume(buffered);
        }

        let mut probe = [0u8; 512];
        loop {
            match timeout(Duration::from_millis(5), stream.get_mut().peek(&mut probe)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => {
                    let mut discard = vec![0u8; n];
                    let _ = stream.get_mut().try_read(&mut discard);
                    tracing::debug!(bytes = n, "Discarded stale bytes from socket");
                }
                Ok(Err(e)) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for TcpScpiTransport {
    async fn write(&self, command: &str) -> InstrumentResult<()> {
        let mut stream = self.stream.lock().await;
        tracing::debug!(cmd = %command, "SCPI write");
        self.send(&mut stream, command).await
    }

    async fn ask(&self, command: &str) -> InstrumentResult<String> {
        let mut stream = self.stream.lock().await;
        Self::flush_input_buffer(&mut stream).await?;

        tracing::debug!(cmd = %command, "SCPI query");
        self.send(&mut stream, command).await?;

        let delimiter = self.terminator.as_bytes().last().copied().unwrap_or(b'\n');
        let limit = self.timeout();
        let mut reply = Vec::new();
        match timeout(limit, stream.read_until(delimiter, &mut reply)).await {
            Ok(Ok(0)) => Err(InstrumentError::Transport(format!(
                "connection to {} closed while waiting for reply to '{}'",
                self.address, command
            ))),
            Ok(Ok(_)) => {
                let text = String::from_utf8_lossy(&reply).trim().to_string();
                tracing::trace!(cmd = %command, reply_len = text.len(), "SCPI reply");
                Ok(text)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(InstrumentError::Timeout {
                command: command.to_string(),
                timeout: limit,
            }),
        }
    }

    fn timeout(&self) -> Duration {
        *self.timeout.lock()
    }

    fn set_timeout(&self, timeout: Duration) {
        *self.timeout.lock() = timeout;
    }

    fn terminator(&self) -> &str {
        &self.terminator
    }
}

/// Open the transport matching `address`.
///
/// Socket resources and plain `host:port` addresses use
/// [`TcpScpiTransport`]. Other VISA resources need the `instrument_visa`
/// feature.
pub async fn open(
    address: &str,
    timeout: Duration,
    terminator: &str,
) -> InstrumentResult<SharedTransport> {
    let is_visa_resource = address.contains("::") && parse_socket_resource(address).is_none();
    if is_visa_resource {
        #[cfg(feature = "instrument_visa")]
        {
            let transport = crate::visa::VisaTransport::open(address, timeout)?
                .with_terminator(terminator)
                .with_timeout(timeout);
            return Ok(Arc::new(transport));
        }
        #[cfg(not(feature = "instrument_visa"))]
        return Err(InstrumentError::Config(format!(
            "'{}' is a VISA resource; rebuild with the instrument_visa feature",
            address
        )));
    }

    let transport = TcpScpiTransport::connect(address, timeout)
        .await?
        .with_terminator(terminator)
        .with_timeout(timeout);
    Ok(Arc::new(transport))
}

/// Split `TCPIP0::host::port::SOCKET` into host and port.
pub fn parse_socket_resource(resource: &str) -> Option<(String, u16)> {
    let parts: Vec<&str> = resource.split("::").collect();
    match parts.as_slice() {
        [board, host, port, kind]
            if board.to_uppercase().starts_with("TCPIP") && kind.eq_ignore_ascii_case("SOCKET") =>
        {
            port.parse().ok().map(|port| (host.to_string(), port))
        }
        _ => None,
    }
}
