//! Physical transport to the relay bus.
//!
//! The bus is reached either through a local serial port or through a
//! serial-over-TCP bridge. Both are plain byte sinks: the driver opens the
//! channel, writes frames, and closes it again for every command. Nothing is
//! ever read back.

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time;

use crate::error::{Error, Result};

pub mod serial;
pub mod tcp;

pub use serial::SerialTransport;
pub use tcp::TcpTransport;

/// Baud rate the K8056 cards listen at.
pub const DEFAULT_BAUD_RATE: u32 = 2400;

/// Read/write timeout applied to the channel itself.
pub const DEFAULT_CHANNEL_TIMEOUT: Duration = Duration::from_secs(2);

/// Write-only byte channel to the bus.
///
/// Implementations must tolerate `close` on a channel that is not open, and
/// `open` on one that already is (by reopening).
#[async_trait]
pub trait Transport: Send {
    async fn open(&mut self) -> Result<()>;

    async fn write(&mut self, data: &[u8]) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn open(&mut self) -> Result<()> {
        (**self).open().await
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data).await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}

// Write and flush, failing with `TimedOut` if the line does not take the
// bytes within `timeout`. `what` names the channel in the error.
pub(crate) async fn write_bounded<W>(
    writer: &mut W,
    data: &[u8],
    timeout: Duration,
    what: &str,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let written = time::timeout(timeout, async {
        writer.write_all(data).await?;
        writer.flush().await
    })
    .await;

    written.unwrap_or_else(|_| Err(timed_out(what)))
}

pub(crate) fn timed_out(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("{} timed out", what))
}

pub(crate) fn not_open() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "channel is not open")
}

/// Line settings shared by all transports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortSettings {
    pub baud_rate: u32,
    /// Timeout for individual channel operations
    pub timeout: Duration,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: DEFAULT_CHANNEL_TIMEOUT,
        }
    }
}

/// Where the bus is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Local serial device, e.g. `/dev/ttyUSB0` or `COM3`
    Serial(String),
    /// Serial-over-TCP bridge
    Tcp { host: String, port: u16 },
}

impl Endpoint {
    /// Parse an endpoint string.
    ///
    /// Accepted forms are `serial://<path>`, `tcp://<host>:<port>`, a bare
    /// `<host>:<port>`, or a bare device path.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidEndpoint("empty endpoint".to_string()));
        }

        if let Some(path) = s.strip_prefix("serial://") {
            if path.is_empty() {
                return Err(Error::InvalidEndpoint(format!("no device in '{}'", s)));
            }
            return Ok(Endpoint::Serial(path.to_string()));
        }

        if let Some(addr) = s.strip_prefix("tcp://") {
            return parse_host_port(addr.trim_end_matches('/')).ok_or_else(|| {
                Error::InvalidEndpoint(format!("expected tcp://host:port, got '{}'", s))
            });
        }

        if let Some((scheme, _)) = s.split_once("://") {
            return Err(Error::InvalidEndpoint(format!(
                "unsupported scheme '{}'",
                scheme
            )));
        }

        // Device paths never carry a port suffix; anything that does is a
        // bridge address.
        if !s.starts_with('/') {
            if let Some(endpoint) = parse_host_port(s) {
                return Ok(endpoint);
            }
        }

        Ok(Endpoint::Serial(s.to_string()))
    }

    /// Build the transport for this endpoint.
    pub fn transport(&self, settings: PortSettings) -> Box<dyn Transport> {
        match self {
            Endpoint::Serial(path) => {
                Box::new(SerialTransport::new(path.clone(), settings))
            }
            Endpoint::Tcp { host, port } => {
                Box::new(TcpTransport::new(host.clone(), *port, settings))
            }
        }
    }
}

fn parse_host_port(s: &str) -> Option<Endpoint> {
    let (host, port) = s.rsplit_once(':')?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    let port = port.parse::<u16>().ok()?;
    Some(Endpoint::Tcp {
        host: host.to_string(),
        port,
    })
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Serial(path) => write!(f, "serial://{}", path),
            Endpoint::Tcp { host, port } if host.contains(':') => {
                write!(f, "tcp://[{}]:{}", host, port)
            }
            Endpoint::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
        }
    }
}

impl std::str::FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Endpoint::parse(s)
    }
}
