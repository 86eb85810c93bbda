//! # Printer Transport Layer
//!
//! Byte-stream backends that carry TIJ frames to the printer.
//!
//! ## Available Transports
//!
//! - [`tcp`]: Network connection, usually port 9100
//! - [`serial`]: Raw TTY (USB-serial adapters, RS-232), Unix only
//!
//! A transport is any `AsyncRead + AsyncWrite` stream. The session opens
//! transports through a [`Connector`], so tests can hand it an in-memory
//! pipe instead of a socket.

pub mod tcp;

#[cfg(unix)]
pub mod serial;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::error::TijError;

/// Factory default printer address
pub const DEFAULT_HOST: &str = "192.168.1.100";

/// Raw printing port
pub const DEFAULT_PORT: u16 = 9100;

/// Default serial line speed
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// A bidirectional byte stream to a printer.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Where the printer is attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    Tcp { host: String, port: u16 },
    Serial { path: String, baud_rate: u32 },
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Tcp {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl fmt::Display for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportConfig::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            TransportConfig::Serial { path, baud_rate } => {
                write!(f, "serial://{}@{}", path, baud_rate)
            }
        }
    }
}

/// Everything needed to reach one printer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub transport: TransportConfig,
    /// Machine number placed in every request frame
    #[serde(default)]
    pub machine_number: u8,
}

impl ConnectionConfig {
    pub fn tcp(host: &str, port: u16) -> Self {
        Self {
            transport: TransportConfig::Tcp {
                host: host.to_string(),
                port,
            },
            machine_number: 0,
        }
    }

    pub fn serial(path: &str, baud_rate: u32) -> Self {
        Self {
            transport: TransportConfig::Serial {
                path: path.to_string(),
                baud_rate,
            },
            machine_number: 0,
        }
    }

    pub fn with_machine_number(mut self, machine_number: u8) -> Self {
        self.machine_number = machine_number;
        self
    }
}

/// Opens transports for a session.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, config: &TransportConfig) -> Result<Box<dyn Transport>, TijError>;
}

/// Opens real TCP sockets and serial ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemConnector;

#[async_trait]
impl Connector for SystemConnector {
    async fn open(&self, config: &TransportConfig) -> Result<Box<dyn Transport>, TijError> {
        debug!(transport = %config, "opening transport");
        match config {
            TransportConfig::Tcp { host, port } => {
                let stream = tcp::connect(host, *port).await?;
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            TransportConfig::Serial { path, baud_rate } => {
                let port = serial::SerialPort::open(path, *baud_rate)?;
                Ok(Box::new(port))
            }
            #[cfg(not(unix))]
            TransportConfig::Serial { .. } => Err(TijError::TransportUnavailable(
                "serial ports are not supported on this platform".to_string(),
            )),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
