//! # TCP Transport
//!
//! Network-attached TIJ printers listen on a raw socket, port 9100 by
//! default. Frames are small and latency matters more than throughput, so
//! Nagle's algorithm is disabled.

use tokio::net::TcpStream;
use tracing::info;

use crate::error::TijError;

/// Open a TCP connection with `TCP_NODELAY` set.
pub async fn connect(host: &str, port: u16) -> Result<TcpStream, TijError> {
    let stream = TcpStream::connect((host, port)).await.map_err(|e| {
        TijError::TransportUnavailable(format!("Failed to connect to {}:{}: {}", host, port, e))
    })?;

    stream.set_nodelay(true).map_err(|e| {
        TijError::TransportUnavailable(format!("Failed to set TCP_NODELAY: {}", e))
    })?;

    info!(host, port, "tcp connection established");
    Ok(stream)
}
