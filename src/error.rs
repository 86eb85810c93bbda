//! # Error Types
//!
//! This module defines the error type used throughout the tijprint library.
//!
//! ## Recovery
//!
//! | Variant | Session afterwards |
//! |---------|--------------------|
//! | `TransportUnavailable` | Disconnected |
//! | `ConnectionLost` | Disconnected |
//! | `Timeout` | Idle, command may be retried |
//! | `MalformedFrame` | Idle |
//! | `CommandMismatch` | Idle |
//! | `DeviceError` | Idle |
//! | `Busy` | unchanged (another command owns the link) |
//! | `Validation` | unchanged (nothing was sent) |
//!
//! Nothing in the library retries on its own; that policy belongs to callers.

use std::time::Duration;

use thiserror::Error;

/// Main error type for tijprint operations
#[derive(Debug, Error)]
pub enum TijError {
    /// The transport could not be opened, or the session is not connected
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// The connection closed or failed while a command was outstanding
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// No complete response frame arrived before the deadline
    #[error("Timeout waiting for response to command 0x{command:02X} after {after:?}")]
    Timeout { command: u8, after: Duration },

    /// Header, footer or checksum of a received frame was invalid
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// A response arrived for a different command than the one outstanding
    #[error("Response for command 0x{actual:02X} while awaiting 0x{expected:02X}")]
    CommandMismatch { expected: u8, actual: u8 },

    /// The printer answered with a non-zero status code
    #[error("Device error 0x{code:02X}: {description}")]
    DeviceError { code: u8, description: String },

    /// A command is already in flight on this session
    #[error("Session busy: another command is awaiting its response")]
    Busy,

    /// Invalid content or parameter, rejected before anything was sent
    #[error("Validation error: {0}")]
    Validation(String),

    /// Bitmap preview encoding error
    #[error("Image error: {0}")]
    Image(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TijError {
    /// Whether the error leaves the session disconnected.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TijError::TransportUnavailable(_) | TijError::ConnectionLost(_)
        )
    }
}
