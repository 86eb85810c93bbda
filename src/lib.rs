//! # tijprint - TIJ Marking Printer Driver
//!
//! tijprint drives thermal inkjet (TIJ) marking printers over TCP or a
//! serial line. It provides:
//!
//! - **Protocol implementation**: frame builder, checksum, incremental
//!   response decoder, command and status catalogs
//! - **Content encoding**: text modules, QR codes rendered to bitmap
//!   patterns, information files
//! - **Session**: one command in flight, deadlines, connection lifecycle,
//!   bounded communication log
//! - **Transport**: async TCP and raw-TTY serial
//!
//! ## Quick Start
//!
//! ```no_run
//! use tijprint::{
//!     printer::{Printer, QrRequest},
//!     session::ProtocolSession,
//!     transport::ConnectionConfig,
//! };
//!
//! # async fn run() -> Result<(), tijprint::TijError> {
//! let printer = Printer::new(ProtocolSession::new());
//! printer.connect(ConnectionConfig::tcp("192.168.1.100", 9100)).await?;
//!
//! // Load a QR code, start the print engine and fire one print
//! printer.print_qr(&QrRequest::new("https://example.com/lot/42")).await?;
//! printer.start().await?;
//! printer.trigger().await?;
//!
//! for entry in printer.logs() {
//!     println!("{:?} {} {}", entry.direction, entry.command_name, entry.raw_frame_hex);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`protocol`] | Frames, checksum, command and status catalogs |
//! | [`content`] | Text and pattern modules, information files |
//! | [`transport`] | TCP and serial byte streams |
//! | [`session`] | Request/response state machine and exchange log |
//! | [`printer`] | High-level printer operations |
//! | [`thermal`] | Host CPU temperature |
//! | [`error`] | Error types |

pub mod content;
pub mod error;
pub mod printer;
pub mod protocol;
pub mod session;
pub mod thermal;
pub mod transport;

// Re-exports for convenience
pub use error::TijError;
pub use printer::Printer;
pub use session::ProtocolSession;
pub use transport::ConnectionConfig;
