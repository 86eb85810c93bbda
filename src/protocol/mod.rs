//! # TIJ Protocol Implementation
//!
//! Low-level pieces of the TIJ binary command/response protocol used by
//! thermal inkjet marking printers.
//!
//! ## Module Structure
//!
//! - [`checksum`]: Frame checksum (byte sum to zero)
//! - [`frame`]: Request builder and incremental response decoder
//! - [`commands`]: Command id catalog
//! - [`status`]: Status code descriptions
//!
//! ## Usage Example
//!
//! ```
//! use tijprint::protocol::{commands::CommandId, frame, status};
//!
//! // Build "start printing" for machine 1
//! let request = frame::build_request(1, CommandId::StartPrinting.id(), &[]);
//! assert_eq!(&request[..4], &[0x1B, 0x02, 0x01, 0x11]);
//!
//! // Decode the printer's answer
//! let reply = frame::build_response(1, 0x00, 0x11, &[], true);
//! let mut decoder = frame::FrameDecoder::new();
//! if let frame::FrameEvent::FrameReady(parsed) = decoder.feed(&reply) {
//!     assert!(status::describe(parsed.status_code).success);
//! }
//! ```

pub mod checksum;
pub mod commands;
pub mod frame;
pub mod status;

pub use commands::CommandId;
pub use frame::{FrameDecoder, FrameEvent, ParsedResponse};
pub use status::{StatusOutcome, describe};
