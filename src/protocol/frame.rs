//! # TIJ Frame Codec
//!
//! Builds request frames and reassembles response frames from an arbitrary
//! chunked byte stream.
//!
//! ## Frame Layout
//!
//! | Kind | Bytes |
//! |------|-------|
//! | Request | `ESC STX machine command payload... ESC ETX checksum` |
//! | Response | `ESC ACK/NAK machine status command data... ESC ETX checksum` |
//!
//! ```text
//! Request  1B 02 77 11 1B 03 3D
//!          ── ── ── ── ───── ──
//!          │  │  │  │  │     └─ checksum (all bytes sum to 0 mod 256)
//!          │  │  │  │  └─────── footer ESC ETX
//!          │  │  │  └────────── command id (0x11 = start printing)
//!          │  │  └───────────── machine number
//!          │  └──────────────── STX
//!          └─────────────────── ESC
//! ```
//!
//! Payload length is implicit: the first `ESC ETX` pair at or after offset 5
//! ends the frame, and the checksum byte follows it.
//!
//! ## Incremental Decoding
//!
//! TCP and serial reads deliver arbitrary fragments. [`FrameDecoder`] keeps
//! an accumulation buffer across [`FrameDecoder::feed`] calls; bytes past a
//! complete frame stay buffered and are returned by the next call, so two
//! frames arriving in one read are never merged or dropped.

use std::fmt;

use bytes::{Buf, Bytes, BytesMut};

use super::checksum;
use super::status::{self, StatusOutcome};

/// ESC - frame start and footer prefix
pub const ESC: u8 = 0x1B;

/// STX - marks a request frame
pub const STX: u8 = 0x02;

/// ETX - second byte of the footer
pub const ETX: u8 = 0x03;

/// ACK - response frame accepted at the framing level
pub const ACK: u8 = 0x06;

/// NAK - response frame rejected at the framing level
pub const NAK: u8 = 0x15;

/// Footer marker preceding the checksum byte
pub const FOOTER: [u8; 2] = [ESC, ETX];

/// Smallest possible response: 5 header bytes, footer, checksum
pub const MIN_RESPONSE_LEN: usize = 8;

/// Offset of the first data byte in a response frame
const RESPONSE_HEADER_LEN: usize = 5;

// ============================================================================
// FRAME BUILDERS
// ============================================================================

/// # Build Request Frame
///
/// `[ESC, STX, machine, command, payload..., ESC, ETX, checksum]`
///
/// ## Example
///
/// ```
/// use tijprint::protocol::frame;
///
/// let start = frame::build_request(0x77, 0x11, &[]);
/// assert_eq!(start, vec![0x1B, 0x02, 0x77, 0x11, 0x1B, 0x03, 0x3D]);
/// ```
pub fn build_request(machine: u8, command: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(7 + payload.len());
    frame.extend_from_slice(&[ESC, STX, machine, command]);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&FOOTER);
    frame.push(checksum::compute(&frame));
    frame
}

/// # Build Response Frame
///
/// `[ESC, ACK|NAK, machine, status, command, data..., ESC, ETX, checksum]`
///
/// Printers produce these; the builder exists for simulators and tests.
pub fn build_response(
    machine: u8,
    status: u8,
    command: u8,
    data: &[u8],
    acknowledged: bool,
) -> Vec<u8> {
    let marker = if acknowledged { ACK } else { NAK };
    let mut frame = Vec::with_capacity(8 + data.len());
    frame.extend_from_slice(&[ESC, marker, machine, status, command]);
    frame.extend_from_slice(data);
    frame.extend_from_slice(&FOOTER);
    frame.push(checksum::compute(&frame));
    frame
}

// ============================================================================
// PARSED RESPONSE
// ============================================================================

/// A validated response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub machine_number: u8,
    pub status_code: u8,
    pub command_id: u8,
    /// Bytes between the command id and the footer
    pub data: Bytes,
    /// `true` for ACK, `false` for NAK
    pub acknowledged: bool,
    /// The complete frame as received, checksum included
    pub frame: Bytes,
}

impl ParsedResponse {
    /// Decode a complete frame that already passed header and checksum checks.
    fn from_frame(frame: Bytes) -> Self {
        let footer_start = frame.len() - FOOTER.len() - 1;
        Self {
            machine_number: frame[2],
            status_code: frame[3],
            command_id: frame[4],
            data: frame.slice(RESPONSE_HEADER_LEN..footer_start),
            acknowledged: frame[1] == ACK,
            frame,
        }
    }

    /// Status description and classification.
    pub fn outcome(&self) -> StatusOutcome {
        status::describe(self.status_code)
    }

    /// Status 0 inside an ACK frame.
    pub fn success(&self) -> bool {
        self.acknowledged && self.status_code == 0
    }

    /// Turn a non-successful response into [`TijError::DeviceError`].
    ///
    /// [`TijError::DeviceError`]: crate::error::TijError::DeviceError
    pub fn ensure_success(self) -> Result<Self, crate::error::TijError> {
        if self.success() {
            return Ok(self);
        }
        let mut description = self.outcome().description;
        if !self.acknowledged {
            description = format!("negative acknowledgement ({})", description);
        }
        Err(crate::error::TijError::DeviceError {
            code: self.status_code,
            description,
        })
    }
}

// ============================================================================
// INCREMENTAL DECODER
// ============================================================================

/// Result of feeding bytes into a [`FrameDecoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// More bytes are needed
    Incomplete,
    /// A checksum-valid response frame was extracted
    FrameReady(ParsedResponse),
    /// A protocol violation; the offending bytes were discarded
    Invalid(InvalidFrame),
}

/// Why a frame was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidFrame {
    /// The buffer does not start with `ESC ACK` or `ESC NAK`
    BadHeader { found: [u8; 2] },
    /// The checksum byte does not match the frame contents
    BadChecksum { expected: u8, found: u8, frame: Bytes },
}

impl fmt::Display for InvalidFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidFrame::BadHeader { found } => write!(
                f,
                "expected response header 1B 06/15, found {:02X} {:02X}",
                found[0], found[1]
            ),
            InvalidFrame::BadChecksum {
                expected, found, ..
            } => write!(
                f,
                "checksum mismatch: expected {:02X}, found {:02X}",
                expected, found
            ),
        }
    }
}

/// Reassembles response frames from a chunked byte stream.
///
/// ## Example
///
/// ```
/// use tijprint::protocol::frame::{self, FrameDecoder, FrameEvent};
///
/// let response = frame::build_response(0x77, 0x00, 0x11, &[], true);
/// let mut decoder = FrameDecoder::new();
///
/// assert_eq!(decoder.feed(&response[..3]), FrameEvent::Incomplete);
/// match decoder.feed(&response[3..]) {
///     FrameEvent::FrameReady(parsed) => assert_eq!(parsed.command_id, 0x11),
///     other => panic!("unexpected {:?}", other),
/// }
/// ```
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(256),
        }
    }

    /// Append `chunk` and try to extract the next frame.
    ///
    /// Only one event is produced per call. When a read carried several
    /// frames, call `feed(&[])` until it returns [`FrameEvent::Incomplete`].
    pub fn feed(&mut self, chunk: &[u8]) -> FrameEvent {
        self.buffer.extend_from_slice(chunk);
        self.next_event()
    }

    /// Number of buffered bytes not yet consumed by a frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn next_event(&mut self) -> FrameEvent {
        if self.buffer.len() < MIN_RESPONSE_LEN {
            return FrameEvent::Incomplete;
        }

        if self.buffer[0] != ESC || !matches!(self.buffer[1], ACK | NAK) {
            let found = [self.buffer[0], self.buffer[1]];
            self.resync();
            return FrameEvent::Invalid(InvalidFrame::BadHeader { found });
        }

        let Some(footer) = self.find_footer() else {
            return FrameEvent::Incomplete;
        };

        // Frame ends with the checksum byte right after the footer
        let frame = self.buffer.split_to(footer + FOOTER.len() + 1).freeze();
        if !checksum::verify(&frame) {
            let last = frame.len() - 1;
            return FrameEvent::Invalid(InvalidFrame::BadChecksum {
                expected: checksum::compute(&frame[..last]),
                found: frame[last],
                frame,
            });
        }

        FrameEvent::FrameReady(ParsedResponse::from_frame(frame))
    }

    /// Offset of the footer, provided the checksum byte after it has arrived.
    fn find_footer(&self) -> Option<usize> {
        let footer = self.buffer[RESPONSE_HEADER_LEN..]
            .windows(FOOTER.len())
            .position(|window| window == FOOTER)?
            + RESPONSE_HEADER_LEN;

        (footer + FOOTER.len() < self.buffer.len()).then_some(footer)
    }

    /// Skip the bad leading byte and everything up to the next ESC.
    fn resync(&mut self) {
        let skip = self.buffer[1..]
            .iter()
            .position(|&b| b == ESC)
            .map_or(self.buffer.len(), |pos| pos + 1);
        self.buffer.advance(skip);
    }
}

// ============================================================================
// TESTS
// ============================================================================
