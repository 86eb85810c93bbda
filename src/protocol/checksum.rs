//! # TIJ Frame Checksum
//!
//! Every TIJ frame ends with a single checksum byte chosen so that the sum of
//! all frame bytes, including the checksum itself, is zero modulo 256.
//!
//! ```text
//! checksum = (0x100 - (sum(bytes) mod 256)) mod 256
//! ```
//!
//! The sum covers everything from the leading ESC through the trailing ETX.
//!
//! ## Example
//!
//! ```
//! use tijprint::protocol::checksum;
//!
//! let body = [0x1B, 0x02, 0x77, 0x11, 0x1B, 0x03];
//! let ck = checksum::compute(&body);
//! assert_eq!(ck, 0x3D);
//!
//! let mut frame = body.to_vec();
//! frame.push(ck);
//! assert!(checksum::verify(&frame));
//! ```

/// Compute the checksum byte for `bytes`.
#[inline]
pub fn compute(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    0u8.wrapping_sub(sum)
}

/// Check that the last byte of `frame` is the checksum of the bytes before it.
///
/// An empty slice has no checksum byte and never verifies.
#[inline]
pub fn verify(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((&last, body)) => compute(body) == last,
        None => false,
    }
}

// ============================================================================
// TESTS
// ============================================================================
