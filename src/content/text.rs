//! # Text Module
//!
//! Encodes a line of text as a TIJ text module (module type 0x01).
//!
//! ## Layout
//!
//! | Field | Size | Notes |
//! |-------|------|-------|
//! | module type | 1 | 0x01 |
//! | x | 2 BE | low 15 bits |
//! | y | 2 BE | low 15 bits |
//! | rotation | 2 BE | degrees, 0-359 |
//! | spacing | 1 | 0x05 |
//! | font size | 2 BE | 5-1200 |
//! | font name length | 1 | |
//! | font name | n | "Arial" |
//! | text length | 1 | at most 64 |
//! | text | n | UTF-8, truncated to 64 bytes |

use serde::{Deserialize, Serialize};

use super::ModuleType;
use crate::error::TijError;

/// Longest text the printer accepts in one module, in bytes
pub const MAX_TEXT_BYTES: usize = 64;

/// Font the printer renders text modules with
pub const FONT_NAME: &str = "Arial";

/// Character spacing byte
pub const CHARACTER_SPACING: u8 = 0x05;

/// Font size limits in points
pub const MIN_FONT_SIZE: u16 = 5;
pub const MAX_FONT_SIZE: u16 = 1200;

/// Coordinates are 15-bit on the wire
const COORDINATE_MASK: u16 = 0x7FFF;

/// A text module ready for encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextModule {
    pub x: u16,
    pub y: u16,
    pub rotation: u16,
    pub font_size: u16,
    pub text: String,
}

impl TextModule {
    /// Create a text module at the origin, 24 pt, unrotated.
    ///
    /// Text longer than 64 bytes is cut at the last character boundary that
    /// fits. Empty text is rejected.
    pub fn new(text: &str) -> Result<Self, TijError> {
        if text.is_empty() {
            return Err(TijError::Validation("text content is empty".to_string()));
        }
        Ok(Self {
            x: 0,
            y: 0,
            rotation: 0,
            font_size: 24,
            text: truncate_utf8(text, MAX_TEXT_BYTES).to_string(),
        })
    }

    /// Position in printer dots.
    pub fn at(mut self, x: u16, y: u16) -> Self {
        self.x = x & COORDINATE_MASK;
        self.y = y & COORDINATE_MASK;
        self
    }

    /// Rotation in degrees, any sign, normalized to 0-359.
    pub fn rotation(mut self, degrees: i32) -> Self {
        self.rotation = degrees.rem_euclid(360) as u16;
        self
    }

    /// Font size in points, clamped to the printer's range.
    pub fn font_size(mut self, points: u16) -> Self {
        self.font_size = points.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let text = self.text.as_bytes();
        let font = FONT_NAME.as_bytes();

        let mut out = Vec::with_capacity(12 + font.len() + text.len());
        out.push(ModuleType::Text.into());
        out.extend_from_slice(&(self.x & COORDINATE_MASK).to_be_bytes());
        out.extend_from_slice(&(self.y & COORDINATE_MASK).to_be_bytes());
        out.extend_from_slice(&(self.rotation % 360).to_be_bytes());
        out.push(CHARACTER_SPACING);
        out.extend_from_slice(
            &self
                .font_size
                .clamp(MIN_FONT_SIZE, MAX_FONT_SIZE)
                .to_be_bytes(),
        );
        out.push(font.len() as u8);
        out.extend_from_slice(font);
        out.push(text.len() as u8);
        out.extend_from_slice(text);
        out
    }
}

/// # Encode Text Module
///
/// ```
/// use tijprint::content::encode_text;
///
/// let module = encode_text("LOT 42", 24, 10, 0, 0).unwrap();
/// assert_eq!(module[0], 0x01);
/// assert_eq!(&module[module.len() - 6..], b"LOT 42");
/// ```
pub fn encode_text(
    text: &str,
    font_size: u16,
    x: u16,
    y: u16,
    rotation: i32,
) -> Result<Vec<u8>, TijError> {
    Ok(TextModule::new(text)?
        .font_size(font_size)
        .at(x, y)
        .rotation(rotation)
        .encode())
}

/// Longest prefix of `text` that fits in `max` bytes without splitting a character.
fn truncate_utf8(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// ============================================================================
// TESTS
// ============================================================================
