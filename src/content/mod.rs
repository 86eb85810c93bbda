//! # Print Content Encoding
//!
//! Converts print content into TIJ module encodings, and bundles modules
//! into the information file uploaded with command 0x1C.
//!
//! ## Module Structure
//!
//! - [`text`]: Text modules (type 0x01)
//! - [`pattern`]: Bitmap pattern modules (type 0x07) and QR rasterization
//!
//! ## Information File
//!
//! ```text
//! ┌────────────┬──────────┬──────┬───────┬─────────────────────┐
//! │ length     │ name len │ name │ count │ module, module, ... │
//! │ 3 bytes BE │ 1        │ n    │ 1     │                     │
//! └────────────┴──────────┴──────┴───────┴─────────────────────┘
//! ```
//!
//! `length` counts every byte after the length field itself.
//!
//! ## Example
//!
//! ```
//! use tijprint::content::{ContentModule, InfoFile, TextModule};
//!
//! let text = TextModule::new("BEST BEFORE 2027-01").unwrap().at(0, 40);
//! let file = InfoFile::new("Text").with_module(ContentModule::Text(text));
//! let bytes = file.encode().unwrap();
//!
//! let declared = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]) as usize;
//! assert_eq!(declared, bytes.len() - 3);
//! ```

pub mod pattern;
pub mod text;

use num_enum::IntoPrimitive;

use crate::error::TijError;

pub use pattern::{
    PatternModule, QrErrorLevel, Rotation, encode_qr_as_pattern, raster_to_image, render_qr,
};
pub use text::{TextModule, encode_text};

/// Largest body an information file length prefix can describe
pub const MAX_INFO_FILE_BODY: usize = 0xFF_FFFF;

/// Module type byte, first byte of every encoded module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum ModuleType {
    Text = 0x01,
    Pattern = 0x07,
}

/// One piece of print content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentModule {
    Text(TextModule),
    Pattern(PatternModule),
}

impl ContentModule {
    pub fn module_type(&self) -> ModuleType {
        match self {
            ContentModule::Text(_) => ModuleType::Text,
            ContentModule::Pattern(_) => ModuleType::Pattern,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            ContentModule::Text(module) => module.encode(),
            ContentModule::Pattern(module) => module.encode(),
        }
    }
}

impl From<TextModule> for ContentModule {
    fn from(module: TextModule) -> Self {
        ContentModule::Text(module)
    }
}

impl From<PatternModule> for ContentModule {
    fn from(module: PatternModule) -> Self {
        ContentModule::Pattern(module)
    }
}

/// A named set of modules the printer stores and prints as one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoFile {
    pub name: String,
    pub modules: Vec<ContentModule>,
}

impl InfoFile {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            modules: Vec::new(),
        }
    }

    pub fn with_module(mut self, module: impl Into<ContentModule>) -> Self {
        self.modules.push(module.into());
        self
    }

    /// Serialize with the 3-byte length prefix.
    pub fn encode(&self) -> Result<Vec<u8>, TijError> {
        let name = self.name.as_bytes();
        if name.is_empty() || name.len() > u8::MAX as usize {
            return Err(TijError::Validation(format!(
                "information file name must be 1-255 bytes, got {}",
                name.len()
            )));
        }
        if self.modules.len() > u8::MAX as usize {
            return Err(TijError::Validation(format!(
                "information file holds {} modules, at most 255 fit",
                self.modules.len()
            )));
        }

        let mut body = Vec::new();
        body.push(name.len() as u8);
        body.extend_from_slice(name);
        body.push(self.modules.len() as u8);
        for module in &self.modules {
            body.extend(module.encode());
        }

        if body.len() > MAX_INFO_FILE_BODY {
            return Err(TijError::Validation(format!(
                "information file body is {} bytes, limit is {}",
                body.len(),
                MAX_INFO_FILE_BODY
            )));
        }

        let length = (body.len() as u32).to_be_bytes();
        let mut out = Vec::with_capacity(3 + body.len());
        out.extend_from_slice(&length[1..]);
        out.extend(body);
        Ok(out)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_info_file_layout() {
        let text = TextModule::new("Hi").unwrap();
        let module = text.encode();
        let bytes = InfoFile::new("Text").with_module(text).encode().unwrap();

        let body_len = 1 + 4 + 1 + module.len();
        assert_eq!(&bytes[..3], &[0x00, 0x00, body_len as u8]);
        assert_eq!(bytes[3], 4);
        assert_eq!(&bytes[4..8], b"Text");
        assert_eq!(bytes[8], 1);
        assert_eq!(&bytes[9..], module.as_slice());
    }

    #[test]
    fn test_info_file_mixed_modules() {
        let qr = PatternModule::qr("lot 7", 2, QrErrorLevel::M).unwrap();
        let caption = TextModule::new("lot 7").unwrap().at(0, 80);
        let file = InfoFile::new("QRCode").with_module(qr.clone()).with_module(caption.clone());

        let bytes = file.encode().unwrap();
        let declared = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]) as usize;
        assert_eq!(declared, bytes.len() - 3);
        assert_eq!(bytes[3 + 1 + 6], 2);

        let modules_start = 3 + 1 + 6 + 1;
        let qr_bytes = qr.encode();
        assert_eq!(&bytes[modules_start..modules_start + qr_bytes.len()], qr_bytes.as_slice());
        assert_eq!(&bytes[modules_start + qr_bytes.len()..], caption.encode().as_slice());
    }

    #[test]
    fn test_empty_info_file_is_allowed() {
        let bytes = InfoFile::new("Blank").encode().unwrap();
        assert_eq!(bytes, vec![0, 0, 7, 5, b'B', b'l', b'a', b'n', b'k', 0]);
    }

    #[test]
    fn test_info_file_validation() {
        assert!(matches!(
            InfoFile::new("").encode(),
            Err(TijError::Validation(_))
        ));

        let mut crowded = InfoFile::new("Many");
        for _ in 0..256 {
            crowded = crowded.with_module(TextModule::new("x").unwrap());
        }
        assert!(matches!(crowded.encode(), Err(TijError::Validation(_))));
    }

    #[test]
    fn test_module_type_bytes() {
        let text: ContentModule = TextModule::new("x").unwrap().into();
        assert_eq!(text.module_type(), ModuleType::Text);
        assert_eq!(u8::from(ModuleType::Pattern), 0x07);
        assert_eq!(text.encode()[0], 0x01);
    }
}
