//! # Pattern Module and QR Rasterization
//!
//! A pattern module (module type 0x07) carries a monochrome bitmap the
//! printer places like an image. QR codes are rendered on the host and sent
//! as patterns; the printer's own barcode module is not used.
//!
//! ## Layout
//!
//! | Field | Size | Notes |
//! |-------|------|-------|
//! | module type | 1 | 0x07 |
//! | x | 2 BE | |
//! | y | 2 BE | |
//! | rotation | 2 BE | 0, 90, 180 or 270 |
//! | scale | 1 | percent, 100 |
//! | flags | 1 | `(inverse << 4) \| operation` |
//! | file name length | 1 | |
//! | file name | n | "qr.bmp" |
//! | width | 2 BE | dots |
//! | height | 2 BE | dots |
//! | bitmap | stride × height | |
//!
//! ## Bit Packing
//!
//! Rows are packed MSB-first, `stride = ceil(width / 8)` bytes per row,
//! padding bits on the right are white:
//!
//! ```text
//! Byte value 0xF0 = 11110000 = ████░░░░
//! Byte value 0x3F = 00111111 = ░░██████
//! ```
//!
//! ## Rasterization
//!
//! ```text
//! content ──qrcode──► module grid ──scale + quiet zone──► GrayImage
//!                                                             │
//!                                      threshold at 128 (dark = 1)
//!                                                             ▼
//!                                                       packed bitmap
//! ```

use std::str::FromStr;

use image::{GrayImage, Luma};
use num_enum::IntoPrimitive;
use qrcode::{Color, EcLevel, QrCode};
use serde::{Deserialize, Serialize};

use super::ModuleType;
use crate::error::TijError;

/// File name the printer stores rasterized QR patterns under
pub const QR_FILE_NAME: &str = "qr.bmp";

/// Scale byte: the bitmap is printed at its native size
pub const NATIVE_SCALE_PERCENT: u8 = 100;

/// Light border around the QR symbol, in QR modules
pub const QUIET_ZONE_MODULES: u32 = 2;

/// Largest accepted dots-per-module value
pub const MAX_MODULE_DOTS: u8 = 16;

/// Grey level at or above which a pixel is printed white
const THRESHOLD: u8 = 128;

/// QR error correction level.
///
/// | Level | Recovery |
/// |-------|----------|
/// | L | ~7% |
/// | M | ~15% |
/// | Q | ~25% |
/// | H | ~30% |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QrErrorLevel {
    L,
    #[default]
    M,
    Q,
    H,
}

impl From<QrErrorLevel> for EcLevel {
    fn from(level: QrErrorLevel) -> Self {
        match level {
            QrErrorLevel::L => EcLevel::L,
            QrErrorLevel::M => EcLevel::M,
            QrErrorLevel::Q => EcLevel::Q,
            QrErrorLevel::H => EcLevel::H,
        }
    }
}

impl FromStr for QrErrorLevel {
    type Err = TijError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "L" => Ok(QrErrorLevel::L),
            "M" => Ok(QrErrorLevel::M),
            "Q" => Ok(QrErrorLevel::Q),
            "H" => Ok(QrErrorLevel::H),
            other => Err(TijError::Validation(format!(
                "unknown error correction level '{}', expected L, M, Q or H",
                other
            ))),
        }
    }
}

/// Pattern rotation; the printer only accepts quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive)]
#[repr(u16)]
pub enum Rotation {
    #[default]
    Deg0 = 0,
    Deg90 = 90,
    Deg180 = 180,
    Deg270 = 270,
}

impl Rotation {
    /// Nearest quarter turn to an arbitrary angle.
    pub fn from_degrees(degrees: i32) -> Self {
        match (degrees.rem_euclid(360) + 45) / 90 % 4 {
            0 => Rotation::Deg0,
            1 => Rotation::Deg90,
            2 => Rotation::Deg180,
            _ => Rotation::Deg270,
        }
    }
}

/// How the pattern combines with other content (low nibble of the flags byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive)]
#[repr(u8)]
pub enum PatternOperation {
    #[default]
    Normal = 0,
}

/// A pattern module ready for encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternModule {
    pub x: u16,
    pub y: u16,
    pub rotation: Rotation,
    pub scale_percent: u8,
    pub inverse: bool,
    pub operation: PatternOperation,
    pub file_name: String,
    pub width: u16,
    pub height: u16,
    pub bitmap: Vec<u8>,
}

impl PatternModule {
    /// Wrap a packed bitmap.
    ///
    /// `bitmap` must hold exactly `ceil(width / 8) * height` bytes.
    pub fn from_bitmap(
        file_name: &str,
        width: u16,
        height: u16,
        bitmap: Vec<u8>,
    ) -> Result<Self, TijError> {
        if width == 0 || height == 0 {
            return Err(TijError::Validation(format!(
                "pattern size {}x{} is empty",
                width, height
            )));
        }
        let expected = stride(width as usize) * height as usize;
        if bitmap.len() != expected {
            return Err(TijError::Validation(format!(
                "bitmap holds {} bytes, {}x{} needs {}",
                bitmap.len(),
                width,
                height,
                expected
            )));
        }
        if file_name.is_empty() || file_name.len() > u8::MAX as usize {
            return Err(TijError::Validation(format!(
                "pattern file name must be 1-255 bytes, got {}",
                file_name.len()
            )));
        }

        Ok(Self {
            x: 0,
            y: 0,
            rotation: Rotation::Deg0,
            scale_percent: NATIVE_SCALE_PERCENT,
            inverse: false,
            operation: PatternOperation::Normal,
            file_name: file_name.to_string(),
            width,
            height,
            bitmap,
        })
    }

    /// Render `content` as a QR code with `module_dots` dots per QR module.
    pub fn qr(content: &str, module_dots: u8, level: QrErrorLevel) -> Result<Self, TijError> {
        let image = render_qr(content, module_dots, level)?;
        let (width, height) = image.dimensions();
        Self::from_bitmap(
            QR_FILE_NAME,
            width as u16,
            height as u16,
            rasterize(&image),
        )
    }

    pub fn at(mut self, x: u16, y: u16) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Ask the printer to swap dark and light when printing.
    pub fn inverse(mut self, inverse: bool) -> Self {
        self.inverse = inverse;
        self
    }

    fn flags(&self) -> u8 {
        (u8::from(self.inverse) << 4) | u8::from(self.operation)
    }

    pub fn encode(&self) -> Vec<u8> {
        let name = self.file_name.as_bytes();

        let mut out = Vec::with_capacity(15 + name.len() + self.bitmap.len());
        out.push(ModuleType::Pattern.into());
        out.extend_from_slice(&self.x.to_be_bytes());
        out.extend_from_slice(&self.y.to_be_bytes());
        out.extend_from_slice(&u16::from(self.rotation).to_be_bytes());
        out.push(self.scale_percent);
        out.push(self.flags());
        out.push(name.len() as u8);
        out.extend_from_slice(name);
        out.extend_from_slice(&self.width.to_be_bytes());
        out.extend_from_slice(&self.height.to_be_bytes());
        out.extend_from_slice(&self.bitmap);
        out
    }
}

/// # Encode QR Code as Pattern Module
///
/// Renders `content` at the requested error correction level and wraps the
/// bitmap in a pattern module. `size_hint` is the number of dots per QR
/// module (1-16). Rotation snaps to the nearest quarter turn.
///
/// ```
/// use tijprint::content::{encode_qr_as_pattern, QrErrorLevel};
///
/// let module = encode_qr_as_pattern("https://example.com", 3, 0, 0, 0, QrErrorLevel::M, false)
///     .unwrap();
/// assert_eq!(module[0], 0x07);
/// ```
pub fn encode_qr_as_pattern(
    content: &str,
    size_hint: u8,
    x: u16,
    y: u16,
    rotation: i32,
    level: QrErrorLevel,
    inverse: bool,
) -> Result<Vec<u8>, TijError> {
    Ok(PatternModule::qr(content, size_hint, level)?
        .at(x, y)
        .rotation(Rotation::from_degrees(rotation))
        .inverse(inverse)
        .encode())
}

/// Render a QR code to a grayscale image, black modules on white.
pub fn render_qr(content: &str, module_dots: u8, level: QrErrorLevel) -> Result<GrayImage, TijError> {
    if content.is_empty() {
        return Err(TijError::Validation("QR content is empty".to_string()));
    }

    let code = QrCode::with_error_correction_level(content.as_bytes(), level.into())
        .map_err(|e| TijError::Validation(format!("QR code generation failed: {}", e)))?;

    let cell = module_dots.clamp(1, MAX_MODULE_DOTS) as u32;
    let modules = code.width() as u32;
    let side = (modules + 2 * QUIET_ZONE_MODULES) * cell;
    let offset = QUIET_ZONE_MODULES * cell;

    let mut image = GrayImage::from_pixel(side, side, Luma([255]));
    for qy in 0..modules {
        for qx in 0..modules {
            if code[(qx as usize, qy as usize)] != Color::Dark {
                continue;
            }
            for cy in 0..cell {
                for cx in 0..cell {
                    image.put_pixel(offset + qx * cell + cx, offset + qy * cell + cy, Luma([0]));
                }
            }
        }
    }

    Ok(image)
}

/// Threshold an image at mid-grey and pack it row by row.
///
/// Output length is `ceil(width / 8) * height`.
pub fn rasterize(image: &GrayImage) -> Vec<u8> {
    let (width, height) = image.dimensions();
    let mut data = Vec::with_capacity(stride(width as usize) * height as usize);

    for y in 0..height {
        let row: Vec<bool> = (0..width)
            .map(|x| image.get_pixel(x, y).0[0] < THRESHOLD)
            .collect();
        data.extend(pack_row(&row));
    }

    data
}

/// Pack one row of pixels, MSB = leftmost, 1 = dark.
pub fn pack_row(pixels: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; stride(pixels.len())];

    for (i, &pixel) in pixels.iter().enumerate() {
        if pixel {
            bytes[i / 8] |= 1 << (7 - (i % 8));
        }
    }

    bytes
}

/// Expand a packed bitmap back into an image (for previews).
pub fn raster_to_image(width: u16, height: u16, data: &[u8]) -> Result<GrayImage, TijError> {
    let row_bytes = stride(width as usize);
    if data.len() != row_bytes * height as usize {
        return Err(TijError::Image(format!(
            "bitmap holds {} bytes, {}x{} needs {}",
            data.len(),
            width,
            height,
            row_bytes * height as usize
        )));
    }

    let mut image = GrayImage::new(width as u32, height as u32);
    for y in 0..height as usize {
        for x in 0..width as usize {
            let is_dark = (data[y * row_bytes + x / 8] >> (7 - (x % 8))) & 1 == 1;
            let color = if is_dark { 0u8 } else { 255u8 };
            image.put_pixel(x as u32, y as u32, Luma([color]));
        }
    }

    Ok(image)
}

#[inline]
fn stride(width: usize) -> usize {
    width.div_ceil(8)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pack_row() {
        assert_eq!(pack_row(&[true; 8]), vec![0xFF]);
        assert_eq!(pack_row(&[false; 8]), vec![0x00]);
        assert_eq!(
            pack_row(&[true, false, true, false, true, false, true, false]),
            vec![0xAA]
        );
        // 9 pixels pad to 2 bytes
        assert_eq!(pack_row(&[true; 9]), vec![0xFF, 0x80]);
        assert_eq!(pack_row(&[]), Vec::<u8>::new());
    }

    #[test]
    fn test_rasterize_threshold() {
        let mut image = GrayImage::from_pixel(10, 2, Luma([255]));
        image.put_pixel(0, 0, Luma([0]));
        image.put_pixel(1, 0, Luma([127]));
        image.put_pixel(2, 0, Luma([128]));
        image.put_pixel(9, 1, Luma([10]));

        let data = rasterize(&image);
        assert_eq!(data, vec![0xC0, 0x00, 0x00, 0x40]);
    }

    #[test]
    fn test_qr_bitmap_dimensions() {
        for dots in [1u8, 3, 5] {
            let module = PatternModule::qr("https://example.com/batch/0042", dots, QrErrorLevel::M)
                .unwrap();
            let width = module.width as usize;
            let height = module.height as usize;
            assert_eq!(width, height);
            assert_eq!(width % dots as usize, 0);
            assert_eq!(module.bitmap.len(), width.div_ceil(8) * height);
            assert!(module.bitmap.len() * 8 >= width * height);
        }
    }

    #[test]
    fn test_qr_version_one_layout() {
        // Short content at level L fits in a 21x21 symbol, plus 2+2 quiet zone
        let module = PatternModule::qr("A", 1, QrErrorLevel::L).unwrap();
        assert_eq!((module.width, module.height), (25, 25));
        assert_eq!(module.bitmap.len(), 4 * 25);

        // Quiet zone rows are white
        assert!(module.bitmap[..8].iter().all(|&b| b == 0));
        // First symbol row starts with the 7-dot finder pattern at x = 2..=8
        let row = &module.bitmap[2 * 4..3 * 4];
        assert_eq!(row[0], 0x3F);
        assert_eq!(row[1] & 0xC0, 0x80);
    }

    #[test]
    fn test_module_dots_clamped() {
        let zero = PatternModule::qr("A", 0, QrErrorLevel::L).unwrap();
        assert_eq!(zero.width, 25);
        let huge = PatternModule::qr("A", 200, QrErrorLevel::L).unwrap();
        assert_eq!(huge.width, 25 * MAX_MODULE_DOTS as u16);
    }

    #[test]
    fn test_pattern_header() {
        let module = PatternModule::from_bitmap("qr.bmp", 9, 2, vec![0xFF, 0x80, 0x00, 0x00])
            .unwrap()
            .at(0x0010, 0x0020)
            .rotation(Rotation::Deg180)
            .inverse(true);

        let mut expected = vec![
            0x07, // pattern module
            0x00, 0x10, // x
            0x00, 0x20, // y
            0x00, 0xB4, // 180 degrees
            100,  // scale
            0x10, // inverse, normal operation
            6,    // file name length
        ];
        expected.extend_from_slice(b"qr.bmp");
        expected.extend_from_slice(&[0x00, 0x09, 0x00, 0x02]);
        expected.extend_from_slice(&[0xFF, 0x80, 0x00, 0x00]);
        assert_eq!(module.encode(), expected);
    }

    #[test]
    fn test_from_bitmap_checks_length() {
        assert!(PatternModule::from_bitmap("p.bmp", 9, 2, vec![0; 3]).is_err());
        assert!(PatternModule::from_bitmap("p.bmp", 0, 2, vec![]).is_err());
        assert!(PatternModule::from_bitmap("", 8, 1, vec![0]).is_err());
    }

    #[test]
    fn test_rotation_snaps() {
        assert_eq!(Rotation::from_degrees(0), Rotation::Deg0);
        assert_eq!(Rotation::from_degrees(44), Rotation::Deg0);
        assert_eq!(Rotation::from_degrees(46), Rotation::Deg90);
        assert_eq!(Rotation::from_degrees(180), Rotation::Deg180);
        assert_eq!(Rotation::from_degrees(-90), Rotation::Deg270);
        assert_eq!(Rotation::from_degrees(350), Rotation::Deg0);
        assert_eq!(Rotation::from_degrees(630), Rotation::Deg270);
    }

    #[test]
    fn test_encode_qr_flags_and_rotation() {
        let bytes = encode_qr_as_pattern("hello", 2, 5, 6, 95, QrErrorLevel::H, true).unwrap();
        assert_eq!(&bytes[..9], &[0x07, 0x00, 0x05, 0x00, 0x06, 0x00, 0x5A, 100, 0x10]);
        assert_eq!(&bytes[10..16], b"qr.bmp");
    }

    #[test]
    fn test_empty_qr_rejected() {
        assert!(matches!(
            encode_qr_as_pattern("", 3, 0, 0, 0, QrErrorLevel::M, false),
            Err(TijError::Validation(_))
        ));
    }

    #[test]
    fn test_oversized_qr_rejected() {
        let content = "x".repeat(4000);
        assert!(matches!(
            PatternModule::qr(&content, 1, QrErrorLevel::H),
            Err(TijError::Validation(_))
        ));
    }

    #[test]
    fn test_raster_to_image_roundtrip_pixels() {
        let module = PatternModule::qr("preview", 2, QrErrorLevel::Q).unwrap();
        let image = raster_to_image(module.width, module.height, &module.bitmap).unwrap();
        assert_eq!(rasterize(&image), module.bitmap);
        assert!(raster_to_image(8, 2, &[0]).is_err());
    }

    #[test]
    fn test_error_level_parse() {
        assert_eq!("h".parse::<QrErrorLevel>().unwrap(), QrErrorLevel::H);
        assert_eq!("L".parse::<QrErrorLevel>().unwrap(), QrErrorLevel::L);
        assert!("X".parse::<QrErrorLevel>().is_err());
    }
}
