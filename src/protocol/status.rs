//! # TIJ Status Codes
//!
//! Every response frame carries a status byte after the machine number.
//! Zero means the command succeeded; anything else names a device-level
//! condition. Unknown codes are reported, not rejected.
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | success |
//! | 1 | device error |
//! | 11 | too many QR sub-modules |
//! | 13 | serial-number index not found |
//! | 14 | too few fields |
//! | 15 | bad credentials |
//! | 16 | unknown info name |
//! | 17 / 18 | print already started / not started |
//! | 19 | group mode active |
//! | 20 | print interval too small |
//! | 21 | save failed |
//! | 22 | dual-column nozzle selection |
//! | 23 | fixed speed mode |
//! | 24 | shift overlap |
//! | 66 / 67 | buffer just full / still full |
//! | 253 | service expired |
//! | 254 / 255 | unlocked / locked |

use num_enum::{FromPrimitive, IntoPrimitive};
use serde::Serialize;

/// Known status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum StatusCode {
    Success = 0,
    DeviceError = 1,
    TooManyQrSubModules = 11,
    SerialIndexNotFound = 13,
    TooFewFields = 14,
    BadCredentials = 15,
    UnknownInfoName = 16,
    PrintAlreadyStarted = 17,
    PrintNotStarted = 18,
    GroupMode = 19,
    PrintIntervalTooSmall = 20,
    SaveFailed = 21,
    DualColumnNozzle = 22,
    FixedSpeed = 23,
    ShiftOverlap = 24,
    BufferJustFull = 66,
    BufferStillFull = 67,
    ServiceExpired = 253,
    Unlocked = 254,
    Locked = 255,

    // Explicit discriminant: the implicit one would follow 255 and overflow
    #[num_enum(catch_all)]
    Unknown(u8) = 2,
}

impl StatusCode {
    /// Human description, `None` for codes outside the table.
    pub fn description(self) -> Option<&'static str> {
        let text = match self {
            StatusCode::Success => "success",
            StatusCode::DeviceError => "device error",
            StatusCode::TooManyQrSubModules => "too many QR code sub-modules",
            StatusCode::SerialIndexNotFound => "serial number index not found",
            StatusCode::TooFewFields => "too few fields",
            StatusCode::BadCredentials => "bad credentials",
            StatusCode::UnknownInfoName => "unknown information name",
            StatusCode::PrintAlreadyStarted => "print already started",
            StatusCode::PrintNotStarted => "print not started",
            StatusCode::GroupMode => "group mode active",
            StatusCode::PrintIntervalTooSmall => "print interval too small",
            StatusCode::SaveFailed => "save failed",
            StatusCode::DualColumnNozzle => "dual-column nozzle selection",
            StatusCode::FixedSpeed => "fixed speed mode",
            StatusCode::ShiftOverlap => "shift overlap",
            StatusCode::BufferJustFull => "buffer just became full",
            StatusCode::BufferStillFull => "buffer still full",
            StatusCode::ServiceExpired => "service expired",
            StatusCode::Unlocked => "unlocked",
            StatusCode::Locked => "locked",
            StatusCode::Unknown(_) => return None,
        };
        Some(text)
    }
}

/// Decoded status of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusOutcome {
    pub code: u8,
    pub description: String,
    pub success: bool,
}

/// Describe a status byte.
///
/// ```
/// use tijprint::protocol::status::describe;
///
/// assert!(describe(0).success);
/// assert_eq!(describe(18).description, "print not started");
/// assert_eq!(describe(0x42).description, "buffer just became full");
/// assert_eq!(describe(0x99).description, "unknown status 0x99");
/// ```
pub fn describe(code: u8) -> StatusOutcome {
    let description = StatusCode::from_primitive(code)
        .description()
        .map(str::to_string)
        .unwrap_or_else(|| format!("unknown status 0x{:02X}", code));

    StatusOutcome {
        code,
        description,
        success: code == 0,
    }
}

// ============================================================================
// TESTS
// ============================================================================
