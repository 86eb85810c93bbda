//! # TIJ Command Catalog
//!
//! Command ids understood by TIJ marking printers. The id is the fourth byte
//! of every request frame and is echoed in the fifth byte of the response.
//!
//! ## Categories
//!
//! | Range | Category |
//! |-------|----------|
//! | 0x00-0x03 | Handshake, send print, lock/unlock |
//! | 0x07-0x0E | Counters and serial numbers |
//! | 0x11-0x15 | Print control and alarms |
//! | 0x18-0x1A | Font defaults |
//! | 0x1C-0x22 | Content, information library, print mode |
//! | 0x23-0x2F | Nozzle, cartridge and image orientation |
//! | 0x30-0x39 | Encoder, delays, remote field buffer, heads |
//! | 0x40-0x42 | Cartridge parameters and ink usage |
//! | 0x50 | File transfer |
//! | 0xFD | Cartridge unique id |
//!
//! ## Content Upload Sequence
//!
//! ```text
//! 0x1C Send Information File   (modules wrapped in an information file)
//! 0x01 Send Print              (activate the uploaded file)
//! 0x11 Start Printing          (once per job)
//! 0x13 Trigger Print           (one print per trigger)
//! ```

use num_enum::{FromPrimitive, IntoPrimitive};

/// Known TIJ command ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum CommandId {
    Handshake = 0x00,
    SendPrint = 0x01,
    Lock = 0x02,
    Unlock = 0x03,

    GetPrintSubtotal = 0x07,
    GetProductSubtotal = 0x08,
    GetPrintTotal = 0x09,
    GetProductTotal = 0x0A,
    ResetSubtotal = 0x0B,
    ResetTotal = 0x0C,
    ResetSerialNumber = 0x0D,
    SetSerialNumber = 0x0E,

    StartPrinting = 0x11,
    StopPrinting = 0x12,
    TriggerPrint = 0x13,
    GetAlarmStatus = 0x14,
    CancelAlarmFlash = 0x15,

    SetFontName = 0x18,
    SetFontSize = 0x19,
    SetFontSpacing = 0x1A,

    SendInformationFile = 0x1C,
    FillRemoteField = 0x1D,
    LoadLibraryMessage = 0x1E,
    GetLibraryFileNames = 0x1F,
    SetPrintMode = 0x20,
    ClearRemoteBuffer = 0x21,
    SetFlashSpray = 0x22,

    CleanNozzle = 0x23,
    GetCartridgeLevel = 0x26,
    SelectNozzle = 0x27,
    SetPhotoEyeLevel = 0x28,
    SetMirror = 0x29,
    SetUpsideDown = 0x2A,
    SetScanDirection = 0x2B,
    SetGrayscale = 0x2C,
    SetHeadVoltage = 0x2D,
    SetPulseWidth = 0x2E,
    SetColumnSpacing = 0x2F,

    SetEncoderResolution = 0x30,
    SetEncoderWheelDiameter = 0x31,
    SetPrintDelay = 0x32,
    GetRemoteBufferCount = 0x33,
    SetRemoteBufferMax = 0x34,
    EnableTriggerSignal = 0x35,
    KeepLastFieldData = 0x36,
    SetFlipDelay = 0x37,
    SelectHead = 0x38,
    SetHeadOverlap = 0x39,

    SetCartridgeParameterMode = 0x40,
    ProbeVoltage = 0x41,
    GetInkDotCount = 0x42,

    SendFile = 0x50,

    GetCartridgeId = 0xFD,

    #[num_enum(catch_all)]
    Unknown(u8),
}

impl CommandId {
    /// Every named command, in id order.
    pub const ALL: &'static [CommandId] = &[
        CommandId::Handshake,
        CommandId::SendPrint,
        CommandId::Lock,
        CommandId::Unlock,
        CommandId::GetPrintSubtotal,
        CommandId::GetProductSubtotal,
        CommandId::GetPrintTotal,
        CommandId::GetProductTotal,
        CommandId::ResetSubtotal,
        CommandId::ResetTotal,
        CommandId::ResetSerialNumber,
        CommandId::SetSerialNumber,
        CommandId::StartPrinting,
        CommandId::StopPrinting,
        CommandId::TriggerPrint,
        CommandId::GetAlarmStatus,
        CommandId::CancelAlarmFlash,
        CommandId::SetFontName,
        CommandId::SetFontSize,
        CommandId::SetFontSpacing,
        CommandId::SendInformationFile,
        CommandId::FillRemoteField,
        CommandId::LoadLibraryMessage,
        CommandId::GetLibraryFileNames,
        CommandId::SetPrintMode,
        CommandId::ClearRemoteBuffer,
        CommandId::SetFlashSpray,
        CommandId::CleanNozzle,
        CommandId::GetCartridgeLevel,
        CommandId::SelectNozzle,
        CommandId::SetPhotoEyeLevel,
        CommandId::SetMirror,
        CommandId::SetUpsideDown,
        CommandId::SetScanDirection,
        CommandId::SetGrayscale,
        CommandId::SetHeadVoltage,
        CommandId::SetPulseWidth,
        CommandId::SetColumnSpacing,
        CommandId::SetEncoderResolution,
        CommandId::SetEncoderWheelDiameter,
        CommandId::SetPrintDelay,
        CommandId::GetRemoteBufferCount,
        CommandId::SetRemoteBufferMax,
        CommandId::EnableTriggerSignal,
        CommandId::KeepLastFieldData,
        CommandId::SetFlipDelay,
        CommandId::SelectHead,
        CommandId::SetHeadOverlap,
        CommandId::SetCartridgeParameterMode,
        CommandId::ProbeVoltage,
        CommandId::GetInkDotCount,
        CommandId::SendFile,
        CommandId::GetCartridgeId,
    ];

    /// Wire byte.
    #[inline]
    pub fn id(self) -> u8 {
        self.into()
    }

    /// Human-readable name used in the communication log.
    pub fn name(self) -> String {
        let name = match self {
            CommandId::Handshake => "Handshake",
            CommandId::SendPrint => "Send Print",
            CommandId::Lock => "Lock",
            CommandId::Unlock => "Unlock",
            CommandId::GetPrintSubtotal => "Get Print Subtotal",
            CommandId::GetProductSubtotal => "Get Product Subtotal",
            CommandId::GetPrintTotal => "Get Print Total",
            CommandId::GetProductTotal => "Get Product Total",
            CommandId::ResetSubtotal => "Reset Subtotal",
            CommandId::ResetTotal => "Reset Total",
            CommandId::ResetSerialNumber => "Reset Serial Number",
            CommandId::SetSerialNumber => "Set Serial Number",
            CommandId::StartPrinting => "Start Printing",
            CommandId::StopPrinting => "Stop Printing",
            CommandId::TriggerPrint => "Trigger Print",
            CommandId::GetAlarmStatus => "Get Alarm Status",
            CommandId::CancelAlarmFlash => "Cancel Alarm Flash",
            CommandId::SetFontName => "Set Font Name",
            CommandId::SetFontSize => "Set Font Size",
            CommandId::SetFontSpacing => "Set Font Spacing",
            CommandId::SendInformationFile => "Send Information File",
            CommandId::FillRemoteField => "Fill Remote Field Data",
            CommandId::LoadLibraryMessage => "Load Library Message",
            CommandId::GetLibraryFileNames => "Get Library File Names",
            CommandId::SetPrintMode => "Set Print Mode",
            CommandId::ClearRemoteBuffer => "Clear 1D Buffer",
            CommandId::SetFlashSpray => "Set Flash Spray",
            CommandId::CleanNozzle => "Clean Nozzle",
            CommandId::GetCartridgeLevel => "Get Cartridge Level",
            CommandId::SelectNozzle => "Select Nozzle",
            CommandId::SetPhotoEyeLevel => "Set Photo Eye Level",
            CommandId::SetMirror => "Set Mirror",
            CommandId::SetUpsideDown => "Set Upside Down",
            CommandId::SetScanDirection => "Set Scan Direction",
            CommandId::SetGrayscale => "Set Grayscale",
            CommandId::SetHeadVoltage => "Set Head Voltage",
            CommandId::SetPulseWidth => "Set Pulse Width",
            CommandId::SetColumnSpacing => "Set Dual Column Spacing",
            CommandId::SetEncoderResolution => "Set Encoder Resolution",
            CommandId::SetEncoderWheelDiameter => "Set Encoder Wheel Diameter",
            CommandId::SetPrintDelay => "Set Print Delay",
            CommandId::GetRemoteBufferCount => "Get Remote Field Buffer Count",
            CommandId::SetRemoteBufferMax => "Set Remote Field Buffer Max",
            CommandId::EnableTriggerSignal => "Enable Trigger Signal",
            CommandId::KeepLastFieldData => "Keep Last Field Data",
            CommandId::SetFlipDelay => "Set Flip Delay",
            CommandId::SelectHead => "Select Head",
            CommandId::SetHeadOverlap => "Set Head Overlap",
            CommandId::SetCartridgeParameterMode => "Set Cartridge Parameter Mode",
            CommandId::ProbeVoltage => "Probe Voltage",
            CommandId::GetInkDotCount => "Get Ink Dot Count",
            CommandId::SendFile => "Send File",
            CommandId::GetCartridgeId => "Get Cartridge Id",
            CommandId::Unknown(id) => return format!("Command 0x{:02X}", id),
        };
        name.to_string()
    }

    /// Commands that upload content and get the longer response deadline.
    pub fn is_upload(self) -> bool {
        matches!(self, CommandId::SendInformationFile | CommandId::SendFile)
    }
}

/// Name for a raw command byte.
#[inline]
pub fn name_of(id: u8) -> String {
    CommandId::from_primitive(id).name()
}

// ============================================================================
// TESTS
// ============================================================================
