//! # Printer Operations
//!
//! Caller-facing operations over one [`ProtocolSession`]: status polling,
//! print control, text and QR jobs, and raw debug commands.
//!
//! ## Print Job Flow
//!
//! ```text
//! TextRequest / QrRequest
//!        │ to_info_file()
//!        ▼
//!    InfoFile ──0x1C──► printer stores it
//!                0x01──► printer activates it
//!                0x13──► one print per trigger (quantity times)
//! ```
//!
//! Request types deserialize from JSON, so an HTTP or IPC front end can
//! pass bodies straight through.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::content::{InfoFile, PatternModule, QrErrorLevel, Rotation, TextModule};
use crate::error::TijError;
use crate::protocol::commands::{self, CommandId};
use crate::session::{LogEntry, ProtocolSession};
use crate::thermal;
use crate::transport::ConnectionConfig;

/// Information file name used for text jobs
pub const TEXT_INFO_NAME: &str = "Text";

/// Information file name used for QR jobs
pub const QR_INFO_NAME: &str = "QRCode";

/// Pause between triggers of a multi-copy job
pub const TRIGGER_INTERVAL: Duration = Duration::from_millis(500);

/// Snapshot returned by [`Printer::status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrinterStatus {
    pub connected: bool,
    /// Ink level in percent, first data byte of command 0x26
    pub cartridge_level: Option<u8>,
    pub printing: bool,
    /// Raw alarm bytes from command 0x14, upper-case hex
    pub alarm: Option<String>,
    /// Host CPU temperature in °C
    pub cpu_temperature: Option<f64>,
    /// Why a query failed, if one did
    pub error: Option<String>,
}

fn default_font_size() -> u16 {
    24
}

fn default_module_dots() -> u8 {
    3
}

/// A one-line text job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRequest {
    pub text: String,
    #[serde(default = "default_font_size")]
    pub font_size: u16,
    #[serde(default)]
    pub x: u16,
    #[serde(default)]
    pub y: u16,
    #[serde(default)]
    pub rotation: i32,
    /// Prints to trigger after loading; 0 only loads the message
    #[serde(default)]
    pub quantity: u16,
}

impl TextRequest {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            font_size: default_font_size(),
            x: 0,
            y: 0,
            rotation: 0,
            quantity: 0,
        }
    }

    pub fn to_info_file(&self) -> Result<InfoFile, TijError> {
        let module = TextModule::new(&self.text)?
            .font_size(self.font_size)
            .at(self.x, self.y)
            .rotation(self.rotation);
        Ok(InfoFile::new(TEXT_INFO_NAME).with_module(module))
    }
}

/// A QR code job, rendered on the host and sent as a bitmap pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrRequest {
    pub content: String,
    /// Dots per QR module
    #[serde(default = "default_module_dots")]
    pub size: u8,
    #[serde(default)]
    pub x: u16,
    #[serde(default)]
    pub y: u16,
    #[serde(default)]
    pub rotation: i32,
    #[serde(default)]
    pub level: QrErrorLevel,
    #[serde(default)]
    pub inverse: bool,
    #[serde(default)]
    pub quantity: u16,
}

impl QrRequest {
    pub fn new(content: &str) -> Self {
        Self {
            content: content.to_string(),
            size: default_module_dots(),
            x: 0,
            y: 0,
            rotation: 0,
            level: QrErrorLevel::default(),
            inverse: false,
            quantity: 0,
        }
    }

    pub fn to_pattern(&self) -> Result<PatternModule, TijError> {
        Ok(PatternModule::qr(&self.content, self.size, self.level)?
            .at(self.x, self.y)
            .rotation(Rotation::from_degrees(self.rotation))
            .inverse(self.inverse))
    }

    pub fn to_info_file(&self) -> Result<InfoFile, TijError> {
        Ok(InfoFile::new(QR_INFO_NAME).with_module(self.to_pattern()?))
    }
}

/// Outcome of a raw command, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugResult {
    pub command_id: u8,
    pub command_name: String,
    pub success: bool,
    pub status_code: u8,
    pub status_text: String,
    pub data_hex: String,
}

/// Parse a hex parameter string; spaces, colons and a `0x` prefix are ignored.
pub fn parse_hex_params(params: &str) -> Result<Vec<u8>, TijError> {
    let cleaned: String = params
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(&cleaned)
        .map_err(|e| TijError::Validation(format!("invalid hex parameters '{}': {}", params, e)))
}

/// A TIJ printer reached through one session.
pub struct Printer {
    session: ProtocolSession,
    temperature_source: PathBuf,
}

impl Printer {
    pub fn new(session: ProtocolSession) -> Self {
        Self {
            session,
            temperature_source: PathBuf::from(thermal::DEFAULT_THERMAL_ZONE),
        }
    }

    /// Read the host CPU temperature from `path` instead of thermal zone 0.
    pub fn with_temperature_source(mut self, path: impl AsRef<Path>) -> Self {
        self.temperature_source = path.as_ref().to_path_buf();
        self
    }

    pub fn session(&self) -> &ProtocolSession {
        &self.session
    }

    pub async fn connect(&self, config: ConnectionConfig) -> Result<(), TijError> {
        self.session.connect(config).await
    }

    pub async fn disconnect(&self) {
        self.session.disconnect().await
    }

    /// Poll cartridge level and alarms.
    ///
    /// Never fails: a query error is reported in `error`, and a lost
    /// connection shows up as `connected: false`. No I/O happens while
    /// disconnected.
    pub async fn status(&self) -> PrinterStatus {
        let mut status = PrinterStatus {
            connected: self.session.is_connected(),
            cartridge_level: None,
            printing: self.session.is_printing(),
            alarm: None,
            cpu_temperature: thermal::read_cpu_temperature(&self.temperature_source),
            error: None,
        };
        if !status.connected {
            return status;
        }

        let queried = async {
            let cartridge = self.session.run(CommandId::GetCartridgeLevel, &[]).await?;
            status.cartridge_level = cartridge.data.first().copied();
            let alarm = self.session.run(CommandId::GetAlarmStatus, &[]).await?;
            status.alarm = Some(hex::encode_upper(&alarm.data));
            Ok::<(), TijError>(())
        }
        .await;

        if let Err(e) = queried {
            debug!(error = %e, "status query failed");
            status.error = Some(e.to_string());
        }
        status.connected = self.session.is_connected();
        status.printing = self.session.is_printing();
        status
    }

    pub async fn start(&self) -> Result<(), TijError> {
        self.session.start().await.map(|_| ())
    }

    pub async fn stop(&self) -> Result<(), TijError> {
        self.session.stop().await.map(|_| ())
    }

    pub async fn trigger(&self) -> Result<(), TijError> {
        self.session.trigger_print().await.map(|_| ())
    }

    pub async fn print_text(&self, request: &TextRequest) -> Result<(), TijError> {
        let info = request.to_info_file()?;
        self.print(&info, request.quantity).await
    }

    pub async fn print_qr(&self, request: &QrRequest) -> Result<(), TijError> {
        let info = request.to_info_file()?;
        self.print(&info, request.quantity).await
    }

    async fn print(&self, info: &InfoFile, quantity: u16) -> Result<(), TijError> {
        self.session.send_information_file(info).await?;
        for copy in 0..quantity {
            if copy > 0 {
                tokio::time::sleep(TRIGGER_INTERVAL).await;
            }
            self.session.trigger_print().await?;
        }
        info!(name = %info.name, quantity, "print job sent");
        Ok(())
    }

    /// Send any command with hex parameters and report the raw outcome.
    ///
    /// A non-zero status is not an error here; transport and framing
    /// failures are.
    pub async fn run_debug_command(&self, command: u8, params: &str) -> Result<DebugResult, TijError> {
        let payload = parse_hex_params(params)?;
        let response = self.session.execute(command, &payload).await?;
        let outcome = response.outcome();
        Ok(DebugResult {
            command_id: command,
            command_name: commands::name_of(command),
            success: response.success(),
            status_code: response.status_code,
            status_text: outcome.description,
            data_hex: hex::encode_upper(&response.data),
        })
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.session.log().all()
    }

    pub fn clear_logs(&self) {
        self.session.log().clear()
    }
}

// ============================================================================
// TESTS
// ============================================================================
