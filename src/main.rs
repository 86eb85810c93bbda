//! # tijprint CLI
//!
//! Command-line interface for TIJ marking printers.
//!
//! ## Usage
//!
//! ```bash
//! # List known command ids
//! tijprint commands
//!
//! # Poll cartridge level and alarms
//! tijprint --host 192.168.1.100 status
//!
//! # Load a QR code and print 3 copies
//! tijprint qr --quantity 3 "https://example.com/lot/42"
//!
//! # Preview the QR bitmap without a printer
//! tijprint qr --size 4 --png qr.png "https://example.com/lot/42"
//!
//! # Raw command over serial, then dump the exchange log as JSON
//! tijprint --serial /dev/ttyUSB0 --baud 115200 --log --json debug 0x26
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use tijprint::{
    ConnectionConfig, Printer, ProtocolSession, TijError,
    content::{PatternModule, raster_to_image},
    printer::{QrRequest, TextRequest},
    protocol::commands::CommandId,
    session::SessionTimeouts,
    transport::{self, TransportConfig},
};

/// tijprint - TIJ marking printer utility
#[derive(Parser, Debug)]
#[command(name = "tijprint")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// More diagnostics (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Print the communication log after the command
    #[arg(long, global = true)]
    log: bool,

    /// JSON output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct ConnectionArgs {
    /// Printer host
    #[arg(long, global = true, default_value = transport::DEFAULT_HOST)]
    host: String,

    /// Printer TCP port
    #[arg(long, global = true, default_value_t = transport::DEFAULT_PORT)]
    port: u16,

    /// Serial device; takes precedence over --host
    #[arg(long, global = true, value_name = "DEVICE")]
    serial: Option<String>,

    /// Serial baud rate
    #[arg(long, global = true, default_value_t = transport::DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Machine number placed in every frame
    #[arg(long, global = true, default_value_t = 0)]
    machine: u8,

    /// Response timeout for plain commands, in seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<f64>,

    /// JSON connection config file; replaces the flags above
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List known command ids
    Commands,

    /// Show connection, cartridge level, alarms and CPU temperature
    Status,

    /// Send a handshake
    Handshake,

    /// Start the print engine
    Start,

    /// Stop the print engine
    Stop,

    /// Fire one print
    Trigger,

    /// Load a line of text as the current message
    Text {
        content: String,

        /// Font size in points
        #[arg(long, default_value_t = 24)]
        size: u16,

        #[arg(long, default_value_t = 0)]
        x: u16,

        #[arg(long, default_value_t = 0)]
        y: u16,

        /// Rotation in degrees
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        rotation: i32,

        /// Prints to trigger after loading
        #[arg(long, default_value_t = 0)]
        quantity: u16,
    },

    /// Load a QR code as the current message
    Qr {
        content: String,

        /// Dots per QR module
        #[arg(long, default_value_t = 3)]
        size: u8,

        #[arg(long, default_value_t = 0)]
        x: u16,

        #[arg(long, default_value_t = 0)]
        y: u16,

        /// Rotation in degrees, snapped to a quarter turn
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        rotation: i32,

        /// Error correction level (L, M, Q, H)
        #[arg(long, default_value = "M")]
        level: tijprint::content::QrErrorLevel,

        /// Swap dark and light
        #[arg(long)]
        inverse: bool,

        /// Prints to trigger after loading
        #[arg(long, default_value_t = 0)]
        quantity: u16,

        /// Write the bitmap to a PNG file instead of printing
        #[arg(long, value_name = "FILE")]
        png: Option<PathBuf>,
    },

    /// Send a raw command and show the response
    Debug {
        /// Command id in hex (e.g. 0x26)
        #[arg(value_parser = parse_command_id)]
        command: u8,

        /// Parameters in hex (e.g. "01 02")
        #[arg(default_value = "")]
        params: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "tijprint=debug,info",
        _ => "tijprint=trace,debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<(), TijError> {
    // Offline commands
    match &cli.command {
        Commands::Commands => {
            list_commands(cli.json)?;
            return Ok(());
        }
        Commands::Qr {
            content,
            size,
            level,
            png: Some(png_path),
            ..
        } => {
            let pattern = PatternModule::qr(content, *size, *level)?;
            save_png(png_path, &pattern)?;
            println!(
                "Saved {}x{} QR bitmap to {}",
                pattern.width,
                pattern.height,
                png_path.display()
            );
            return Ok(());
        }
        _ => {}
    }

    let config = connection_config(&cli.connection)?;
    let session = ProtocolSession::new().with_timeouts(timeouts(&cli.connection)?);
    let printer = Printer::new(session);

    printer.connect(config).await?;
    let result = execute(&printer, &cli).await;

    if cli.log {
        print_logs(&printer, cli.json)?;
    }
    printer.disconnect().await;
    result
}

async fn execute(printer: &Printer, cli: &Cli) -> Result<(), TijError> {
    match &cli.command {
        Commands::Status => {
            let status = printer.status().await;
            if cli.json {
                print_json(&status)?;
            } else {
                println!("Connected:       {}", status.connected);
                println!("Printing:        {}", status.printing);
                println!("Cartridge level: {}", display_or_dash(status.cartridge_level.map(|l| format!("{}%", l))));
                println!("Alarm:           {}", display_or_dash(status.alarm.clone()));
                println!("CPU temperature: {}", display_or_dash(status.cpu_temperature.map(|t| format!("{:.1} °C", t))));
                if let Some(error) = &status.error {
                    println!("Error:           {}", error);
                }
            }
        }
        Commands::Handshake => {
            printer.session().handshake().await?;
            println!("Handshake OK");
        }
        Commands::Start => {
            printer.start().await?;
            println!("Printing started");
        }
        Commands::Stop => {
            printer.stop().await?;
            println!("Printing stopped");
        }
        Commands::Trigger => {
            printer.trigger().await?;
            println!("Print triggered");
        }
        Commands::Text {
            content,
            size,
            x,
            y,
            rotation,
            quantity,
        } => {
            let request = TextRequest {
                text: content.clone(),
                font_size: *size,
                x: *x,
                y: *y,
                rotation: *rotation,
                quantity: *quantity,
            };
            printer.print_text(&request).await?;
            println!("Text loaded ({} prints triggered)", quantity);
        }
        Commands::Qr {
            content,
            size,
            x,
            y,
            rotation,
            level,
            inverse,
            quantity,
            png: _,
        } => {
            let request = QrRequest {
                content: content.clone(),
                size: *size,
                x: *x,
                y: *y,
                rotation: *rotation,
                level: *level,
                inverse: *inverse,
                quantity: *quantity,
            };
            printer.print_qr(&request).await?;
            println!("QR code loaded ({} prints triggered)", quantity);
        }
        Commands::Debug { command, params } => {
            let result = printer.run_debug_command(*command, params).await?;
            if cli.json {
                print_json(&result)?;
            } else {
                println!("Command: 0x{:02X} {}", result.command_id, result.command_name);
                println!("Status:  {} ({})", result.status_code, result.status_text);
                println!("Data:    {}", display_or_dash(Some(result.data_hex.clone()).filter(|d| !d.is_empty())));
            }
        }
        Commands::Commands => {}
    }
    Ok(())
}

fn connection_config(args: &ConnectionArgs) -> Result<ConnectionConfig, TijError> {
    if let Some(path) = &args.config {
        let raw = std::fs::read_to_string(path)?;
        return serde_json::from_str(&raw).map_err(|e| {
            TijError::Validation(format!("invalid config {}: {}", path.display(), e))
        });
    }

    let transport = match &args.serial {
        Some(path) => TransportConfig::Serial {
            path: path.clone(),
            baud_rate: args.baud,
        },
        None => TransportConfig::Tcp {
            host: args.host.clone(),
            port: args.port,
        },
    };
    Ok(ConnectionConfig {
        transport,
        machine_number: args.machine,
    })
}

fn timeouts(args: &ConnectionArgs) -> Result<SessionTimeouts, TijError> {
    let mut timeouts = SessionTimeouts::default();
    if let Some(secs) = args.timeout {
        let command = Duration::try_from_secs_f64(secs)
            .map_err(|e| TijError::Validation(format!("invalid timeout {}: {}", secs, e)))?;
        timeouts.command = command;
        timeouts.upload = timeouts.upload.max(command);
    }
    Ok(timeouts)
}

fn parse_command_id(s: &str) -> Result<u8, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(digits, 16).map_err(|e| format!("'{}' is not a hex command id: {}", s, e))
}

fn list_commands(json: bool) -> Result<(), TijError> {
    #[derive(Serialize)]
    struct Entry {
        id: u8,
        name: String,
    }

    let entries: Vec<Entry> = CommandId::ALL
        .iter()
        .map(|c| Entry {
            id: c.id(),
            name: c.name(),
        })
        .collect();

    if json {
        return print_json(&entries);
    }
    println!("Known commands:");
    for entry in entries {
        println!("  0x{:02X}  {}", entry.id, entry.name);
    }
    Ok(())
}

fn print_logs(printer: &Printer, json: bool) -> Result<(), TijError> {
    let logs = printer.logs();
    if json {
        return print_json(&logs);
    }
    println!("\nCommunication log (newest first):");
    for entry in logs {
        println!(
            "  {} {:<7} {:<24} {} {}",
            entry.timestamp.format("%H:%M:%S%.3f"),
            format!("{:?}", entry.direction),
            entry.command_name,
            display_or_dash(Some(entry.raw_frame_hex).filter(|f| !f.is_empty())),
            entry.status_text.unwrap_or_default()
        );
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), TijError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| TijError::Validation(format!("JSON encoding failed: {}", e)))?;
    println!("{}", text);
    Ok(())
}

fn display_or_dash(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".to_string())
}

/// Save a pattern bitmap as a PNG image
fn save_png(path: &Path, pattern: &PatternModule) -> Result<(), TijError> {
    let img = raster_to_image(pattern.width, pattern.height, &pattern.bitmap)?;
    img.save(path)
        .map_err(|e| TijError::Image(format!("Failed to save PNG: {}", e)))?;
    Ok(())
}
