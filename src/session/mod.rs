//! # Protocol Session
//!
//! Owns the connection to one printer and runs the request/response cycle:
//! at most one command is in flight, every response is matched to the
//! request that caused it, and every wait is bounded by a deadline.
//!
//! ## States
//!
//! ```text
//!              connect()              open ok
//! Disconnected ─────────► Connecting ─────────► Idle ◄──────────┐
//!      ▲                      │                  │ execute()    │ response, timeout,
//!      │        open failed   │                  ▼              │ malformed frame
//!      ├──────────────────────┘          AwaitingResponse ──────┘
//!      │                                         │
//!      └─────────── close, I/O error, disconnect() ┘
//! ```
//!
//! A background reader task forwards inbound bytes to the session through a
//! bounded queue. A close or read error seen while idle moves the session to
//! `Disconnected`. Bytes that arrived before a close are still decoded, so a
//! response followed by a hang-up completes the command.
//!
//! ## Deadlines
//!
//! | Command | Timeout |
//! |---------|---------|
//! | plain | 5 s |
//! | upload (0x1C, 0x50) | 15 s |
//! | connect | 5 s |
//!
//! Deadlines are absolute from the moment the request is written; incoming
//! bytes never extend them. A timeout leaves the session `Idle`.
//!
//! ## Example
//!
//! ```no_run
//! use tijprint::session::ProtocolSession;
//! use tijprint::transport::ConnectionConfig;
//!
//! # async fn run() -> Result<(), tijprint::error::TijError> {
//! let session = ProtocolSession::new();
//! session.connect(ConnectionConfig::tcp("192.168.1.100", 9100)).await?;
//! session.start().await?;
//! session.trigger_print().await?;
//! # Ok(())
//! # }
//! ```

pub mod log;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::content::InfoFile;
use crate::error::TijError;
use crate::protocol::commands::{self, CommandId};
use crate::protocol::frame::{self, FrameDecoder, FrameEvent, InvalidFrame, ParsedResponse};
use crate::transport::{ConnectionConfig, Connector, SystemConnector, Transport};

pub use log::{CommunicationLog, Direction, LogEntry};

/// Size of a single transport read
const READ_CHUNK: usize = 4096;

/// Chunks the reader task may queue before it stops reading from the
/// transport. Unsolicited data from an idle printer backs up into the OS
/// buffers instead of session memory.
const EVENT_QUEUE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Idle,
    AwaitingResponse,
}

/// Response and connect deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTimeouts {
    pub command: Duration,
    pub upload: Duration,
    pub connect: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            command: Duration::from_secs(5),
            upload: Duration::from_secs(15),
            connect: Duration::from_secs(5),
        }
    }
}

impl SessionTimeouts {
    /// Deadline for a response to `command`.
    pub fn for_command(&self, command: u8) -> Duration {
        if CommandId::from(command).is_upload() {
            self.upload
        } else {
            self.command
        }
    }
}

// ============================================================================
// SHARED STATE
// ============================================================================

#[derive(Debug)]
struct SessionCore {
    state: SessionState,
    config: Option<ConnectionConfig>,
    printing: bool,
}

/// State visible to both the session and its reader task.
///
/// The epoch counts connection lifetimes. It is bumped under the core lock
/// on every connect and every transition to `Disconnected`, so a waiter can
/// tell that the link it started on is gone.
#[derive(Debug)]
struct Shared {
    core: Mutex<SessionCore>,
    epoch: watch::Sender<u64>,
    log: CommunicationLog,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionCore> {
        self.core
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn epoch(&self) -> u64 {
        *self.epoch.borrow()
    }

    /// Must be called with the core lock held.
    fn bump_epoch(&self) -> u64 {
        self.epoch.send_modify(|epoch| *epoch += 1);
        self.epoch()
    }

    /// Move to `Disconnected` if the link from `epoch` is still current.
    fn link_lost(&self, epoch: u64, reason: &str) -> bool {
        let mut core = self.lock();
        if self.epoch() != epoch || core.state == SessionState::Disconnected {
            return false;
        }
        core.state = SessionState::Disconnected;
        core.printing = false;
        self.bump_epoch();
        warn!(reason, "printer connection lost");
        true
    }
}

/// Resets `AwaitingResponse` to `Idle` however the wait ends, including when
/// the caller drops the future.
struct InFlight<'a> {
    shared: &'a Shared,
    epoch: u64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut core = self.shared.lock();
        if self.shared.epoch() == self.epoch && core.state == SessionState::AwaitingResponse {
            core.state = SessionState::Idle;
        }
    }
}

// ============================================================================
// LINK
// ============================================================================

#[derive(Debug)]
enum LinkEvent {
    Data(Bytes),
    Closed,
    Error(String),
}

/// An open transport: write half, inbound events from the reader task,
/// and the decoder state carried between commands.
struct Link {
    writer: WriteHalf<Box<dyn Transport>>,
    events: mpsc::Receiver<LinkEvent>,
    decoder: FrameDecoder,
    reader: JoinHandle<()>,
    epoch: u64,
}

impl Drop for Link {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    mut reader: ReadHalf<Box<dyn Transport>>,
    events: mpsc::Sender<LinkEvent>,
    shared: Arc<Shared>,
    epoch: u64,
) {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                // A full queue drops the marker; waiters still see the epoch change
                let _ = events.try_send(LinkEvent::Closed);
                shared.link_lost(epoch, "connection closed by printer");
                break;
            }
            Ok(n) => {
                debug!(bytes = n, "received chunk");
                let chunk = Bytes::copy_from_slice(&buf[..n]);
                if events.send(LinkEvent::Data(chunk)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                let reason = e.to_string();
                let _ = events.try_send(LinkEvent::Error(reason.clone()));
                shared.link_lost(epoch, &reason);
                break;
            }
        }
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// A connection to one TIJ printer.
///
/// All methods take `&self`; share the session behind an `Arc` to use it
/// from several tasks. Commands are never queued: a second command while
/// one is in flight fails with [`TijError::Busy`].
pub struct ProtocolSession {
    shared: Arc<Shared>,
    link: tokio::sync::Mutex<Option<Link>>,
    connector: Arc<dyn Connector>,
    timeouts: SessionTimeouts,
}

impl Default for ProtocolSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolSession {
    /// A disconnected session using real TCP and serial transports.
    pub fn new() -> Self {
        Self::with_connector(Arc::new(SystemConnector))
    }

    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        let (epoch, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(SessionCore {
                    state: SessionState::Disconnected,
                    config: None,
                    printing: false,
                }),
                epoch,
                log: CommunicationLog::new(),
            }),
            link: tokio::sync::Mutex::new(None),
            connector,
            timeouts: SessionTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: SessionTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            self.state(),
            SessionState::Idle | SessionState::AwaitingResponse
        )
    }

    /// Whether printing was started through this session and not stopped.
    pub fn is_printing(&self) -> bool {
        self.shared.lock().printing
    }

    /// Configuration of the current or most recent connection.
    pub fn config(&self) -> Option<ConnectionConfig> {
        self.shared.lock().config.clone()
    }

    pub fn timeouts(&self) -> SessionTimeouts {
        self.timeouts
    }

    pub fn log(&self) -> &CommunicationLog {
        &self.shared.log
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Open a connection, replacing any existing one.
    ///
    /// Fails with `Busy` while another connect runs or a command is in
    /// flight. On failure the session is left `Disconnected`.
    pub async fn connect(&self, config: ConnectionConfig) -> Result<(), TijError> {
        let epoch = {
            let mut core = self.shared.lock();
            if matches!(
                core.state,
                SessionState::Connecting | SessionState::AwaitingResponse
            ) {
                return Err(TijError::Busy);
            }
            core.state = SessionState::Connecting;
            core.printing = false;
            core.config = Some(config.clone());
            self.shared.bump_epoch()
        };

        // Reconfiguration: the old link goes before the new one opens
        if self.link.lock().await.take().is_some() {
            info!("closed previous connection");
        }

        info!(transport = %config.transport, machine = config.machine_number, "connecting");
        let opened = tokio::time::timeout(
            self.timeouts.connect,
            self.connector.open(&config.transport),
        )
        .await;

        let transport = match opened {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => {
                self.connect_failed(epoch);
                return Err(e);
            }
            Err(_) => {
                self.connect_failed(epoch);
                return Err(TijError::TransportUnavailable(format!(
                    "connecting to {} timed out after {:?}",
                    config.transport, self.timeouts.connect
                )));
            }
        };

        let (reader, writer) = tokio::io::split(transport);
        let (tx, rx) = mpsc::channel(EVENT_QUEUE);
        let reader = tokio::spawn(read_loop(reader, tx, Arc::clone(&self.shared), epoch));
        let link = Link {
            writer,
            events: rx,
            decoder: FrameDecoder::new(),
            reader,
            epoch,
        };

        let mut slot = self.link.lock().await;
        let mut core = self.shared.lock();
        if self.shared.epoch() != epoch || core.state != SessionState::Connecting {
            return Err(TijError::TransportUnavailable(
                "connection attempt was cancelled".to_string(),
            ));
        }
        *slot = Some(link);
        core.state = SessionState::Idle;
        info!(transport = %config.transport, "connected");
        Ok(())
    }

    fn connect_failed(&self, epoch: u64) {
        let mut core = self.shared.lock();
        if self.shared.epoch() == epoch && core.state == SessionState::Connecting {
            core.state = SessionState::Disconnected;
            self.shared.bump_epoch();
        }
    }

    /// Close the connection. Safe to call in any state, any number of times.
    ///
    /// A command awaiting its response fails with `ConnectionLost`.
    pub async fn disconnect(&self) {
        {
            let mut core = self.shared.lock();
            if core.state != SessionState::Disconnected {
                info!("disconnecting");
            }
            core.state = SessionState::Disconnected;
            core.printing = false;
            self.shared.bump_epoch();
        }
        // Waits for a pending command to observe the epoch change and let go
        self.link.lock().await.take();
    }

    // ========================================================================
    // COMMAND EXECUTION
    // ========================================================================

    /// Send one command and wait for its response.
    ///
    /// A response with a non-zero status is still returned as `Ok`; use
    /// [`ParsedResponse::ensure_success`] or the helper methods to turn it
    /// into an error.
    pub async fn execute(&self, command: u8, payload: &[u8]) -> Result<ParsedResponse, TijError> {
        let (machine, epoch, mut epoch_rx) = {
            let mut core = self.shared.lock();
            match core.state {
                SessionState::Disconnected => {
                    return Err(TijError::TransportUnavailable("not connected".to_string()));
                }
                SessionState::Connecting | SessionState::AwaitingResponse => {
                    return Err(TijError::Busy);
                }
                SessionState::Idle => {}
            }
            core.state = SessionState::AwaitingResponse;
            let epoch_rx = self.shared.epoch.subscribe();
            let epoch = *epoch_rx.borrow();
            let machine = core.config.as_ref().map_or(0, |c| c.machine_number);
            (machine, epoch, epoch_rx)
        };
        let _in_flight = InFlight {
            shared: &self.shared,
            epoch,
        };

        let mut slot = self.link.lock().await;
        let result = match slot.as_mut() {
            Some(link) if link.epoch == epoch => {
                self.exchange(link, machine, command, payload, &mut epoch_rx)
                    .await
            }
            _ => Err(TijError::ConnectionLost("connection closed".to_string())),
        };

        if let Err(TijError::ConnectionLost(reason)) = &result {
            self.shared.link_lost(epoch, reason);
            if slot.as_ref().is_some_and(|link| link.epoch == epoch) {
                slot.take();
            }
            self.shared.log.append(
                LogEntry::receive(command, &[], &[]).with_status(format!("connection lost: {}", reason)),
            );
        }

        result
    }

    async fn exchange(
        &self,
        link: &mut Link,
        machine: u8,
        command: u8,
        payload: &[u8],
        epoch_rx: &mut watch::Receiver<u64>,
    ) -> Result<ParsedResponse, TijError> {
        self.drain_stale(link)?;

        let request = frame::build_request(machine, command, payload);
        link.writer
            .write_all(&request)
            .await
            .map_err(|e| TijError::ConnectionLost(format!("write failed: {}", e)))?;
        link.writer
            .flush()
            .await
            .map_err(|e| TijError::ConnectionLost(format!("flush failed: {}", e)))?;

        debug!(command = %commands::name_of(command), frame = %hex::encode_upper(&request), "sent");
        self.shared.log.append(LogEntry::send(command, payload, &request));

        let timeout = self.timeouts.for_command(command);
        let deadline = tokio::time::sleep_until(Instant::now() + timeout);
        tokio::pin!(deadline);

        let mut event = FrameEvent::Incomplete;
        loop {
            match event {
                FrameEvent::Incomplete => {}
                FrameEvent::FrameReady(response) => return self.accept(command, response),
                FrameEvent::Invalid(reason) => {
                    let raw = match &reason {
                        InvalidFrame::BadChecksum { frame, .. } => frame.clone(),
                        InvalidFrame::BadHeader { .. } => Bytes::new(),
                    };
                    warn!(command = %commands::name_of(command), %reason, "malformed response");
                    self.shared.log.append(
                        LogEntry::receive(command, &[], &raw).with_status(format!("malformed frame: {}", reason)),
                    );
                    return Err(TijError::MalformedFrame(reason.to_string()));
                }
            }

            // Inbound events are handled in arrival order, ahead of the
            // deadline and of a connection change they may precede
            tokio::select! {
                biased;

                message = link.events.recv() => match message {
                    Some(LinkEvent::Data(chunk)) => event = link.decoder.feed(&chunk),
                    Some(LinkEvent::Closed) => {
                        return Err(TijError::ConnectionLost("connection closed by printer".to_string()));
                    }
                    Some(LinkEvent::Error(reason)) => return Err(TijError::ConnectionLost(reason)),
                    None => return Err(TijError::ConnectionLost("reader stopped".to_string())),
                },
                _ = &mut deadline => {
                    warn!(command = %commands::name_of(command), ?timeout, "response timed out");
                    self.shared.log.append(
                        LogEntry::receive(command, &[], &[]).with_status(format!("timeout after {:?}", timeout)),
                    );
                    return Err(TijError::Timeout { command, after: timeout });
                }
                _ = epoch_rx.changed() => {
                    if let Some(response) = Self::take_queued_response(link) {
                        return self.accept(command, response);
                    }
                    return Err(TijError::ConnectionLost("disconnected".to_string()));
                }
            }
        }
    }

    /// A complete response already queued when the connection went away.
    fn take_queued_response(link: &mut Link) -> Option<ParsedResponse> {
        let mut event = link.decoder.feed(&[]);
        loop {
            match event {
                FrameEvent::FrameReady(response) => return Some(response),
                FrameEvent::Invalid(_) => event = link.decoder.feed(&[]),
                FrameEvent::Incomplete => match link.events.try_recv() {
                    Ok(LinkEvent::Data(chunk)) => event = link.decoder.feed(&chunk),
                    _ => return None,
                },
            }
        }
    }

    fn accept(&self, command: u8, response: ParsedResponse) -> Result<ParsedResponse, TijError> {
        let outcome = response.outcome();
        let fields = serde_json::json!({
            "machine_number": response.machine_number,
            "status_code": response.status_code,
            "acknowledged": response.acknowledged,
        });

        if response.command_id != command {
            warn!(
                expected = %commands::name_of(command),
                actual = %commands::name_of(response.command_id),
                "response for a different command"
            );
            self.shared.log.append(
                LogEntry::receive(response.command_id, &response.data, &response.frame)
                    .with_fields(fields)
                    .with_status(format!("unexpected response while awaiting 0x{:02X}", command)),
            );
            return Err(TijError::CommandMismatch {
                expected: command,
                actual: response.command_id,
            });
        }

        debug!(
            command = %commands::name_of(command),
            status = outcome.code,
            frame = %hex::encode_upper(&response.frame),
            "received"
        );
        self.shared.log.append(
            LogEntry::receive(command, &response.data, &response.frame)
                .with_fields(fields)
                .with_status(outcome.description),
        );
        Ok(response)
    }

    /// Discard frames that arrived while no command was outstanding.
    fn drain_stale(&self, link: &mut Link) -> Result<(), TijError> {
        self.discard_frames(link, &[]);
        loop {
            match link.events.try_recv() {
                Ok(LinkEvent::Data(chunk)) => self.discard_frames(link, &chunk),
                Ok(LinkEvent::Closed) => {
                    return Err(TijError::ConnectionLost(
                        "connection closed by printer".to_string(),
                    ));
                }
                Ok(LinkEvent::Error(reason)) => return Err(TijError::ConnectionLost(reason)),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    return Err(TijError::ConnectionLost("reader stopped".to_string()));
                }
            }
        }

        if link.decoder.pending() > 0 {
            warn!(bytes = link.decoder.pending(), "dropping partial stale frame");
            link.decoder.clear();
        }
        Ok(())
    }

    fn discard_frames(&self, link: &mut Link, chunk: &[u8]) {
        let mut event = link.decoder.feed(chunk);
        loop {
            match event {
                FrameEvent::Incomplete => return,
                FrameEvent::FrameReady(stale) => {
                    warn!(command = %commands::name_of(stale.command_id), "discarding stale response");
                    self.shared.log.append(
                        LogEntry::receive(stale.command_id, &stale.data, &stale.frame)
                            .with_status("stale response discarded"),
                    );
                }
                FrameEvent::Invalid(reason) => {
                    warn!(%reason, "discarding stale malformed bytes");
                }
            }
            event = link.decoder.feed(&[]);
        }
    }

    // ========================================================================
    // COMMAND HELPERS
    // ========================================================================

    /// Execute and require status 0.
    pub async fn run(&self, command: CommandId, payload: &[u8]) -> Result<ParsedResponse, TijError> {
        self.execute(command.id(), payload).await?.ensure_success()
    }

    pub async fn handshake(&self) -> Result<ParsedResponse, TijError> {
        self.run(CommandId::Handshake, &[]).await
    }

    pub async fn start(&self) -> Result<ParsedResponse, TijError> {
        let response = self.run(CommandId::StartPrinting, &[]).await?;
        self.set_printing(true);
        Ok(response)
    }

    pub async fn stop(&self) -> Result<ParsedResponse, TijError> {
        let response = self.run(CommandId::StopPrinting, &[]).await?;
        self.set_printing(false);
        Ok(response)
    }

    pub async fn trigger_print(&self) -> Result<ParsedResponse, TijError> {
        self.run(CommandId::TriggerPrint, &[]).await
    }

    /// Activate the most recently uploaded information file.
    pub async fn commit(&self) -> Result<ParsedResponse, TijError> {
        self.run(CommandId::SendPrint, &[]).await
    }

    /// Upload an information file (0x1C) and commit it (0x01).
    pub async fn send_information_file(&self, info: &InfoFile) -> Result<ParsedResponse, TijError> {
        let payload = info.encode()?;
        info!(name = %info.name, modules = info.modules.len(), bytes = payload.len(), "uploading information file");
        self.run(CommandId::SendInformationFile, &payload).await?;
        self.commit().await
    }

    fn set_printing(&self, printing: bool) {
        self.shared.lock().printing = printing;
    }
}

// ============================================================================
// TESTS
// ============================================================================
