//! Session behaviour against an in-memory printer.
//!
//! The connector hands the session one end of a `tokio::io::duplex` pipe
//! and passes the other end to the test, which plays the printer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

use tijprint::{
    ConnectionConfig, Printer, ProtocolSession, TijError,
    content::{InfoFile, TextModule},
    printer::{QrRequest, TextRequest},
    protocol::{checksum, frame},
    session::{Direction, SessionState, SessionTimeouts},
    transport::{Connector, Transport, TransportConfig},
};

const MACHINE: u8 = 0x77;

// ============================================================================
// HARNESS
// ============================================================================

struct PipeConnector {
    devices: mpsc::UnboundedSender<DuplexStream>,
}

#[async_trait]
impl Connector for PipeConnector {
    async fn open(&self, _config: &TransportConfig) -> Result<Box<dyn Transport>, TijError> {
        let (client, device) = tokio::io::duplex(64 * 1024);
        self.devices
            .send(device)
            .map_err(|_| TijError::TransportUnavailable("test printer gone".to_string()))?;
        Ok(Box::new(client))
    }
}

struct RefusingConnector;

#[async_trait]
impl Connector for RefusingConnector {
    async fn open(&self, _config: &TransportConfig) -> Result<Box<dyn Transport>, TijError> {
        Err(TijError::TransportUnavailable("connection refused".to_string()))
    }
}

struct HangingConnector;

#[async_trait]
impl Connector for HangingConnector {
    async fn open(&self, _config: &TransportConfig) -> Result<Box<dyn Transport>, TijError> {
        std::future::pending().await
    }
}

fn short_timeouts() -> SessionTimeouts {
    SessionTimeouts {
        command: Duration::from_millis(200),
        upload: Duration::from_millis(400),
        connect: Duration::from_millis(200),
    }
}

fn config() -> ConnectionConfig {
    ConnectionConfig::tcp("printer.test", 9100).with_machine_number(MACHINE)
}

fn pipe_session() -> (ProtocolSession, mpsc::UnboundedReceiver<DuplexStream>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let session = ProtocolSession::with_connector(Arc::new(PipeConnector { devices: tx }))
        .with_timeouts(short_timeouts());
    (session, rx)
}

async fn connected() -> (Arc<ProtocolSession>, DuplexStream) {
    let (session, mut devices) = pipe_session();
    session.connect(config()).await.unwrap();
    let device = devices.recv().await.unwrap();
    (Arc::new(session), device)
}

/// Read one complete request frame from the printer side.
async fn read_request(device: &mut DuplexStream) -> Vec<u8> {
    let mut frame = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        device.read_exact(&mut byte).await.unwrap();
        frame.push(byte[0]);
        let n = frame.len();
        if n >= 7 && frame[n - 3..n - 1] == frame::FOOTER && checksum::verify(&frame) {
            return frame;
        }
    }
}

async fn reply(device: &mut DuplexStream, command: u8, status: u8, data: &[u8]) {
    let response = frame::build_response(MACHINE, status, command, data, true);
    device.write_all(&response).await.unwrap();
}

/// Answer `count` requests with success, echoing their command ids.
async fn answer(device: &mut DuplexStream, count: usize) -> Vec<Vec<u8>> {
    let mut requests = Vec::new();
    for _ in 0..count {
        let request = read_request(device).await;
        reply(device, request[3], 0x00, &[]).await;
        requests.push(request);
    }
    requests
}

// ============================================================================
// REQUEST / RESPONSE
// ============================================================================

#[tokio::test]
async fn test_start_printing_round_trip() {
    let (session, mut device) = connected().await;

    let printer = tokio::spawn(async move {
        let request = read_request(&mut device).await;
        assert_eq!(request, vec![0x1B, 0x02, 0x77, 0x11, 0x1B, 0x03, 0x3D]);
        reply(&mut device, 0x11, 0x00, &[]).await;
        device
    });

    let response = session.start().await.unwrap();
    assert_eq!(response.machine_number, MACHINE);
    assert_eq!(response.command_id, 0x11);
    assert!(response.success());
    assert!(session.is_printing());
    assert_eq!(session.state(), SessionState::Idle);

    let log = session.log().all();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].direction, Direction::Receive);
    assert_eq!(log[0].status_text.as_deref(), Some("success"));
    assert_eq!(log[1].direction, Direction::Send);
    assert_eq!(log[1].raw_frame_hex, "1B0277111B033D");
    assert_eq!(log[1].command_name, "Start Printing");

    printer.await.unwrap();
}

#[tokio::test]
async fn test_response_split_across_reads() {
    let (session, mut device) = connected().await;

    let printer = tokio::spawn(async move {
        read_request(&mut device).await;
        let response = frame::build_response(MACHINE, 0x00, 0x26, &[0x42], true);
        for byte in response {
            device.write_all(&[byte]).await.unwrap();
            tokio::task::yield_now().await;
        }
        device
    });

    let response = session.execute(0x26, &[]).await.unwrap();
    assert_eq!(response.data.as_ref(), &[0x42]);
    printer.await.unwrap();
}

#[tokio::test]
async fn test_second_command_is_busy() {
    let (session, mut device) = connected().await;

    let first = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.execute(0x26, &[]).await }
    });

    read_request(&mut device).await;
    assert_eq!(session.state(), SessionState::AwaitingResponse);
    assert!(matches!(session.execute(0x14, &[]).await, Err(TijError::Busy)));

    reply(&mut device, 0x26, 0x00, &[0x50]).await;
    let response = first.await.unwrap().unwrap();
    assert_eq!(response.command_id, 0x26);
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_timeout_keeps_session_idle() {
    let (session, mut device) = connected().await;

    let printer = tokio::spawn(async move {
        // Swallow the first request, answer the second
        read_request(&mut device).await;
        answer(&mut device, 1).await;
        device
    });

    match session.execute(0x26, &[]).await {
        Err(TijError::Timeout { command, after }) => {
            assert_eq!(command, 0x26);
            assert_eq!(after, Duration::from_millis(200));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.is_connected());

    let log = session.log().all();
    assert_eq!(log[0].direction, Direction::Receive);
    assert!(log[0].raw_frame_hex.is_empty());
    assert!(log[0].status_text.as_deref().unwrap().starts_with("timeout"));

    // The session is still usable
    let response = session.execute(0x14, &[]).await.unwrap();
    assert_eq!(response.command_id, 0x14);
    printer.await.unwrap();
}

#[tokio::test]
async fn test_late_response_is_discarded() {
    let (session, mut device) = connected().await;

    read_request_after(&session, &mut device, 0x26).await;

    // The answer to 0x26 turns up after its deadline
    reply(&mut device, 0x26, 0x00, &[0x64]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let printer = tokio::spawn(async move {
        let request = read_request(&mut device).await;
        assert_eq!(request[3], 0x14);
        reply(&mut device, 0x14, 0x00, &[0x00]).await;
        device
    });

    let response = session.execute(0x14, &[]).await.unwrap();
    assert_eq!(response.command_id, 0x14);

    let log = session.log().all();
    assert!(
        log.iter()
            .any(|e| e.command_id == 0x26 && e.status_text.as_deref() == Some("stale response discarded"))
    );
    printer.await.unwrap();
}

/// Send `command`, let it time out, and leave the request consumed.
async fn read_request_after(session: &ProtocolSession, device: &mut DuplexStream, command: u8) {
    let (result, request) = tokio::join!(session.execute(command, &[]), read_request(device));
    assert_eq!(request[3], command);
    assert!(matches!(result, Err(TijError::Timeout { .. })));
}

#[tokio::test]
async fn test_upload_uses_long_deadline() {
    let (session, mut device) = connected().await;

    let printer = tokio::spawn(async move {
        read_request(&mut device).await;
        // Longer than a plain command may wait, shorter than an upload
        tokio::time::sleep(Duration::from_millis(300)).await;
        reply(&mut device, 0x1C, 0x00, &[]).await;
        device
    });

    let response = session.execute(0x1C, &[0x00, 0x00, 0x01, 0x00]).await.unwrap();
    assert_eq!(response.command_id, 0x1C);
    printer.await.unwrap();
}

#[tokio::test]
async fn test_command_mismatch() {
    let (session, mut device) = connected().await;

    let printer = tokio::spawn(async move {
        read_request(&mut device).await;
        reply(&mut device, 0x12, 0x00, &[]).await;
        device
    });

    assert!(matches!(
        session.execute(0x11, &[]).await,
        Err(TijError::CommandMismatch {
            expected: 0x11,
            actual: 0x12
        })
    ));
    assert_eq!(session.state(), SessionState::Idle);
    printer.await.unwrap();
}

#[tokio::test]
async fn test_device_error_is_not_fatal() {
    let (session, mut device) = connected().await;

    let printer = tokio::spawn(async move {
        read_request(&mut device).await;
        reply(&mut device, 0x12, 18, &[]).await;
        device
    });

    match session.stop().await {
        Err(e @ TijError::DeviceError { .. }) => {
            assert!(!e.is_fatal());
            assert_eq!(e.to_string(), "Device error 0x12: print not started");
        }
        other => panic!("expected device error, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(
        session.log().all()[0].status_text.as_deref(),
        Some("print not started")
    );
    printer.await.unwrap();
}

#[tokio::test]
async fn test_bad_checksum_is_malformed() {
    let (session, mut device) = connected().await;

    let printer = tokio::spawn(async move {
        read_request(&mut device).await;
        let mut response = frame::build_response(MACHINE, 0x00, 0x26, &[0x10], true);
        let last = response.len() - 1;
        response[last] = response[last].wrapping_add(1);
        device.write_all(&response).await.unwrap();
        device
    });

    assert!(matches!(
        session.execute(0x26, &[]).await,
        Err(TijError::MalformedFrame(_))
    ));
    assert_eq!(session.state(), SessionState::Idle);
    printer.await.unwrap();
}

// ============================================================================
// CONNECTION LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_close_while_waiting() {
    let (session, mut device) = connected().await;

    let printer = tokio::spawn(async move {
        read_request(&mut device).await;
        drop(device);
    });

    match session.execute(0x26, &[]).await {
        Err(e @ TijError::ConnectionLost(_)) => assert!(e.is_fatal()),
        other => panic!("expected connection lost, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(matches!(
        session.execute(0x26, &[]).await,
        Err(TijError::TransportUnavailable(_))
    ));
    printer.await.unwrap();
}

async fn response_then_close() {
    for _ in 0..50 {
        let (session, mut device) = connected().await;

        let printer = tokio::spawn(async move {
            read_request(&mut device).await;
            reply(&mut device, 0x13, 0x00, &[]).await;
            drop(device);
        });

        // The answer precedes the close on the wire, so the command succeeded
        let response = session.execute(0x13, &[]).await.unwrap();
        assert_eq!(response.command_id, 0x13);
        printer.await.unwrap();

        let log = session.log().all();
        assert_eq!(log[0].direction, Direction::Receive);
        assert_eq!(log[0].status_text.as_deref(), Some("success"));
    }
}

#[tokio::test]
async fn test_response_before_close_is_delivered() {
    response_then_close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_response_before_close_is_delivered_multi_thread() {
    response_then_close().await;
}

#[tokio::test]
async fn test_disconnect_cancels_pending_command() {
    let (session, mut device) = connected().await;

    let pending = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.execute(0x26, &[]).await }
    });

    read_request(&mut device).await;
    session.disconnect().await;

    assert!(matches!(
        pending.await.unwrap(),
        Err(TijError::ConnectionLost(_))
    ));
    assert_eq!(session.state(), SessionState::Disconnected);

    // The printer side sees the connection close
    let mut buf = [0u8; 1];
    assert_eq!(device.read(&mut buf).await.unwrap(), 0);

    session.disconnect().await;
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_remote_close_while_idle() {
    let (session, mut device) = connected().await;

    let (started, _) = tokio::join!(session.start(), answer(&mut device, 1));
    started.unwrap();
    assert!(session.is_printing());
    drop(device);

    for _ in 0..50 {
        if session.state() == SessionState::Disconnected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(!session.is_printing());
}

#[tokio::test]
async fn test_reconnect_replaces_link() {
    let (session, mut devices) = pipe_session();

    session.connect(config()).await.unwrap();
    let mut first = devices.recv().await.unwrap();

    session.connect(config()).await.unwrap();
    let mut second = devices.recv().await.unwrap();

    let mut buf = [0u8; 1];
    assert_eq!(first.read(&mut buf).await.unwrap(), 0);

    let printer = tokio::spawn(async move {
        answer(&mut second, 1).await;
        second
    });
    session.handshake().await.unwrap();
    printer.await.unwrap();
}

#[tokio::test]
async fn test_connect_refused() {
    let session = ProtocolSession::with_connector(Arc::new(RefusingConnector));
    assert!(matches!(
        session.connect(config()).await,
        Err(TijError::TransportUnavailable(_))
    ));
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_connect_timeout() {
    let session =
        ProtocolSession::with_connector(Arc::new(HangingConnector)).with_timeouts(short_timeouts());
    let started = tokio::time::Instant::now();
    assert!(matches!(
        session.connect(config()).await,
        Err(TijError::TransportUnavailable(_))
    ));
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(session.state(), SessionState::Disconnected);
}

// ============================================================================
// CONTENT UPLOAD
// ============================================================================

#[tokio::test]
async fn test_send_information_file_then_commit() {
    let (session, mut device) = connected().await;
    let info = InfoFile::new("Text").with_module(TextModule::new("Hi").unwrap());
    let expected_payload = info.encode().unwrap();

    let printer = tokio::spawn(async move { answer(&mut device, 2).await });

    session.send_information_file(&info).await.unwrap();

    let requests = printer.await.unwrap();
    assert_eq!(requests[0][3], 0x1C);
    assert_eq!(&requests[0][4..requests[0].len() - 3], expected_payload.as_slice());
    assert_eq!(requests[1], frame::build_request(MACHINE, 0x01, &[]));
}

// ============================================================================
// PRINTER FACADE
// ============================================================================

async fn connected_printer() -> (Printer, DuplexStream) {
    let (session, mut devices) = pipe_session();
    let printer = Printer::new(session).with_temperature_source("/nonexistent/thermal/temp");
    printer.connect(config()).await.unwrap();
    let device = devices.recv().await.unwrap();
    (printer, device)
}

#[tokio::test]
async fn test_printer_status() {
    let (printer, mut device) = connected_printer().await;

    let device_task = tokio::spawn(async move {
        let request = read_request(&mut device).await;
        assert_eq!(request[3], 0x26);
        reply(&mut device, 0x26, 0x00, &[80]).await;
        let request = read_request(&mut device).await;
        assert_eq!(request[3], 0x14);
        reply(&mut device, 0x14, 0x00, &[0x00, 0x01]).await;
        device
    });

    let status = printer.status().await;
    assert!(status.connected);
    assert_eq!(status.cartridge_level, Some(80));
    assert_eq!(status.alarm.as_deref(), Some("0001"));
    assert_eq!(status.cpu_temperature, None);
    assert!(status.error.is_none());
    device_task.await.unwrap();
}

#[tokio::test]
async fn test_debug_command_reports_status() {
    let (printer, mut device) = connected_printer().await;

    let device_task = tokio::spawn(async move {
        let request = read_request(&mut device).await;
        assert_eq!(&request[3..6], &[0x33, 0xAB, 0xCD]);
        reply(&mut device, 0x33, 67, &[0x10]).await;
        device
    });

    let result = printer.run_debug_command(0x33, "AB CD").await.unwrap();
    assert!(!result.success);
    assert_eq!(result.status_code, 67);
    assert_eq!(result.status_text, "buffer still full");
    assert_eq!(result.data_hex, "10");
    assert_eq!(result.command_name, "Get Remote Field Buffer Count");
    device_task.await.unwrap();
}

#[tokio::test]
async fn test_print_qr_with_copies() {
    let (printer, mut device) = connected_printer().await;
    let mut request = QrRequest::new("https://example.com/lot/42");
    request.quantity = 2;

    let device_task = tokio::spawn(async move { answer(&mut device, 4).await });

    printer.print_qr(&request).await.unwrap();

    let commands: Vec<u8> = device_task.await.unwrap().iter().map(|r| r[3]).collect();
    assert_eq!(commands, vec![0x1C, 0x01, 0x13, 0x13]);
}

#[tokio::test]
async fn test_print_text_rejects_empty_before_sending() {
    let (printer, _device) = connected_printer().await;
    assert!(matches!(
        printer.print_text(&TextRequest::new("")).await,
        Err(TijError::Validation(_))
    ));
    assert!(printer.logs().is_empty());
}
