//! # Communication Log
//!
//! Bounded record of every frame exchanged with the printer, newest first.
//! Entries serialize to JSON for dashboards and the CLI `--log` flag.
//!
//! The log keeps the 50 most recent entries. It lives as long as the session
//! that owns it and is never persisted.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Local};
use serde::Serialize;
use uuid::Uuid;

use crate::protocol::commands;

/// Entries kept before the oldest is dropped
pub const LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Send,
    Receive,
}

/// One logged exchange step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Local>,
    pub direction: Direction,
    pub command_id: u8,
    pub command_name: String,
    /// Payload (send) or response data (receive), upper-case hex
    pub data_hex: String,
    /// Complete frame, upper-case hex; empty when no frame was received
    pub raw_frame_hex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_fields: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
}

impl LogEntry {
    fn new(direction: Direction, command_id: u8, data: &[u8], frame: &[u8]) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Local::now(),
            direction,
            command_id,
            command_name: commands::name_of(command_id),
            data_hex: hex::encode_upper(data),
            raw_frame_hex: hex::encode_upper(frame),
            parsed_fields: None,
            status_text: None,
        }
    }

    /// A request written to the printer.
    pub fn send(command_id: u8, payload: &[u8], frame: &[u8]) -> Self {
        Self::new(Direction::Send, command_id, payload, frame)
    }

    /// A response, or a synthetic entry for a failed wait (empty frame).
    pub fn receive(command_id: u8, data: &[u8], frame: &[u8]) -> Self {
        Self::new(Direction::Receive, command_id, data, frame)
    }

    pub fn with_status(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = Some(status_text.into());
        self
    }

    pub fn with_fields(mut self, fields: serde_json::Value) -> Self {
        self.parsed_fields = Some(fields);
        self
    }
}

/// Thread-safe, fixed-capacity, most-recent-first log.
#[derive(Debug)]
pub struct CommunicationLog {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

impl Default for CommunicationLog {
    fn default() -> Self {
        Self::new()
    }
}

impl CommunicationLog {
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Insert at the front, dropping the oldest entry when full.
    pub fn append(&self, entry: LogEntry) {
        let mut entries = self.lock();
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }

    /// Snapshot, newest first.
    pub fn all(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    // A panic while appending can't leave the deque half-updated
    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ============================================================================
// TESTS
// ============================================================================
