// crates/geofeed-core/src/runtime/log.rs
// ============================================================================
// Module: Geofeed Structured Logging
// Description: Structured log events and pluggable JSON-lines sinks.
// Purpose: Emit relay and producer events without a hard logging backend.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Components record [`LogEvent`] values through a shared [`LogSink`].
//! Sinks serialize each event as one JSON line. Sink failures are swallowed:
//! logging never changes the outcome of the operation being logged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Verbose diagnostics.
    Debug,
    /// Normal lifecycle events.
    Info,
    /// Recoverable problems.
    Warn,
    /// Failures that ended an operation.
    Error,
}

/// Structured log event payload.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Severity.
    pub level: LogLevel,
    /// Subscriber session identifier when the event is session-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Human-readable summary.
    pub message: String,
    /// Additional structured fields.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

impl LogEvent {
    /// Creates a new event with a consistent timestamp.
    #[must_use]
    pub fn new(event: &'static str, level: LogLevel, message: impl Into<String>) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event,
            timestamp_ms,
            level,
            session_id: None,
            message: message.into(),
            fields: Map::new(),
        }
    }

    /// Attaches a session identifier.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Attaches a structured field.
    #[must_use]
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Sink for structured log events.
pub trait LogSink: Send + Sync {
    /// Record a log event.
    fn record(&self, event: &LogEvent);
}

/// Shared log sink handle.
pub type SharedLogSink = Arc<dyn LogSink>;

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Sink that writes JSON lines to stderr.
pub struct StderrLogSink;

impl LogSink for StderrLogSink {
    fn record(&self, event: &LogEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Sink that appends JSON lines to a file.
pub struct FileLogSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileLogSink {
    /// Opens the log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl LogSink for FileLogSink {
    fn record(&self, event: &LogEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// Sink that discards all events.
pub struct NoopLogSink;

impl LogSink for NoopLogSink {
    fn record(&self, _event: &LogEvent) {}
}

/// Sink that keeps events in memory for inspection.
#[derive(Default)]
pub struct MemoryLogSink {
    /// Recorded events in arrival order.
    events: Mutex<Vec<LogEvent>>,
}

impl MemoryLogSink {
    /// Returns a copy of all recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Returns the number of recorded events with the given identifier.
    #[must_use]
    pub fn count(&self, event: &str) -> usize {
        self.events
            .lock()
            .map(|events| events.iter().filter(|entry| entry.event == event).count())
            .unwrap_or_default()
    }
}

impl LogSink for MemoryLogSink {
    fn record(&self, event: &LogEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
