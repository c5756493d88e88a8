// crates/kv-bridge-core/src/log.rs
// ============================================================================
// Module: Storage Logging
// Description: Structured JSON-lines log events for storage operations.
// Purpose: Emit operational logs without hard dependencies on a pipeline.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Storage components describe what they did with [`StorageLogEvent`] values
//! and hand them to a [`StorageLogSink`]. Sinks serialize events as single
//! JSON lines. Events never carry stored values or key material.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Outcome label for a logged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOutcome {
    /// Operation completed.
    Success,
    /// Operation failed.
    Failure,
    /// Operation was refused by policy.
    Refused,
}

/// Storage log event payload.
#[derive(Debug, Clone, Serialize)]
pub struct StorageLogEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Backend label.
    pub backend: &'static str,
    /// Operation label.
    pub operation: &'static str,
    /// Key, path, or endpoint the operation targeted.
    pub target: Option<String>,
    /// Operation outcome.
    pub outcome: LogOutcome,
    /// Optional detail (error text, identity, fingerprint).
    pub detail: Option<String>,
}

impl StorageLogEvent {
    /// Creates a successful event with the current timestamp.
    #[must_use]
    pub fn new(event: &'static str, backend: &'static str, operation: &'static str) -> Self {
        Self {
            event,
            timestamp_ms: now_ms(),
            backend,
            operation,
            target: None,
            outcome: LogOutcome::Success,
            detail: None,
        }
    }

    /// Sets the operation target.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Sets the outcome.
    #[must_use]
    pub const fn with_outcome(mut self, outcome: LogOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Sets the detail text.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Sink for storage log events.
pub trait StorageLogSink: Send + Sync {
    /// Record a log event.
    fn record(&self, event: &StorageLogEvent);
}

/// Sink that logs JSON lines to stderr.
pub struct StderrLogSink;

impl StorageLogSink for StderrLogSink {
    fn record(&self, event: &StorageLogEvent) {
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

impl StorageLogSink for FileLogSink {
    fn record(&self, event: &StorageLogEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op log sink.
pub struct NoopLogSink;

impl StorageLogSink for NoopLogSink {
    fn record(&self, _event: &StorageLogEvent) {}
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the current time in milliseconds since epoch.
fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|elapsed| elapsed.as_millis()).unwrap_or(0)
}
