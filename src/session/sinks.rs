//! Outbound hooks into the surrounding application.
//!
//! The core never renders or persists anything itself. It reports through
//! four sinks supplied by the session store:
//!
//! | Sink | Receives |
//! |------|----------|
//! | [`TelemetrySink`] | variables extracted by transform scripts |
//! | [`LogSink`] | structured log entries (script `log` calls, failures) |
//! | [`NotificationSink`] | user-facing notices (timeouts, send failures) |
//! | [`FrameObserver`] | every RX frame and TX payload |
//!
//! All sinks default to no-ops.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::framing::Frame;
use crate::identifiers::SessionId;
use crate::script::Variable;

// ============================================================================
// Enums
// ============================================================================

/// Severity of a log entry or notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Diagnostic detail.
    Debug,
    /// Normal operation.
    Info,
    /// Recovered problem.
    Warn,
    /// Failed operation.
    Error,
}

/// Direction of a frame record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    /// Received from the device.
    Rx,
    /// Sent to the device.
    Tx,
}

// ============================================================================
// Records
// ============================================================================

/// One frame as seen by the frame observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRecord {
    /// Owning session.
    pub session_id: SessionId,
    /// Direction of travel.
    pub direction: Direction,
    /// Frame bytes and timestamp.
    pub frame: Frame,
}

// ============================================================================
// Sink Traits
// ============================================================================

/// Receives values extracted from frames.
pub trait TelemetrySink: Send + Sync {
    /// Stores one named value.
    fn set_variable(&self, session_id: SessionId, name: &str, value: &Value);

    /// Associates extracted values with the frame they came from.
    fn attach_variables(&self, session_id: SessionId, frame: &Frame, variables: &[Variable]) {
        let _ = (session_id, frame, variables);
    }
}

/// Receives structured log entries.
pub trait LogSink: Send + Sync {
    /// Records one entry.
    fn log(&self, session_id: SessionId, level: Level, source: &str, message: &str);
}

/// Receives user-facing notifications.
pub trait NotificationSink: Send + Sync {
    /// Shows one notification.
    fn notify(&self, session_id: SessionId, level: Level, message: &str);
}

/// Receives every frame in both directions.
pub trait FrameObserver: Send + Sync {
    /// Called once per frame.
    fn on_frame(&self, record: &FrameRecord);
}

// ============================================================================
// NoopSink
// ============================================================================

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn set_variable(&self, _: SessionId, _: &str, _: &Value) {}
}

impl LogSink for NoopSink {
    fn log(&self, _: SessionId, _: Level, _: &str, _: &str) {}
}

impl NotificationSink for NoopSink {
    fn notify(&self, _: SessionId, _: Level, _: &str) {}
}

impl FrameObserver for NoopSink {
    fn on_frame(&self, _: &FrameRecord) {}
}

// ============================================================================
// Sinks
// ============================================================================

/// Bundle of all outbound hooks.
#[derive(Clone)]
pub struct Sinks {
    /// Telemetry values.
    pub telemetry: Arc<dyn TelemetrySink>,
    /// Structured log.
    pub log: Arc<dyn LogSink>,
    /// User notifications.
    pub notify: Arc<dyn NotificationSink>,
    /// Frame observer.
    pub frames: Arc<dyn FrameObserver>,
}

impl Default for Sinks {
    fn default() -> Self {
        Self {
            telemetry: Arc::new(NoopSink),
            log: Arc::new(NoopSink),
            notify: Arc::new(NoopSink),
            frames: Arc::new(NoopSink),
        }
    }
}

impl fmt::Debug for Sinks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sinks").finish_non_exhaustive()
    }
}

impl Sinks {
    /// Replaces the telemetry sink.
    #[must_use]
    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = sink;
        self
    }

    /// Replaces the log sink.
    #[must_use]
    pub fn with_log(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log = sink;
        self
    }

    /// Replaces the notification sink.
    #[must_use]
    pub fn with_notify(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notify = sink;
        self
    }

    /// Replaces the frame observer.
    #[must_use]
    pub fn with_frames(mut self, observer: Arc<dyn FrameObserver>) -> Self {
        self.frames = observer;
        self
    }
}
