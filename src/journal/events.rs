//! Warning events and the sink interface.
//!
//! The core never writes to storage itself. Everything worth persisting
//! (rejected samples, pattern changes, level transitions, session lifecycle)
//! is handed to a caller-supplied [`EventSink`].

use crate::core::patterns::Pattern;
use crate::core::resolver::WarningLevel;
use crate::device::types::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

/// Something a session pipeline reports to the outside world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WarningEvent {
    SessionStarted {
        session_id: SessionId,
        at: DateTime<Utc>,
    },
    SampleRejected {
        session_id: SessionId,
        at: DateTime<Utc>,
        code: String,
        reason: String,
    },
    PatternsDetected {
        session_id: SessionId,
        at: DateTime<Utc>,
        patterns: Vec<Pattern>,
    },
    LevelChanged {
        session_id: SessionId,
        at: DateTime<Utc>,
        from: WarningLevel,
        to: WarningLevel,
        severity_score: f64,
    },
    SessionEnded {
        session_id: SessionId,
        at: DateTime<Utc>,
        samples_accepted: u64,
        samples_rejected: u64,
        final_level: WarningLevel,
    },
}

impl WarningEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            WarningEvent::SessionStarted { session_id, .. }
            | WarningEvent::SampleRejected { session_id, .. }
            | WarningEvent::PatternsDetected { session_id, .. }
            | WarningEvent::LevelChanged { session_id, .. }
            | WarningEvent::SessionEnded { session_id, .. } => session_id,
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            WarningEvent::SessionStarted { at, .. }
            | WarningEvent::SampleRejected { at, .. }
            | WarningEvent::PatternsDetected { at, .. }
            | WarningEvent::LevelChanged { at, .. }
            | WarningEvent::SessionEnded { at, .. } => *at,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WarningEvent::SessionStarted { .. } => "session_started",
            WarningEvent::SampleRejected { .. } => "sample_rejected",
            WarningEvent::PatternsDetected { .. } => "patterns_detected",
            WarningEvent::LevelChanged { .. } => "level_changed",
            WarningEvent::SessionEnded { .. } => "session_ended",
        }
    }
}

/// Destination for warning events.
///
/// Implementations must not block for long: `record` is called inline from
/// the session pipeline.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &WarningEvent);
}

/// Thread-safe shared sink.
pub type SharedSink = Arc<dyn EventSink>;

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn record(&self, event: &WarningEvent) {
        (**self).record(event)
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &WarningEvent) {}
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<WarningEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn events(&self) -> Vec<WarningEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return everything recorded so far.
    pub fn drain(&self) -> Vec<WarningEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &WarningEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Writes each event as one JSON line.
pub struct NdjsonSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> NdjsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> EventSink for NdjsonSink<W> {
    fn record(&self, event: &WarningEvent) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let result = serde_json::to_writer(&mut *writer, event)
            .map_err(std::io::Error::other)
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush());
        if let Err(e) = result {
            tracing::warn!(error = %e, kind = event.kind(), "failed to write event");
        }
    }
}

/// Forwards every event to several sinks in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<SharedSink>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: SharedSink) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn push(&mut self, sink: SharedSink) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn record(&self, event: &WarningEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}
