//! Per-session evaluation pipeline.
//!
//! A [`SessionPipeline`] owns one session's window and ingestion state and
//! runs every accepted sample through detection, resolution and smoothing.
//! It is driven by exactly one caller at a time; samples are evaluated in
//! arrival order.

use crate::core::detector::PatternDetector;
use crate::core::ingest::{IngestError, SampleIngestor};
use crate::core::patterns::Pattern;
use crate::core::resolver::{WarningLevel, WarningResolver};
use crate::core::smoothing::LevelSmoother;
use crate::core::window::{FeatureWindow, WindowSnapshot};
use crate::core::EngineConfig;
use crate::device::types::{BiometricData, SessionId};
use crate::journal::events::{SharedSink, WarningEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of one evaluation, as consumed by the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub session_id: SessionId,
    /// Timestamp of the sample that triggered the evaluation
    pub evaluated_at: DateTime<Utc>,
    /// Samples in the window at evaluation time
    pub sample_count: usize,
    pub detected_patterns: Vec<Pattern>,
    /// Level straight from the resolver
    pub raw_level: WarningLevel,
    /// Level after hysteresis
    pub warning_level: WarningLevel,
    pub severity_score: f64,
}

/// Totals reported when a session ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub samples_accepted: u64,
    pub samples_rejected: u64,
    pub final_level: WarningLevel,
}

pub struct SessionPipeline {
    session_id: SessionId,
    ingestor: SampleIngestor,
    window: FeatureWindow,
    detector: Arc<PatternDetector>,
    resolver: Arc<WarningResolver>,
    smoother: LevelSmoother,
    sink: SharedSink,
    last_pattern_ids: Vec<String>,
    latest: Option<Assessment>,
}

impl SessionPipeline {
    pub(crate) fn new(
        session_id: SessionId,
        config: &EngineConfig,
        detector: Arc<PatternDetector>,
        resolver: Arc<WarningResolver>,
        sink: SharedSink,
    ) -> Self {
        tracing::info!(session = %session_id, "session started");
        sink.record(&WarningEvent::SessionStarted {
            session_id: session_id.clone(),
            at: Utc::now(),
        });

        Self {
            session_id,
            ingestor: SampleIngestor::new(config.ingest.clone()),
            window: FeatureWindow::new(&config.window),
            detector,
            resolver,
            smoother: LevelSmoother::new(&config.smoothing),
            sink,
            last_pattern_ids: Vec::new(),
            latest: None,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Ingest one sample and, if accepted, evaluate the updated window.
    ///
    /// A rejected sample is logged and recorded; the window is unchanged and
    /// the session keeps going.
    pub fn ingest(&mut self, sample: BiometricData) -> Result<Assessment, IngestError> {
        if let Err(e) = self.ingestor.ingest(sample, &mut self.window) {
            tracing::warn!(session = %self.session_id, error = %e, "dropping biometric sample");
            self.sink.record(&WarningEvent::SampleRejected {
                session_id: self.session_id.clone(),
                at: sample.timestamp(),
                code: e.code().to_string(),
                reason: e.to_string(),
            });
            return Err(e);
        }

        Ok(self.evaluate(sample.timestamp()))
    }

    fn evaluate(&mut self, at: DateTime<Utc>) -> Assessment {
        let snapshot = self.window.snapshot();
        let patterns = self.detector.detect(&snapshot);
        let severity_score = self.resolver.score(&patterns);
        let raw_level = self.resolver.level_for_score(severity_score);

        let previous = self.smoother.current();
        let warning_level = self.smoother.update(raw_level);

        tracing::debug!(
            session = %self.session_id,
            samples = snapshot.len(),
            patterns = patterns.len(),
            score = severity_score,
            raw = %raw_level,
            level = %warning_level,
            "evaluated window"
        );

        let ids: Vec<String> = patterns.iter().map(|p| p.id.clone()).collect();
        if ids != self.last_pattern_ids {
            self.sink.record(&WarningEvent::PatternsDetected {
                session_id: self.session_id.clone(),
                at,
                patterns: patterns.clone(),
            });
            self.last_pattern_ids = ids;
        }

        if warning_level != previous {
            tracing::info!(
                session = %self.session_id,
                from = %previous,
                to = %warning_level,
                score = severity_score,
                "warning level changed"
            );
            self.sink.record(&WarningEvent::LevelChanged {
                session_id: self.session_id.clone(),
                at,
                from: previous,
                to: warning_level,
                severity_score,
            });
        }

        let assessment = Assessment {
            session_id: self.session_id.clone(),
            evaluated_at: at,
            sample_count: snapshot.len(),
            detected_patterns: patterns,
            raw_level,
            warning_level,
            severity_score,
        };
        self.latest = Some(assessment.clone());
        assessment
    }

    /// Current window contents.
    pub fn snapshot(&self) -> WindowSnapshot {
        self.window.snapshot()
    }

    /// The most recent assessment, if any sample has been accepted.
    pub fn latest(&self) -> Option<&Assessment> {
        self.latest.as_ref()
    }

    pub fn warning_level(&self) -> WarningLevel {
        self.smoother.current()
    }

    /// Close the session, discarding its window.
    pub fn end(self) -> SessionSummary {
        let summary = SessionSummary {
            session_id: self.session_id.clone(),
            samples_accepted: self.ingestor.accepted_count(),
            samples_rejected: self.ingestor.rejected_count(),
            final_level: self.smoother.current(),
        };

        tracing::info!(
            session = %summary.session_id,
            accepted = summary.samples_accepted,
            rejected = summary.samples_rejected,
            "session ended"
        );
        self.sink.record(&WarningEvent::SessionEnded {
            session_id: summary.session_id.clone(),
            at: Utc::now(),
            samples_accepted: summary.samples_accepted,
            samples_rejected: summary.samples_rejected,
            final_level: summary.final_level,
        });
        summary
    }
}
