//! Engine configuration and the shared, immutable evaluation components.

use crate::config::ConfigError;
use crate::core::detector::{DetectorConfig, PatternDetector};
use crate::core::ingest::IngestLimits;
use crate::core::patterns::{Pattern, PatternRule};
use crate::core::resolver::{ResolverConfig, WarningLevel, WarningResolver};
use crate::core::session::SessionPipeline;
use crate::core::smoothing::SmootherConfig;
use crate::core::window::{WindowConfig, WindowSnapshot};
use crate::device::types::SessionId;
use crate::journal::events::SharedSink;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Everything needed to evaluate a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ingest: IngestLimits,
    pub window: WindowConfig,
    pub detector: DetectorConfig,
    pub resolver: ResolverConfig,
    pub smoothing: SmootherConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ingest.validate()?;
        self.window.validate()?;
        self.detector.validate()?;
        self.resolver.validate()?;
        self.smoothing.validate()?;
        Ok(())
    }
}

/// Stateless half of the pipeline, shared between sessions.
///
/// Cloning is cheap; the detector and resolver are reference counted and
/// never mutated after construction.
#[derive(Clone)]
pub struct WarningEngine {
    config: Arc<EngineConfig>,
    detector: Arc<PatternDetector>,
    resolver: Arc<WarningResolver>,
}

impl WarningEngine {
    /// Build an engine with the built-in rule set. Invalid configuration is
    /// refused here, before any session can start.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let detector = PatternDetector::with_builtin_rules(config.detector.clone());
        Ok(Self::assemble(config, detector))
    }

    /// Build an engine with the built-in rules followed by `extra`.
    pub fn with_rules(
        config: EngineConfig,
        extra: Vec<Box<dyn PatternRule>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut detector = PatternDetector::with_builtin_rules(config.detector.clone());
        for rule in extra {
            detector.register_boxed(rule);
        }
        Ok(Self::assemble(config, detector))
    }

    fn assemble(config: EngineConfig, detector: PatternDetector) -> Self {
        let resolver = WarningResolver::new(config.resolver.clone());
        tracing::debug!(rules = detector.rules().count(), "warning engine ready");
        Self {
            config: Arc::new(config),
            detector: Arc::new(detector),
            resolver: Arc::new(resolver),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn detector(&self) -> &PatternDetector {
        &self.detector
    }

    pub fn resolver(&self) -> &WarningResolver {
        &self.resolver
    }

    /// Open a pipeline for one session.
    pub fn open_session(&self, id: impl Into<SessionId>, sink: SharedSink) -> SessionPipeline {
        SessionPipeline::new(
            id.into(),
            &self.config,
            Arc::clone(&self.detector),
            Arc::clone(&self.resolver),
            sink,
        )
    }

    /// One-shot evaluation of a snapshot without smoothing.
    pub fn assess(&self, snapshot: &WindowSnapshot) -> (Vec<Pattern>, WarningLevel) {
        let patterns = self.detector.detect(snapshot);
        let level = self.resolver.resolve(&patterns);
        (patterns, level)
    }
}
