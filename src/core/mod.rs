//! Core early-warning pipeline.
//!
//! This module contains the sample ingestor, the sliding feature window,
//! the rule-based pattern detector, the warning level resolver and the
//! per-session pipeline tying them together.

pub mod detector;
pub mod engine;
pub mod ingest;
pub mod patterns;
pub mod resolver;
pub mod rules;
pub mod session;
pub mod smoothing;
pub mod window;

// Re-export commonly used types
pub use detector::{DetectorConfig, PatternDetector, QuietHours};
pub use engine::{EngineConfig, WarningEngine};
pub use ingest::{decode_frame, decode_sample, IngestError, IngestLimits, SampleIngestor};
pub use patterns::{FnRule, Pattern, PatternCategory, PatternRule, RuleFn};
pub use resolver::{CategoryWeights, LevelThresholds, ResolverConfig, WarningLevel, WarningResolver};
pub use session::{Assessment, SessionPipeline, SessionSummary};
pub use smoothing::{LevelSmoother, SmootherConfig};
pub use window::{FeatureWindow, WindowConfig, WindowSnapshot};
