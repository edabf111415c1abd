//! Warning level resolution.
//!
//! The resolver is a pure function of the active pattern set: a weighted
//! severity score is bucketed into four ordered levels. Weights are
//! non-negative, so adding a pattern or raising a confidence can only raise
//! the score, and with it the level.

use crate::config::ConfigError;
use crate::core::patterns::{clamp_unit, Pattern, PatternCategory};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered warning level.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    #[default]
    Normal,
    Notice,
    Watch,
    Alert,
}

impl WarningLevel {
    pub const ALL: [WarningLevel; 4] = [
        WarningLevel::Normal,
        WarningLevel::Notice,
        WarningLevel::Watch,
        WarningLevel::Alert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WarningLevel::Normal => "normal",
            WarningLevel::Notice => "notice",
            WarningLevel::Watch => "watch",
            WarningLevel::Alert => "alert",
        }
    }
}

impl fmt::Display for WarningLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity weight per pattern category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryWeights {
    pub physiological: f64,
    pub environmental: f64,
    pub behavioral: f64,
    pub temporal: f64,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            physiological: 0.5,
            environmental: 0.25,
            behavioral: 0.35,
            temporal: 0.3,
        }
    }
}

impl CategoryWeights {
    pub fn weight(&self, category: PatternCategory) -> f64 {
        match category {
            PatternCategory::Physiological => self.physiological,
            PatternCategory::Environmental => self.environmental,
            PatternCategory::Behavioral => self.behavioral,
            PatternCategory::Temporal => self.temporal,
        }
    }
}

/// Minimum severity score for each non-normal level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelThresholds {
    pub notice: f64,
    pub watch: f64,
    pub alert: f64,
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self {
            notice: 0.15,
            watch: 0.25,
            alert: 0.40,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub weights: CategoryWeights,
    pub thresholds: LevelThresholds,
}

impl ResolverConfig {
    /// Reject tables that would break ordering or monotonicity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for category in PatternCategory::ALL {
            let weight = self.weights.weight(category);
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::InvalidThreshold(format!(
                    "resolver weight for {category} must be finite and non-negative, got {weight}"
                )));
            }
        }

        let t = &self.thresholds;
        if [t.notice, t.watch, t.alert].iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::InvalidThreshold(
                "resolver thresholds must be finite".to_string(),
            ));
        }
        if !(0.0 < t.notice && t.notice < t.watch && t.watch < t.alert) {
            return Err(ConfigError::InvalidThreshold(format!(
                "resolver thresholds must satisfy 0 < notice < watch < alert, got {} / {} / {}",
                t.notice, t.watch, t.alert
            )));
        }
        Ok(())
    }
}

/// Maps a pattern set to a warning level.
#[derive(Debug, Clone, Default)]
pub struct WarningResolver {
    config: ResolverConfig,
}

impl WarningResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Weighted severity score of a pattern set.
    pub fn score(&self, patterns: &[Pattern]) -> f64 {
        patterns
            .iter()
            .map(|p| clamp_unit(p.confidence) * self.config.weights.weight(p.category))
            .sum()
    }

    /// Bucket a score into a level.
    pub fn level_for_score(&self, score: f64) -> WarningLevel {
        let t = &self.config.thresholds;
        if score >= t.alert {
            WarningLevel::Alert
        } else if score >= t.watch {
            WarningLevel::Watch
        } else if score >= t.notice {
            WarningLevel::Notice
        } else {
            WarningLevel::Normal
        }
    }

    pub fn resolve(&self, patterns: &[Pattern]) -> WarningLevel {
        self.level_for_score(self.score(patterns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(id: &str, category: PatternCategory, confidence: f64) -> Pattern {
        Pattern::new(id, id, category).with_confidence(confidence)
    }

    #[test]
    fn test_no_patterns_is_normal() {
        let resolver = WarningResolver::default();
        assert_eq!(resolver.resolve(&[]), WarningLevel::Normal);
    }

    #[test]
    fn test_levels_are_ordered() {
        assert!(WarningLevel::Normal < WarningLevel::Notice);
        assert!(WarningLevel::Notice < WarningLevel::Watch);
        assert!(WarningLevel::Watch < WarningLevel::Alert);
    }

    #[test]
    fn test_bucketing() {
        let resolver = WarningResolver::default();
        let cases = [
            (0.1, WarningLevel::Normal),
            (0.15, WarningLevel::Notice),
            (0.3, WarningLevel::Watch),
            (0.4, WarningLevel::Alert),
            (2.0, WarningLevel::Alert),
        ];
        for (score, expected) in cases {
            assert_eq!(resolver.level_for_score(score), expected, "score {score}");
        }
    }

    #[test]
    fn test_stress_example_reaches_alert() {
        let resolver = WarningResolver::default();
        let patterns = [pattern("elevated-stress", PatternCategory::Physiological, 0.9)];

        assert!((resolver.score(&patterns) - 0.45).abs() < 1e-9);
        assert_eq!(resolver.resolve(&patterns), WarningLevel::Alert);
    }

    #[test]
    fn test_monotonic_in_confidence() {
        let resolver = WarningResolver::default();
        let mut previous = WarningLevel::Normal;
        for step in 0..=100 {
            let confidence = step as f64 / 100.0;
            let patterns = [
                pattern("a", PatternCategory::Temporal, confidence),
                pattern("b", PatternCategory::Behavioral, 0.3),
            ];
            let level = resolver.resolve(&patterns);
            assert!(level >= previous, "level dropped at confidence {confidence}");
            previous = level;
        }
    }

    #[test]
    fn test_monotonic_in_pattern_addition() {
        let resolver = WarningResolver::default();
        let mut patterns = Vec::new();
        let mut previous = resolver.resolve(&patterns);

        for (i, category) in PatternCategory::ALL.iter().enumerate() {
            patterns.push(pattern(&format!("p{i}"), *category, 0.35));
            let level = resolver.resolve(&patterns);
            assert!(level >= previous);
            previous = level;
        }
    }

    #[test]
    fn test_validation() {
        assert!(ResolverConfig::default().validate().is_ok());

        let mut config = ResolverConfig::default();
        config.thresholds.watch = 0.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreshold(_))
        ));

        let mut config = ResolverConfig::default();
        config.thresholds.notice = 0.0;
        assert!(config.validate().is_err());

        let mut config = ResolverConfig::default();
        config.weights.behavioral = -0.1;
        assert!(config.validate().is_err());
    }
}
