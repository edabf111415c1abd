//! Pattern types and the rule interface.
//!
//! A rule is a pure function of a window snapshot and the detector
//! configuration. Rules hold no mutable state, so a detection pass may
//! evaluate them in any order or concurrently against the same snapshot.

use crate::core::detector::DetectorConfig;
use crate::core::window::WindowSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Family a pattern belongs to; each family carries its own severity weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    Physiological,
    Environmental,
    Behavioral,
    Temporal,
}

impl PatternCategory {
    pub const ALL: [PatternCategory; 4] = [
        PatternCategory::Physiological,
        PatternCategory::Environmental,
        PatternCategory::Behavioral,
        PatternCategory::Temporal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternCategory::Physiological => "physiological",
            PatternCategory::Environmental => "environmental",
            PatternCategory::Behavioral => "behavioral",
            PatternCategory::Temporal => "temporal",
        }
    }
}

impl fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pattern matched in the current window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Match strength in [0, 1]
    pub confidence: f64,
    /// Observations that support the match, e.g. `stress_level=90`
    pub indicators: BTreeSet<String>,
    pub category: PatternCategory,
}

impl Pattern {
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: PatternCategory) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            confidence: 0.0,
            indicators: BTreeSet::new(),
            category,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the confidence, clamped to [0, 1]. Non-finite values become 0.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_unit(confidence);
        self
    }

    pub fn with_indicator(mut self, indicator: impl Into<String>) -> Self {
        self.indicators.insert(indicator.into());
        self
    }
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// A named detection rule.
pub trait PatternRule: Send + Sync {
    /// Stable identifier, also used as the produced pattern's id.
    fn id(&self) -> &str;

    fn category(&self) -> PatternCategory;

    /// Evaluate the rule against a snapshot.
    fn evaluate(&self, snapshot: &WindowSnapshot, config: &DetectorConfig) -> Option<Pattern>;
}

/// Signature of a rule written as a plain function.
pub type RuleFn = fn(&WindowSnapshot, &DetectorConfig) -> Option<Pattern>;

/// Adapts a plain function into a [`PatternRule`].
pub struct FnRule {
    id: &'static str,
    category: PatternCategory,
    eval: RuleFn,
}

impl FnRule {
    pub const fn new(id: &'static str, category: PatternCategory, eval: RuleFn) -> Self {
        Self { id, category, eval }
    }
}

impl PatternRule for FnRule {
    fn id(&self) -> &str {
        self.id
    }

    fn category(&self) -> PatternCategory {
        self.category
    }

    fn evaluate(&self, snapshot: &WindowSnapshot, config: &DetectorConfig) -> Option<Pattern> {
        (self.eval)(snapshot, config).map(|mut pattern| {
            pattern.category = self.category;
            pattern
        })
    }
}

impl fmt::Debug for FnRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRule")
            .field("id", &self.id)
            .field("category", &self.category)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_clamped() {
        let p = Pattern::new("x", "X", PatternCategory::Temporal).with_confidence(1.7);
        assert_eq!(p.confidence, 1.0);

        let p = Pattern::new("x", "X", PatternCategory::Temporal).with_confidence(f64::NAN);
        assert_eq!(p.confidence, 0.0);
    }

    #[test]
    fn test_category_serialization() {
        let json = serde_json::to_string(&PatternCategory::Physiological).unwrap();
        assert_eq!(json, "\"physiological\"");
    }

    #[test]
    fn test_fn_rule_forces_category() {
        fn always(_: &WindowSnapshot, _: &DetectorConfig) -> Option<Pattern> {
            Some(Pattern::new("always", "Always", PatternCategory::Temporal).with_confidence(0.5))
        }

        let rule = FnRule::new("always", PatternCategory::Environmental, always);
        let pattern = rule
            .evaluate(&WindowSnapshot::empty(), &DetectorConfig::default())
            .unwrap();
        assert_eq!(pattern.category, PatternCategory::Environmental);
        assert_eq!(rule.id(), "always");
    }
}
