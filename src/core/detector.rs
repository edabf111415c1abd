//! Pattern detection over a window snapshot.

use crate::config::ConfigError;
use crate::core::patterns::{clamp_unit, Pattern, PatternRule};
use crate::core::rules;
use crate::core::window::WindowSnapshot;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Quiet-hours window used by the time-of-day rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuietHours {
    /// IANA timezone of the wearer, e.g. "Europe/Berlin"
    pub timezone: String,
    /// First local hour of quiet time (0-23)
    pub start_hour: u32,
    /// Local hour quiet time ends, exclusive (0-23)
    pub end_hour: u32,
    /// Stress level that counts as arousal during quiet hours
    pub stress_threshold: f64,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            start_hour: 21,
            end_hour: 7,
            stress_threshold: 60.0,
        }
    }
}

impl QuietHours {
    /// Whether a local hour falls inside quiet time. Handles windows that
    /// wrap past midnight.
    pub fn contains_hour(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }

    pub fn tz(&self) -> Option<Tz> {
        self.timezone.parse().ok()
    }
}

/// Thresholds for the built-in rules plus the shared confidence floor.
///
/// The defaults are starting points; they are expected to be calibrated
/// against real wearer data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Patterns below this confidence are discarded
    pub confidence_floor: f64,
    /// Minimum earlier samples required to compute a rolling baseline
    pub baseline_min_samples: usize,
    /// z-score at which a deviation from baseline is reported
    pub deviation_z: f64,
    /// z-score that maps to full confidence
    pub deviation_z_saturation: f64,
    /// Stress level considered elevated
    pub stress_threshold: f64,
    /// Absolute heart rate considered elevated (bpm)
    pub heart_rate_high_bpm: f64,
    /// Heart rate above the threshold that maps to full confidence (bpm)
    pub heart_rate_span_bpm: f64,
    /// Absolute HRV considered suppressed (ms)
    pub hrv_low_ms: f64,
    /// Jump between consecutive heart-rate samples counted as a spike (bpm)
    pub spike_delta_bpm: f64,
    /// Minimum spikes in the window for the agitation rule
    pub spike_min_count: usize,
    /// Minimum samples for the stress trend rule
    pub trend_min_samples: usize,
    /// Stress slope (points per minute) reported as a rising trend
    pub trend_slope_per_min: f64,
    /// Minimum window span for the sustained stress rule (seconds)
    pub sustained_min_secs: u64,
    /// Fraction of samples above the stress threshold for sustained stress
    pub sustained_fraction: f64,
    pub quiet_hours: QuietHours,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.3,
            baseline_min_samples: 10,
            deviation_z: 2.0,
            deviation_z_saturation: 4.0,
            stress_threshold: 80.0,
            heart_rate_high_bpm: 100.0,
            heart_rate_span_bpm: 40.0,
            hrv_low_ms: 20.0,
            spike_delta_bpm: 15.0,
            spike_min_count: 3,
            trend_min_samples: 5,
            trend_slope_per_min: 2.0,
            sustained_min_secs: 5 * 60,
            sustained_fraction: 0.6,
            quiet_hours: QuietHours::default(),
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_floor) {
            return Err(ConfigError::InvalidThreshold(format!(
                "detector.confidence_floor must be within [0, 1], got {}",
                self.confidence_floor
            )));
        }
        if !(0.0..=1.0).contains(&self.sustained_fraction) {
            return Err(ConfigError::InvalidThreshold(format!(
                "detector.sustained_fraction must be within [0, 1], got {}",
                self.sustained_fraction
            )));
        }

        let positive = [
            ("deviation_z", self.deviation_z),
            ("deviation_z_saturation", self.deviation_z_saturation),
            ("heart_rate_high_bpm", self.heart_rate_high_bpm),
            ("heart_rate_span_bpm", self.heart_rate_span_bpm),
            ("hrv_low_ms", self.hrv_low_ms),
            ("spike_delta_bpm", self.spike_delta_bpm),
            ("trend_slope_per_min", self.trend_slope_per_min),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidThreshold(format!(
                    "detector.{name} must be positive, got {value}"
                )));
            }
        }
        if self.deviation_z_saturation < self.deviation_z {
            return Err(ConfigError::InvalidThreshold(
                "detector.deviation_z_saturation must not be below deviation_z".to_string(),
            ));
        }
        if !self.stress_threshold.is_finite() || !self.quiet_hours.stress_threshold.is_finite() {
            return Err(ConfigError::InvalidThreshold(
                "detector stress thresholds must be finite".to_string(),
            ));
        }
        if self.baseline_min_samples < 2 || self.trend_min_samples < 2 || self.spike_min_count == 0
        {
            return Err(ConfigError::InvalidThreshold(
                "detector sample minimums are too small".to_string(),
            ));
        }
        if self.quiet_hours.start_hour > 23 || self.quiet_hours.end_hour > 23 {
            return Err(ConfigError::InvalidThreshold(
                "detector.quiet_hours hours must be within 0-23".to_string(),
            ));
        }
        if self.quiet_hours.tz().is_none() {
            return Err(ConfigError::InvalidTimezone(
                self.quiet_hours.timezone.clone(),
            ));
        }
        Ok(())
    }
}

/// Evaluates registered rules against window snapshots.
pub struct PatternDetector {
    config: DetectorConfig,
    rules: Vec<Box<dyn PatternRule>>,
}

impl PatternDetector {
    /// Create a detector with no rules.
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            rules: Vec::new(),
        }
    }

    /// Create a detector with the built-in rule set.
    pub fn with_builtin_rules(config: DetectorConfig) -> Self {
        let mut detector = Self::new(config);
        for rule in rules::builtin_rules() {
            detector.register_boxed(rule);
        }
        detector
    }

    /// Register a rule. Registration order decides ties.
    pub fn register(&mut self, rule: impl PatternRule + 'static) {
        self.rules.push(Box::new(rule));
    }

    pub fn register_boxed(&mut self, rule: Box<dyn PatternRule>) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> impl Iterator<Item = &(dyn PatternRule + 'static)> + '_ {
        self.rules.iter().map(|r| r.as_ref())
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Run every rule against the snapshot.
    ///
    /// Returns at most one pattern per id, in rule-registration order. Each
    /// pattern carries its rule's category and a confidence clamped to
    /// [0, 1]. When two rules report the same id the higher confidence wins;
    /// on equal confidence the earlier registration is kept.
    pub fn detect(&self, snapshot: &WindowSnapshot) -> Vec<Pattern> {
        if snapshot.is_empty() {
            return Vec::new();
        }

        let mut selected: Vec<Pattern> = Vec::new();
        for rule in &self.rules {
            let Some(mut pattern) = rule.evaluate(snapshot, &self.config) else {
                continue;
            };

            if !pattern.confidence.is_finite() || pattern.confidence < self.config.confidence_floor
            {
                tracing::trace!(
                    rule = rule.id(),
                    confidence = pattern.confidence,
                    "discarding sub-threshold pattern"
                );
                continue;
            }
            // The rule's registered category and the unit range hold for
            // every pattern, whatever the rule returned.
            pattern.category = rule.category();
            pattern.confidence = clamp_unit(pattern.confidence);

            match selected.iter_mut().find(|p| p.id == pattern.id) {
                Some(existing) => {
                    if pattern.confidence > existing.confidence {
                        *existing = pattern;
                    }
                }
                None => selected.push(pattern),
            }
        }
        selected
    }
}
