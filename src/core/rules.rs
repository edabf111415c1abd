//! Built-in early-warning rules.
//!
//! Every rule here is a plain function of the snapshot and the detector
//! configuration. Baselines are computed from the window itself, excluding
//! the latest sample, so each rule compares "now" against the recent past.

use crate::core::detector::DetectorConfig;
use crate::core::patterns::{FnRule, Pattern, PatternCategory, PatternRule};
use crate::core::window::WindowSnapshot;
use crate::device::types::Signal;
use chrono::Timelike;
use statrs::statistics::Statistics;

pub const ELEVATED_STRESS: &str = "elevated-stress";
pub const ELEVATED_HEART_RATE: &str = "elevated-heart-rate";
pub const SUPPRESSED_HRV: &str = "suppressed-hrv";
pub const AGITATION_SPIKES: &str = "agitation-spikes";
pub const RISING_STRESS_TREND: &str = "rising-stress-trend";
pub const SUSTAINED_HIGH_STRESS: &str = "sustained-high-stress";
pub const QUIET_HOURS_AROUSAL: &str = "quiet-hours-arousal";

/// The built-in rule set, in registration order.
pub fn builtin_rules() -> Vec<Box<dyn PatternRule>> {
    vec![
        Box::new(FnRule::new(
            ELEVATED_STRESS,
            PatternCategory::Physiological,
            elevated_stress,
        )),
        Box::new(FnRule::new(
            ELEVATED_HEART_RATE,
            PatternCategory::Physiological,
            elevated_heart_rate,
        )),
        Box::new(FnRule::new(
            SUPPRESSED_HRV,
            PatternCategory::Physiological,
            suppressed_hrv,
        )),
        Box::new(FnRule::new(
            AGITATION_SPIKES,
            PatternCategory::Behavioral,
            agitation_spikes,
        )),
        Box::new(FnRule::new(
            RISING_STRESS_TREND,
            PatternCategory::Temporal,
            rising_stress_trend,
        )),
        Box::new(FnRule::new(
            SUSTAINED_HIGH_STRESS,
            PatternCategory::Temporal,
            sustained_high_stress,
        )),
        Box::new(FnRule::new(
            QUIET_HOURS_AROUSAL,
            PatternCategory::Temporal,
            quiet_hours_arousal,
        )),
    ]
}

/// Mean and spread of a signal over earlier samples.
#[derive(Debug, Clone, Copy)]
struct Baseline {
    mean: f64,
    std_dev: f64,
}

impl Baseline {
    fn z_score(&self, value: f64) -> f64 {
        (value - self.mean) / self.std_dev
    }
}

/// Baseline over every sample but the latest, if enough history exists.
fn rolling_baseline(
    snapshot: &WindowSnapshot,
    signal: Signal,
    config: &DetectorConfig,
) -> Option<Baseline> {
    let values = snapshot.values(signal);
    let history = values.split_last().map(|(_, rest)| rest)?;
    if history.len() < config.baseline_min_samples {
        return None;
    }

    let mean = history.iter().mean();
    let std_dev = history.iter().std_dev();
    if !mean.is_finite() || !std_dev.is_finite() || std_dev <= f64::EPSILON {
        return None;
    }
    Some(Baseline { mean, std_dev })
}

/// Map a z-score to confidence once it passes the reporting threshold.
fn deviation_confidence(z: f64, config: &DetectorConfig) -> f64 {
    if z >= config.deviation_z {
        (z / config.deviation_z_saturation).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Latest stress reading above the configured threshold.
fn elevated_stress(snapshot: &WindowSnapshot, config: &DetectorConfig) -> Option<Pattern> {
    let latest = snapshot.latest()?;
    let stress = latest.stress_level();
    if stress <= config.stress_threshold {
        return None;
    }

    Some(
        Pattern::new(ELEVATED_STRESS, "Elevated stress", PatternCategory::Physiological)
            .with_description(format!(
                "Stress level {stress:.0} is above {:.0}",
                config.stress_threshold
            ))
            .with_confidence(stress / 100.0)
            .with_indicator(format!("stress_level={stress:.0}")),
    )
}

/// Heart rate above an absolute ceiling or well above the wearer's recent baseline.
fn elevated_heart_rate(snapshot: &WindowSnapshot, config: &DetectorConfig) -> Option<Pattern> {
    let latest = snapshot.latest()?;
    let hr = latest.heart_rate();

    let absolute = if hr > config.heart_rate_high_bpm {
        ((hr - config.heart_rate_high_bpm) / config.heart_rate_span_bpm).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let baseline = rolling_baseline(snapshot, Signal::HeartRate, config);
    let deviation = baseline
        .map(|b| deviation_confidence(b.z_score(hr), config))
        .unwrap_or(0.0);

    let confidence = absolute.max(deviation);
    if confidence <= 0.0 {
        return None;
    }

    let mut pattern = Pattern::new(
        ELEVATED_HEART_RATE,
        "Elevated heart rate",
        PatternCategory::Physiological,
    )
    .with_description(format!("Heart rate at {hr:.0} bpm"))
    .with_confidence(confidence)
    .with_indicator(format!("heart_rate={hr:.0}"));

    if let Some(b) = baseline {
        pattern = pattern
            .with_indicator(format!("heart_rate_baseline={:.0}", b.mean))
            .with_indicator(format!("heart_rate_z={:.1}", b.z_score(hr)));
    }
    Some(pattern)
}

/// HRV below an absolute floor or well below the recent baseline.
fn suppressed_hrv(snapshot: &WindowSnapshot, config: &DetectorConfig) -> Option<Pattern> {
    let latest = snapshot.latest()?;
    let hrv = latest.hrv();

    let absolute = if hrv < config.hrv_low_ms {
        (1.0 - hrv / config.hrv_low_ms).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let baseline = rolling_baseline(snapshot, Signal::Hrv, config);
    // Suppression is a drop, so the sign is flipped.
    let deviation = baseline
        .map(|b| deviation_confidence(-b.z_score(hrv), config))
        .unwrap_or(0.0);

    let confidence = absolute.max(deviation);
    if confidence <= 0.0 {
        return None;
    }

    let mut pattern = Pattern::new(SUPPRESSED_HRV, "Suppressed HRV", PatternCategory::Physiological)
        .with_description(format!("HRV down to {hrv:.0} ms"))
        .with_confidence(confidence)
        .with_indicator(format!("hrv={hrv:.0}"));

    if let Some(b) = baseline {
        pattern = pattern
            .with_indicator(format!("hrv_baseline={:.0}", b.mean))
            .with_indicator(format!("hrv_z={:.1}", b.z_score(hrv)));
    }
    Some(pattern)
}

/// Repeated abrupt heart-rate jumps between consecutive readings, a proxy for
/// restlessness.
fn agitation_spikes(snapshot: &WindowSnapshot, config: &DetectorConfig) -> Option<Pattern> {
    let rates = snapshot.values(Signal::HeartRate);
    let spikes = rates
        .windows(2)
        .filter(|pair| (pair[1] - pair[0]).abs() > config.spike_delta_bpm)
        .count();

    if spikes < config.spike_min_count {
        return None;
    }

    let confidence = spikes as f64 / (2 * config.spike_min_count) as f64;
    Some(
        Pattern::new(AGITATION_SPIKES, "Agitation spikes", PatternCategory::Behavioral)
            .with_description(format!(
                "{spikes} heart-rate jumps over {:.0} bpm",
                config.spike_delta_bpm
            ))
            .with_confidence(confidence)
            .with_indicator(format!("heart_rate_spikes={spikes}")),
    )
}

/// Stress climbing steadily across the window.
fn rising_stress_trend(snapshot: &WindowSnapshot, config: &DetectorConfig) -> Option<Pattern> {
    if snapshot.len() < config.trend_min_samples {
        return None;
    }

    let origin = snapshot.earliest()?.timestamp();
    let minutes: Vec<f64> = snapshot
        .samples()
        .iter()
        .map(|s| (s.timestamp() - origin).num_milliseconds() as f64 / 60_000.0)
        .collect();
    let stress = snapshot.values(Signal::StressLevel);

    let slope = least_squares_slope(&minutes, &stress)?;
    if slope < config.trend_slope_per_min {
        return None;
    }

    Some(
        Pattern::new(
            RISING_STRESS_TREND,
            "Rising stress",
            PatternCategory::Temporal,
        )
        .with_description(format!("Stress rising by {slope:.1} points per minute"))
        .with_confidence(slope / (2.0 * config.trend_slope_per_min))
        .with_indicator(format!("stress_slope_per_min={slope:.1}")),
    )
}

/// Most of a sufficiently long window spent above the stress threshold.
fn sustained_high_stress(snapshot: &WindowSnapshot, config: &DetectorConfig) -> Option<Pattern> {
    let min_secs = i64::try_from(config.sustained_min_secs).unwrap_or(i64::MAX);
    if snapshot.span().num_seconds() < min_secs {
        return None;
    }

    let above = snapshot
        .samples()
        .iter()
        .filter(|s| s.stress_level() > config.stress_threshold)
        .count();
    let fraction = above as f64 / snapshot.len() as f64;
    if fraction < config.sustained_fraction {
        return None;
    }

    let minutes = snapshot.span().num_minutes();
    Some(
        Pattern::new(
            SUSTAINED_HIGH_STRESS,
            "Sustained high stress",
            PatternCategory::Temporal,
        )
        .with_description(format!(
            "{:.0}% of the last {minutes} minutes above stress {:.0}",
            fraction * 100.0,
            config.stress_threshold
        ))
        .with_confidence(fraction)
        .with_indicator(format!("stress_fraction_above={fraction:.2}"))
        .with_indicator(format!("window_minutes={minutes}")),
    )
}

/// Elevated stress during the wearer's local quiet hours.
fn quiet_hours_arousal(snapshot: &WindowSnapshot, config: &DetectorConfig) -> Option<Pattern> {
    let latest = snapshot.latest()?;
    let quiet = &config.quiet_hours;
    let tz = quiet.tz()?;

    let local_hour = latest.timestamp().with_timezone(&tz).hour();
    if !quiet.contains_hour(local_hour) {
        return None;
    }

    let stress = latest.stress_level();
    if stress < quiet.stress_threshold {
        return None;
    }

    Some(
        Pattern::new(
            QUIET_HOURS_AROUSAL,
            "Arousal during quiet hours",
            PatternCategory::Temporal,
        )
        .with_description(format!(
            "Stress {stress:.0} at {local_hour:02}:00 local time"
        ))
        .with_confidence(stress / 100.0)
        .with_indicator(format!("local_hour={local_hour}"))
        .with_indicator(format!("stress_level={stress:.0}")),
    )
}

/// Ordinary least-squares slope of `y` over `x`.
fn least_squares_slope(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() < 2 || x.len() != y.len() {
        return None;
    }

    let variance = x.iter().variance();
    if !variance.is_finite() || variance <= f64::EPSILON {
        return None;
    }
    let slope = x.iter().covariance(y.iter()) / variance;
    slope.is_finite().then_some(slope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::types::BiometricData;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn series(readings: &[(f64, f64, f64)], step: Duration) -> WindowSnapshot {
        let samples = readings
            .iter()
            .enumerate()
            .map(|(i, &(hr, hrv, stress))| {
                BiometricData::new(hr, hrv, stress, noon() + step * i as i32)
            })
            .collect();
        WindowSnapshot::from_samples(samples)
    }

    fn calm(count: usize) -> Vec<(f64, f64, f64)> {
        (0..count)
            .map(|i| (70.0 + (i % 3) as f64, 50.0 + (i % 2) as f64, 20.0))
            .collect()
    }

    #[test]
    fn test_elevated_stress_confidence() {
        let config = DetectorConfig::default();
        let snap = series(&[(80.0, 40.0, 90.0)], Duration::seconds(30));

        let pattern = elevated_stress(&snap, &config).unwrap();
        assert!((pattern.confidence - 0.9).abs() < 1e-9);
        assert!(pattern.indicators.contains("stress_level=90"));

        let calm = series(&[(80.0, 40.0, 80.0)], Duration::seconds(30));
        assert!(elevated_stress(&calm, &config).is_none());
    }

    #[test]
    fn test_absolute_heart_rate() {
        let config = DetectorConfig::default();
        let snap = series(&[(120.0, 40.0, 30.0)], Duration::seconds(30));

        let pattern = elevated_heart_rate(&snap, &config).unwrap();
        assert!((pattern.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_heart_rate_deviation_from_baseline() {
        let config = DetectorConfig::default();
        let mut readings = calm(15);
        readings.push((95.0, 50.0, 20.0));
        let snap = series(&readings, Duration::seconds(30));

        // 95 bpm is under the absolute ceiling, so only the baseline can fire.
        let pattern = elevated_heart_rate(&snap, &config).unwrap();
        assert!(pattern.confidence > 0.9);
        assert!(pattern.indicators.iter().any(|i| i.starts_with("heart_rate_z=")));
    }

    #[test]
    fn test_no_heart_rate_pattern_when_calm() {
        let config = DetectorConfig::default();
        let snap = series(&calm(20), Duration::seconds(30));
        assert!(elevated_heart_rate(&snap, &config).is_none());
        assert!(suppressed_hrv(&snap, &config).is_none());
        assert!(agitation_spikes(&snap, &config).is_none());
    }

    #[test]
    fn test_suppressed_hrv() {
        let config = DetectorConfig::default();
        let snap = series(&[(70.0, 5.0, 20.0)], Duration::seconds(30));
        let pattern = suppressed_hrv(&snap, &config).unwrap();
        assert!((pattern.confidence - 0.75).abs() < 1e-9);

        let mut readings = calm(15);
        readings.push((70.0, 40.0, 20.0));
        let snap = series(&readings, Duration::seconds(30));
        assert!(suppressed_hrv(&snap, &config).is_some());
    }

    #[test]
    fn test_agitation_spikes() {
        let config = DetectorConfig::default();
        let readings = [
            (70.0, 50.0, 20.0),
            (95.0, 50.0, 20.0),
            (72.0, 50.0, 20.0),
            (98.0, 50.0, 20.0),
            (75.0, 50.0, 20.0),
        ];
        let snap = series(&readings, Duration::seconds(10));
        let pattern = agitation_spikes(&snap, &config).unwrap();
        assert_eq!(pattern.category, PatternCategory::Behavioral);
        assert!(pattern.indicators.contains("heart_rate_spikes=4"));
        assert!((pattern.confidence - 4.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_rising_stress_trend() {
        let config = DetectorConfig::default();
        let readings: Vec<_> = (0..6).map(|i| (80.0, 40.0, 30.0 + 4.0 * i as f64)).collect();
        let snap = series(&readings, Duration::minutes(1));

        let pattern = rising_stress_trend(&snap, &config).unwrap();
        assert!((pattern.confidence - 1.0).abs() < 1e-9);

        let flat = series(&calm(6), Duration::minutes(1));
        assert!(rising_stress_trend(&flat, &config).is_none());
    }

    #[test]
    fn test_trend_needs_time_spread() {
        let config = DetectorConfig::default();
        let readings: Vec<_> = (0..6).map(|i| (80.0, 40.0, 30.0 + 4.0 * i as f64)).collect();
        let snap = series(&readings, Duration::zero());
        assert!(rising_stress_trend(&snap, &config).is_none());
    }

    #[test]
    fn test_sustained_high_stress() {
        let config = DetectorConfig::default();
        let mut readings: Vec<_> = (0..8).map(|_| (90.0, 30.0, 85.0)).collect();
        readings.push((80.0, 35.0, 60.0));
        let snap = series(&readings, Duration::minutes(1));

        let pattern = sustained_high_stress(&snap, &config).unwrap();
        assert!((pattern.confidence - 8.0 / 9.0).abs() < 1e-9);

        let short = series(&readings, Duration::seconds(10));
        assert!(sustained_high_stress(&short, &config).is_none());
    }

    #[test]
    fn test_sustained_span_beyond_i64_never_fires() {
        let config = DetectorConfig {
            sustained_min_secs: u64::MAX,
            ..Default::default()
        };
        let snap = series(&[(90.0, 30.0, 95.0)], Duration::minutes(1));
        assert!(sustained_high_stress(&snap, &config).is_none());
    }

    #[test]
    fn test_quiet_hours_uses_local_time() {
        let mut config = DetectorConfig::default();
        config.quiet_hours.timezone = "America/New_York".to_string();

        // 02:00 UTC is 21:00 in New York (EST).
        let late = Utc.with_ymd_and_hms(2024, 1, 15, 2, 0, 0).unwrap();
        let snap = WindowSnapshot::from_samples(vec![BiometricData::new(90.0, 30.0, 70.0, late)]);
        let pattern = quiet_hours_arousal(&snap, &config).unwrap();
        assert!(pattern.indicators.contains("local_hour=21"));

        let snap = series(&[(90.0, 30.0, 70.0)], Duration::seconds(1));
        assert!(quiet_hours_arousal(&snap, &config).is_none());
    }

    #[test]
    fn test_least_squares_slope() {
        let slope = least_squares_slope(&[0.0, 1.0, 2.0], &[1.0, 3.0, 5.0]).unwrap();
        assert!((slope - 2.0).abs() < 1e-9);

        let falling = least_squares_slope(&[0.0, 1.0, 2.0, 3.0], &[9.0, 7.0, 6.0, 2.0]).unwrap();
        assert!((falling + 2.2).abs() < 1e-9);

        assert!(least_squares_slope(&[1.0], &[1.0]).is_none());
        assert!(least_squares_slope(&[2.0, 2.0], &[1.0, 5.0]).is_none());
    }

    #[test]
    fn test_builtin_rule_ids_unique() {
        let rules = builtin_rules();
        let mut ids: Vec<_> = rules.iter().map(|r| r.id().to_string()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), rules.len());
    }
}
