//! Sample ingestion: validation at the boundary between device and window.
//!
//! A sample is accepted only if it is physiologically plausible and does not
//! precede the last accepted sample of its session. Rejected samples leave
//! the window untouched.

use crate::config::ConfigError;
use crate::core::window::FeatureWindow;
use crate::device::types::{BiometricData, DeviceFrame, SessionId, Signal};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a sample cannot enter the window.
///
/// All variants are recoverable: the sample is dropped and the session
/// continues.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IngestError {
    #[error("sample at {timestamp} precedes last accepted sample at {last_accepted}")]
    OutOfOrder {
        timestamp: DateTime<Utc>,
        last_accepted: DateTime<Utc>,
    },

    #[error("{signal} value {value} outside accepted range {range}")]
    OutOfRange {
        signal: Signal,
        value: f64,
        range: String,
    },

    #[error("malformed sample: {0}")]
    Malformed(String),
}

impl IngestError {
    /// Short machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::OutOfOrder { .. } => "OUT_OF_ORDER",
            IngestError::OutOfRange { .. } => "OUT_OF_RANGE",
            IngestError::Malformed(_) => "MALFORMED",
        }
    }
}

/// Supported timestamp range: the Unix epoch through the end of year 9999.
const MIN_TIMESTAMP_SECS: i64 = 0;
const MAX_TIMESTAMP_SECS: i64 = 253_402_300_799;

/// Plausibility limits applied to every incoming sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestLimits {
    /// Heart rate must be strictly above this value (bpm)
    pub heart_rate_floor_bpm: f64,
    /// Heart rate must not exceed this value (bpm)
    pub heart_rate_ceiling_bpm: f64,
    /// HRV must be at least this value (ms)
    pub hrv_floor_ms: f64,
    /// HRV must not exceed this value (ms)
    pub hrv_ceiling_ms: f64,
    /// Stress level lower bound (inclusive)
    pub stress_min: f64,
    /// Stress level upper bound (inclusive)
    pub stress_max: f64,
}

impl Default for IngestLimits {
    fn default() -> Self {
        Self {
            heart_rate_floor_bpm: 0.0,
            heart_rate_ceiling_bpm: 300.0,
            hrv_floor_ms: 0.0,
            hrv_ceiling_ms: 500.0,
            stress_min: 0.0,
            stress_max: 100.0,
        }
    }
}

impl IngestLimits {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pairs = [
            (
                "heart_rate",
                self.heart_rate_floor_bpm,
                self.heart_rate_ceiling_bpm,
            ),
            ("hrv", self.hrv_floor_ms, self.hrv_ceiling_ms),
            ("stress", self.stress_min, self.stress_max),
        ];
        for (name, low, high) in pairs {
            if !low.is_finite() || !high.is_finite() || low >= high {
                return Err(ConfigError::InvalidThreshold(format!(
                    "ingest limits for {name} must be finite with floor < ceiling, got [{low}, {high}]"
                )));
            }
        }
        Ok(())
    }

    /// Check one sample against the limits.
    pub fn check(&self, sample: &BiometricData) -> Result<(), IngestError> {
        let ts = sample.timestamp();
        if !(MIN_TIMESTAMP_SECS..=MAX_TIMESTAMP_SECS).contains(&ts.timestamp()) {
            return Err(IngestError::Malformed(format!(
                "timestamp {ts} outside supported range"
            )));
        }

        let hr = sample.heart_rate();
        if !hr.is_finite() || hr <= self.heart_rate_floor_bpm || hr > self.heart_rate_ceiling_bpm {
            return Err(IngestError::OutOfRange {
                signal: Signal::HeartRate,
                value: hr,
                range: format!(
                    "({}, {}]",
                    self.heart_rate_floor_bpm, self.heart_rate_ceiling_bpm
                ),
            });
        }

        let hrv = sample.hrv();
        if !hrv.is_finite() || hrv < self.hrv_floor_ms || hrv > self.hrv_ceiling_ms {
            return Err(IngestError::OutOfRange {
                signal: Signal::Hrv,
                value: hrv,
                range: format!("[{}, {}]", self.hrv_floor_ms, self.hrv_ceiling_ms),
            });
        }

        let stress = sample.stress_level();
        if !stress.is_finite() || stress < self.stress_min || stress > self.stress_max {
            return Err(IngestError::OutOfRange {
                signal: Signal::StressLevel,
                value: stress,
                range: format!("[{}, {}]", self.stress_min, self.stress_max),
            });
        }

        Ok(())
    }
}

/// Per-session ingestion state.
#[derive(Debug)]
pub struct SampleIngestor {
    limits: IngestLimits,
    last_accepted: Option<DateTime<Utc>>,
    accepted: u64,
    rejected: u64,
}

impl SampleIngestor {
    pub fn new(limits: IngestLimits) -> Self {
        Self {
            limits,
            last_accepted: None,
            accepted: 0,
            rejected: 0,
        }
    }

    /// Validate a sample and append it to the window.
    pub fn ingest(
        &mut self,
        sample: BiometricData,
        window: &mut FeatureWindow,
    ) -> Result<(), IngestError> {
        if let Err(e) = self.check(&sample) {
            self.rejected += 1;
            return Err(e);
        }

        window.push(sample);
        self.last_accepted = Some(sample.timestamp());
        self.accepted += 1;
        Ok(())
    }

    fn check(&self, sample: &BiometricData) -> Result<(), IngestError> {
        if let Some(last) = self.last_accepted {
            if sample.timestamp() < last {
                return Err(IngestError::OutOfOrder {
                    timestamp: sample.timestamp(),
                    last_accepted: last,
                });
            }
        }
        self.limits.check(sample)
    }

    pub fn last_accepted(&self) -> Option<DateTime<Utc>> {
        self.last_accepted
    }

    pub fn accepted_count(&self) -> u64 {
        self.accepted
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }
}

/// Decode one JSON line into a sample.
pub fn decode_sample(json: &str) -> Result<BiometricData, IngestError> {
    serde_json::from_str(json).map_err(|e| IngestError::Malformed(e.to_string()))
}

/// Decode one JSON line into a frame.
///
/// Lines carrying a bare sample are accepted only when a fallback session is
/// given.
pub fn decode_frame(
    json: &str,
    fallback_session: Option<&SessionId>,
) -> Result<DeviceFrame, IngestError> {
    match serde_json::from_str::<DeviceFrame>(json) {
        Ok(frame) => Ok(frame),
        Err(frame_err) => match fallback_session {
            Some(session) => {
                let sample = decode_sample(json)?;
                Ok(DeviceFrame::new(session.clone(), sample))
            }
            None => Err(IngestError::Malformed(frame_err.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::window::WindowConfig;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn setup() -> (SampleIngestor, FeatureWindow) {
        (
            SampleIngestor::new(IngestLimits::default()),
            FeatureWindow::new(&WindowConfig::default()),
        )
    }

    #[test]
    fn test_accepts_valid_sample() {
        let (mut ingestor, mut window) = setup();
        ingestor
            .ingest(BiometricData::new(72.0, 45.0, 30.0, at(0)), &mut window)
            .unwrap();

        assert_eq!(window.len(), 1);
        assert_eq!(ingestor.accepted_count(), 1);
        assert_eq!(ingestor.last_accepted(), Some(at(0)));
    }

    #[test]
    fn test_out_of_order_leaves_window_unchanged() {
        let (mut ingestor, mut window) = setup();
        ingestor
            .ingest(BiometricData::new(72.0, 45.0, 30.0, at(10)), &mut window)
            .unwrap();

        let err = ingestor
            .ingest(BiometricData::new(72.0, 45.0, 30.0, at(5)), &mut window)
            .unwrap_err();

        assert!(matches!(err, IngestError::OutOfOrder { .. }));
        assert_eq!(window.len(), 1);
        assert_eq!(ingestor.rejected_count(), 1);
    }

    #[test]
    fn test_equal_timestamp_accepted() {
        let (mut ingestor, mut window) = setup();
        ingestor
            .ingest(BiometricData::new(72.0, 45.0, 30.0, at(10)), &mut window)
            .unwrap();
        assert!(ingestor
            .ingest(BiometricData::new(74.0, 44.0, 31.0, at(10)), &mut window)
            .is_ok());
    }

    #[test]
    fn test_out_of_range_values() {
        let (mut ingestor, mut window) = setup();
        let cases = [
            (BiometricData::new(0.0, 45.0, 30.0, at(0)), Signal::HeartRate),
            (BiometricData::new(301.0, 45.0, 30.0, at(0)), Signal::HeartRate),
            (BiometricData::new(f64::NAN, 45.0, 30.0, at(0)), Signal::HeartRate),
            (BiometricData::new(72.0, -1.0, 30.0, at(0)), Signal::Hrv),
            (BiometricData::new(72.0, 550.0, 30.0, at(0)), Signal::Hrv),
            (BiometricData::new(72.0, 45.0, 100.5, at(0)), Signal::StressLevel),
            (BiometricData::new(72.0, 45.0, -0.1, at(0)), Signal::StressLevel),
        ];

        for (sample, expected) in cases {
            match ingestor.ingest(sample, &mut window) {
                Err(IngestError::OutOfRange { signal, .. }) => assert_eq!(signal, expected),
                other => panic!("expected out of range for {expected}, got {other:?}"),
            }
        }
        assert!(window.is_empty());
    }

    #[test]
    fn test_boundaries_accepted() {
        let (mut ingestor, mut window) = setup();
        assert!(ingestor
            .ingest(BiometricData::new(300.0, 0.0, 100.0, at(0)), &mut window)
            .is_ok());
        assert!(ingestor
            .ingest(BiometricData::new(1.0, 0.0, 0.0, at(1)), &mut window)
            .is_ok());
    }

    #[test]
    fn test_extreme_timestamp_rejected() {
        let line = r#"{"heartRate":80,"hrv":40,"stressLevel":50,"timestamp":"-262143-01-01T00:00:00Z"}"#;
        let sample = decode_sample(line).unwrap();

        let (mut ingestor, mut window) = setup();
        let err = ingestor.ingest(sample, &mut window).unwrap_err();

        assert!(matches!(err, IngestError::Malformed(_)));
        assert!(window.is_empty());
        assert_eq!(ingestor.last_accepted(), None);
        assert!(ingestor
            .ingest(BiometricData::new(72.0, 45.0, 30.0, at(0)), &mut window)
            .is_ok());
    }

    #[test]
    fn test_decode_frame_with_fallback() {
        let line = r#"{"heartRate":80,"hrv":40,"stressLevel":50,"timestamp":"2024-01-15T12:00:00Z"}"#;
        assert!(matches!(
            decode_frame(line, None),
            Err(IngestError::Malformed(_))
        ));

        let session = SessionId::new("band-1");
        let frame = decode_frame(line, Some(&session)).unwrap();
        assert_eq!(frame.session_id, session);
        assert_eq!(frame.sample.heart_rate(), 80.0);
    }

    #[test]
    fn test_decode_tagged_frame() {
        let line = r#"{"sessionId":"s-9","sample":{"heartRate":80,"hrv":40,"stressLevel":50,"timestamp":"2024-01-15T12:00:00Z"}}"#;
        let frame = decode_frame(line, Some(&SessionId::new("ignored"))).unwrap();
        assert_eq!(frame.session_id.as_str(), "s-9");
    }

    #[test]
    fn test_limits_validation() {
        let limits = IngestLimits {
            stress_min: 100.0,
            stress_max: 0.0,
            ..Default::default()
        };
        assert!(limits.validate().is_err());
        assert!(IngestLimits::default().validate().is_ok());
    }
}
