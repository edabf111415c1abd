//! Biometric sample types delivered by the device collaborator.
//!
//! A sample is immutable once constructed. The wire form is the camelCase JSON
//! emitted by the wearable bridge, with an ISO-8601 timestamp. Unknown fields
//! are rejected so that loosely shaped payloads never reach the window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One reading from a wearable device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BiometricData {
    heart_rate: f64,
    hrv: f64,
    stress_level: f64,
    timestamp: DateTime<Utc>,
}

impl BiometricData {
    pub fn new(heart_rate: f64, hrv: f64, stress_level: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            heart_rate,
            hrv,
            stress_level,
            timestamp,
        }
    }

    /// Heart rate in beats per minute.
    pub fn heart_rate(&self) -> f64 {
        self.heart_rate
    }

    /// Heart rate variability (RMSSD) in milliseconds.
    pub fn hrv(&self) -> f64 {
        self.hrv
    }

    /// Device-reported stress level on a 0-100 scale.
    pub fn stress_level(&self) -> f64 {
        self.stress_level
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Read a single signal by name.
    pub fn signal(&self, signal: Signal) -> f64 {
        match signal {
            Signal::HeartRate => self.heart_rate,
            Signal::Hrv => self.hrv,
            Signal::StressLevel => self.stress_level,
        }
    }
}

/// The physiological signals carried by a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    HeartRate,
    Hrv,
    StressLevel,
}

impl Signal {
    pub const ALL: [Signal; 3] = [Signal::HeartRate, Signal::Hrv, Signal::StressLevel];

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::HeartRate => "heart_rate",
            Signal::Hrv => "hrv",
            Signal::StressLevel => "stress_level",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a monitoring session (one wearer, one device connection).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a session ID with the given prefix and a random suffix.
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{prefix}-{}", &Uuid::new_v4().simple().to_string()[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A sample tagged with the session it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeviceFrame {
    pub session_id: SessionId,
    pub sample: BiometricData,
}

impl DeviceFrame {
    pub fn new(session_id: impl Into<SessionId>, sample: BiometricData) -> Self {
        Self {
            session_id: session_id.into(),
            sample,
        }
    }
}
