//! Rolling feature window over recent biometric samples.
//!
//! The window keeps samples sorted by timestamp and bounded both by a
//! retention horizon and a sample cap. Snapshots are copied out on read, so a
//! snapshot handed to the detector stays valid while the window keeps moving.

use crate::config::ConfigError;
use crate::device::types::{BiometricData, Signal};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Upper bound accepted for the retention horizon (one week).
const MAX_RETENTION_SECS: u64 = 7 * 24 * 60 * 60;

/// Retention policy for a feature window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Samples older than `latest - retention` are evicted
    pub retention_secs: u64,
    /// Maximum number of samples kept, oldest evicted first
    pub max_samples: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            retention_secs: 30 * 60,
            max_samples: 120,
        }
    }
}

impl WindowConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retention_secs == 0 || self.retention_secs > MAX_RETENTION_SECS {
            return Err(ConfigError::InvalidThreshold(format!(
                "window.retention_secs must be in 1..={MAX_RETENTION_SECS}, got {}",
                self.retention_secs
            )));
        }
        if self.max_samples == 0 {
            return Err(ConfigError::InvalidThreshold(
                "window.max_samples must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn horizon(&self) -> Duration {
        Duration::seconds(self.retention_secs.min(MAX_RETENTION_SECS) as i64)
    }
}

/// Immutable, cheaply clonable view of a window at one point in time.
#[derive(Debug, Clone)]
pub struct WindowSnapshot {
    samples: Arc<[BiometricData]>,
}

impl WindowSnapshot {
    pub fn empty() -> Self {
        Self {
            samples: Arc::from(Vec::new()),
        }
    }

    /// Build a snapshot from samples, sorting them by timestamp.
    pub fn from_samples(mut samples: Vec<BiometricData>) -> Self {
        samples.sort_by_key(|s| s.timestamp());
        Self {
            samples: Arc::from(samples),
        }
    }

    pub fn samples(&self) -> &[BiometricData] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&BiometricData> {
        self.samples.last()
    }

    pub fn earliest(&self) -> Option<&BiometricData> {
        self.samples.first()
    }

    /// Time between the oldest and newest sample.
    pub fn span(&self) -> Duration {
        match (self.earliest(), self.latest()) {
            (Some(first), Some(last)) => last.timestamp() - first.timestamp(),
            _ => Duration::zero(),
        }
    }

    /// All values of one signal, oldest first.
    pub fn values(&self, signal: Signal) -> Vec<f64> {
        self.samples.iter().map(|s| s.signal(signal)).collect()
    }
}

/// Bounded rolling history of samples for one session.
#[derive(Debug)]
pub struct FeatureWindow {
    horizon: Duration,
    max_samples: usize,
    samples: VecDeque<BiometricData>,
}

impl FeatureWindow {
    pub fn new(config: &WindowConfig) -> Self {
        Self {
            horizon: config.horizon(),
            max_samples: config.max_samples.max(1),
            samples: VecDeque::with_capacity(config.max_samples.min(1024)),
        }
    }

    /// Add a sample, keeping timestamp order, then apply retention.
    pub fn push(&mut self, sample: BiometricData) {
        let ts = sample.timestamp();
        if self.samples.back().map_or(true, |last| last.timestamp() <= ts) {
            self.samples.push_back(sample);
        } else {
            let idx = self.samples.partition_point(|s| s.timestamp() <= ts);
            self.samples.insert(idx, sample);
        }

        self.evict_older_than(self.horizon);
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Copy the current contents into an immutable snapshot.
    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            samples: self.samples.iter().copied().collect(),
        }
    }

    /// Drop samples older than `latest - horizon`. Returns the number evicted.
    ///
    /// A cutoff that falls outside the representable time range evicts
    /// nothing.
    pub fn evict_older_than(&mut self, horizon: Duration) -> usize {
        let Some(cutoff) = self
            .latest_timestamp()
            .and_then(|latest| latest.checked_sub_signed(horizon))
        else {
            return 0;
        };

        let mut evicted = 0;
        while self
            .samples
            .front()
            .is_some_and(|s| s.timestamp() < cutoff)
        {
            self.samples.pop_front();
            evicted += 1;
        }
        evicted
    }

    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.samples.back().map(|s| s.timestamp())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
