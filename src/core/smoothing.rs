//! Hysteresis over resolved warning levels.
//!
//! The resolver itself is stateless and may flap between adjacent levels on
//! noisy data. The smoother sits after it: upgrades apply immediately, a
//! downgrade only after a run of consecutive lower evaluations.

use crate::config::ConfigError;
use crate::core::resolver::WarningLevel;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmootherConfig {
    /// Consecutive lower evaluations required before downgrading (1 = off)
    pub downgrade_after: u32,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self { downgrade_after: 3 }
    }
}

impl SmootherConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.downgrade_after == 0 {
            return Err(ConfigError::InvalidThreshold(
                "smoothing.downgrade_after must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LevelSmoother {
    downgrade_after: u32,
    current: WarningLevel,
    /// Highest lower level seen during the pending downgrade and the streak length
    pending: Option<(WarningLevel, u32)>,
}

impl LevelSmoother {
    pub fn new(config: &SmootherConfig) -> Self {
        Self {
            downgrade_after: config.downgrade_after.max(1),
            current: WarningLevel::Normal,
            pending: None,
        }
    }

    pub fn current(&self) -> WarningLevel {
        self.current
    }

    /// Feed one raw level and return the smoothed level.
    pub fn update(&mut self, raw: WarningLevel) -> WarningLevel {
        if raw >= self.current {
            self.current = raw;
            self.pending = None;
            return self.current;
        }

        let (candidate, streak) = match self.pending {
            Some((level, n)) => (level.max(raw), n + 1),
            None => (raw, 1),
        };

        if streak >= self.downgrade_after {
            self.current = candidate;
            self.pending = None;
        } else {
            self.pending = Some((candidate, streak));
        }
        self.current
    }

    pub fn reset(&mut self) {
        self.current = WarningLevel::Normal;
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resolver::WarningLevel::*;

    fn smoother(downgrade_after: u32) -> LevelSmoother {
        LevelSmoother::new(&SmootherConfig { downgrade_after })
    }

    #[test]
    fn test_upgrade_is_immediate() {
        let mut s = smoother(3);
        assert_eq!(s.update(Alert), Alert);
    }

    #[test]
    fn test_downgrade_waits_for_streak() {
        let mut s = smoother(3);
        s.update(Alert);

        assert_eq!(s.update(Normal), Alert);
        assert_eq!(s.update(Watch), Alert);
        // Goes to the highest level seen during the streak.
        assert_eq!(s.update(Normal), Watch);
    }

    #[test]
    fn test_upgrade_interrupts_pending_downgrade() {
        let mut s = smoother(2);
        s.update(Watch);
        assert_eq!(s.update(Normal), Watch);
        assert_eq!(s.update(Watch), Watch);
        assert_eq!(s.update(Normal), Watch);
        assert_eq!(s.update(Normal), Normal);
    }

    #[test]
    fn test_disabled_smoothing() {
        let mut s = smoother(1);
        s.update(Alert);
        assert_eq!(s.update(Notice), Notice);
    }

    #[test]
    fn test_zero_streak_rejected() {
        assert!(SmootherConfig { downgrade_after: 0 }.validate().is_err());
    }
}
