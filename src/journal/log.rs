//! Cumulative journal of warning activity.
//!
//! The journal counts what the pipeline has done across sessions without
//! retaining any raw biometric readings. Counts can be persisted so that a
//! caregiver can review activity across runs.

use crate::core::resolver::WarningLevel;
use crate::journal::events::{EventSink, WarningEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for warning activity.
#[derive(Debug)]
pub struct Journal {
    /// Sessions opened
    sessions_started: AtomicU64,
    /// Sessions closed
    sessions_ended: AtomicU64,
    /// Samples accepted, reported when a session ends
    samples_accepted: AtomicU64,
    /// Samples rejected at ingestion
    samples_rejected: AtomicU64,
    /// Changes in the detected pattern set
    pattern_updates: AtomicU64,
    /// Warning level transitions
    level_changes: AtomicU64,
    /// Transitions into the alert level
    alerts_raised: AtomicU64,
    /// Journal start time
    started_at: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl Journal {
    pub fn new() -> Self {
        Self {
            sessions_started: AtomicU64::new(0),
            sessions_ended: AtomicU64::new(0),
            samples_accepted: AtomicU64::new(0),
            samples_rejected: AtomicU64::new(0),
            pattern_updates: AtomicU64::new(0),
            level_changes: AtomicU64::new(0),
            alerts_raised: AtomicU64::new(0),
            started_at: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a journal that loads and saves its counters at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut journal = Self::new();
        journal.persist_path = Some(path);

        if let Err(e) = journal.load() {
            tracing::warn!(error = %e, "could not load previous journal counters");
        }

        journal
    }

    pub fn stats(&self) -> JournalStats {
        JournalStats {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_ended: self.sessions_ended.load(Ordering::Relaxed),
            samples_accepted: self.samples_accepted.load(Ordering::Relaxed),
            samples_rejected: self.samples_rejected.load(Ordering::Relaxed),
            pattern_updates: self.pattern_updates.load(Ordering::Relaxed),
            level_changes: self.level_changes.load(Ordering::Relaxed),
            alerts_raised: self.alerts_raised.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Journal:\n\
             - Sessions started: {}\n\
             - Sessions ended: {}\n\
             - Samples accepted: {}\n\
             - Samples rejected: {}\n\
             - Pattern updates: {}\n\
             - Level changes: {}\n\
             - Alerts raised: {}\n\
             - Uptime: {} seconds",
            stats.sessions_started,
            stats.sessions_ended,
            stats.samples_accepted,
            stats.samples_rejected,
            stats.pattern_updates,
            stats.level_changes,
            stats.alerts_raised,
            stats.uptime_secs
        )
    }

    /// Save counters to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                sessions_started: stats.sessions_started,
                sessions_ended: stats.sessions_ended,
                samples_accepted: stats.samples_accepted,
                samples_rejected: stats.samples_rejected,
                pattern_updates: stats.pattern_updates,
                level_changes: stats.level_changes,
                alerts_raised: stats.alerts_raised,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.sessions_started
                    .store(persisted.sessions_started, Ordering::Relaxed);
                self.sessions_ended
                    .store(persisted.sessions_ended, Ordering::Relaxed);
                self.samples_accepted
                    .store(persisted.samples_accepted, Ordering::Relaxed);
                self.samples_rejected
                    .store(persisted.samples_rejected, Ordering::Relaxed);
                self.pattern_updates
                    .store(persisted.pattern_updates, Ordering::Relaxed);
                self.level_changes
                    .store(persisted.level_changes, Ordering::Relaxed);
                self.alerts_raised
                    .store(persisted.alerts_raised, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.sessions_started,
            &self.sessions_ended,
            &self.samples_accepted,
            &self.samples_rejected,
            &self.pattern_updates,
            &self.level_changes,
            &self.alerts_raised,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for Journal {
    fn record(&self, event: &WarningEvent) {
        match event {
            WarningEvent::SessionStarted { .. } => {
                self.sessions_started.fetch_add(1, Ordering::Relaxed);
            }
            WarningEvent::SampleRejected { .. } => {
                self.samples_rejected.fetch_add(1, Ordering::Relaxed);
            }
            WarningEvent::PatternsDetected { .. } => {
                self.pattern_updates.fetch_add(1, Ordering::Relaxed);
            }
            WarningEvent::LevelChanged { to, .. } => {
                self.level_changes.fetch_add(1, Ordering::Relaxed);
                if *to == WarningLevel::Alert {
                    self.alerts_raised.fetch_add(1, Ordering::Relaxed);
                }
            }
            WarningEvent::SessionEnded {
                samples_accepted, ..
            } => {
                self.sessions_ended.fetch_add(1, Ordering::Relaxed);
                self.samples_accepted
                    .fetch_add(*samples_accepted, Ordering::Relaxed);
            }
        }
    }
}

/// Snapshot of journal counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalStats {
    pub sessions_started: u64,
    pub sessions_ended: u64,
    pub samples_accepted: u64,
    pub samples_rejected: u64,
    pub pattern_updates: u64,
    pub level_changes: u64,
    pub alerts_raised: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    sessions_started: u64,
    sessions_ended: u64,
    samples_accepted: u64,
    samples_rejected: u64,
    pattern_updates: u64,
    level_changes: u64,
    alerts_raised: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared journal.
pub type SharedJournal = Arc<Journal>;

pub fn create_shared_journal() -> SharedJournal {
    Arc::new(Journal::new())
}

pub fn create_shared_journal_with_persistence(path: PathBuf) -> SharedJournal {
    Arc::new(Journal::with_persistence(path))
}
