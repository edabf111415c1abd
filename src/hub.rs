//! Multi-session routing.
//!
//! The hub gives every session its own worker thread and bounded queue, so
//! one session is always processed sequentially in arrival order while
//! independent sessions run in parallel. Workers share nothing mutable
//! except the projection map they publish assessments into.

use crate::core::engine::WarningEngine;
use crate::core::session::{Assessment, SessionSummary};
use crate::device::types::{BiometricData, DeviceFrame, SessionId};
use crate::journal::events::SharedSink;
use crossbeam_channel::{bounded, Sender};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::JoinHandle;
use thiserror::Error;

/// Latest assessment per session, shared with readers.
pub type Projections = Arc<RwLock<HashMap<SessionId, Assessment>>>;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("Worker for session {0} has stopped")]
    WorkerStopped(SessionId),

    #[error("Failed to spawn session worker: {0}")]
    Spawn(#[from] std::io::Error),
}

struct Worker {
    sender: Sender<BiometricData>,
    handle: JoinHandle<SessionSummary>,
}

/// Routes device frames to per-session pipelines.
pub struct SessionHub {
    engine: WarningEngine,
    sink: SharedSink,
    queue_capacity: usize,
    workers: HashMap<SessionId, Worker>,
    projections: Projections,
}

impl SessionHub {
    pub fn new(engine: WarningEngine, sink: SharedSink, queue_capacity: usize) -> Self {
        Self {
            engine,
            sink,
            queue_capacity: queue_capacity.max(1),
            workers: HashMap::new(),
            projections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Queue a frame for its session, starting a worker on first use.
    ///
    /// Blocks while the session's queue is full.
    pub fn submit(&mut self, frame: DeviceFrame) -> Result<(), HubError> {
        let DeviceFrame { session_id, sample } = frame;

        if !self.workers.contains_key(&session_id) {
            let worker = self.spawn_worker(session_id.clone())?;
            self.workers.insert(session_id.clone(), worker);
        }

        let Some(worker) = self.workers.get(&session_id) else {
            return Err(HubError::WorkerStopped(session_id));
        };
        if worker.sender.send(sample).is_err() {
            // The worker is gone; forget it so a later frame can restart the session.
            self.workers.remove(&session_id);
            return Err(HubError::WorkerStopped(session_id));
        }
        Ok(())
    }

    fn spawn_worker(&self, session_id: SessionId) -> Result<Worker, HubError> {
        let (sender, receiver) = bounded::<BiometricData>(self.queue_capacity);
        let mut pipeline = self.engine.open_session(session_id.clone(), self.sink.clone());
        let projections = Arc::clone(&self.projections);

        let handle = std::thread::Builder::new()
            .name(format!("session-{session_id}"))
            .spawn(move || {
                for sample in receiver.iter() {
                    // Rejections are already logged and recorded by the pipeline.
                    if let Ok(assessment) = pipeline.ingest(sample) {
                        projections
                            .write()
                            .unwrap_or_else(PoisonError::into_inner)
                            .insert(session_id.clone(), assessment);
                    }
                }
                pipeline.end()
            })?;

        Ok(Worker { sender, handle })
    }

    /// Latest assessment for a session.
    pub fn projection(&self, session_id: &SessionId) -> Option<Assessment> {
        self.projections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    /// Latest assessment of every session.
    pub fn projections(&self) -> HashMap<SessionId, Assessment> {
        self.projections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Shared handle to the projection map.
    pub fn projection_handle(&self) -> Projections {
        Arc::clone(&self.projections)
    }

    pub fn active_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.workers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drain and close one session. Returns `None` for an unknown session.
    pub fn end_session(&mut self, session_id: &SessionId) -> Result<Option<SessionSummary>, HubError> {
        let Some(worker) = self.workers.remove(session_id) else {
            return Ok(None);
        };

        let summary = Self::join(session_id, worker)?;
        self.projections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
        Ok(Some(summary))
    }

    /// Drain and close every session, returning summaries ordered by session id.
    pub fn shutdown(mut self) -> Vec<SessionSummary> {
        let mut summaries = Vec::with_capacity(self.workers.len());
        for (session_id, worker) in self.workers.drain() {
            match Self::join(&session_id, worker) {
                Ok(summary) => summaries.push(summary),
                Err(e) => tracing::error!(error = %e, "session worker failed"),
            }
        }
        summaries.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        summaries
    }

    fn join(session_id: &SessionId, worker: Worker) -> Result<SessionSummary, HubError> {
        let Worker { sender, handle } = worker;
        drop(sender);
        handle
            .join()
            .map_err(|_| HubError::WorkerStopped(session_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::EngineConfig;
    use crate::core::resolver::WarningLevel;
    use crate::journal::events::MemorySink;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn hub() -> (SessionHub, Arc<MemorySink>) {
        let engine = WarningEngine::new(EngineConfig::default()).unwrap();
        let sink = Arc::new(MemorySink::new());
        (SessionHub::new(engine, sink.clone(), 8), sink)
    }

    #[test]
    fn test_sessions_are_independent() {
        let (mut hub, _sink) = hub();

        for i in 0..5 {
            hub.submit(DeviceFrame::new("calm", BiometricData::new(72.0, 50.0, 20.0, at(i))))
                .unwrap();
        }
        hub.submit(DeviceFrame::new("stressed", BiometricData::new(180.0, 15.0, 90.0, at(0))))
            .unwrap();
        // Earlier than the calm session's latest sample, but a different session.
        hub.submit(DeviceFrame::new("stressed", BiometricData::new(181.0, 15.0, 91.0, at(1))))
            .unwrap();

        assert_eq!(hub.active_sessions().len(), 2);

        let summaries = hub.shutdown();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].session_id.as_str(), "calm");
        assert_eq!(summaries[0].samples_accepted, 5);
        assert_eq!(summaries[0].final_level, WarningLevel::Normal);
        assert_eq!(summaries[1].samples_accepted, 2);
        assert_eq!(summaries[1].final_level, WarningLevel::Alert);
    }

    #[test]
    fn test_projection_published() {
        let (mut hub, _sink) = hub();
        let id = SessionId::new("band-7");
        hub.submit(DeviceFrame::new(id.clone(), BiometricData::new(180.0, 15.0, 90.0, at(0))))
            .unwrap();

        let projections = hub.projection_handle();
        let summary = hub.end_session(&id).unwrap().unwrap();
        assert_eq!(summary.final_level, WarningLevel::Alert);
        assert!(projections.read().unwrap().get(&id).is_none());
        assert!(hub.active_sessions().is_empty());
    }

    #[test]
    fn test_projection_visible_while_running() {
        let (mut hub, _sink) = hub();
        let id = SessionId::new("band-8");
        hub.submit(DeviceFrame::new(id.clone(), BiometricData::new(72.0, 50.0, 20.0, at(0))))
            .unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        let mut seen = None;
        while std::time::Instant::now() < deadline {
            seen = hub.projection(&id);
            if seen.is_some() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }

        let assessment = seen.unwrap();
        assert_eq!(assessment.sample_count, 1);
        assert_eq!(hub.projections().len(), 1);
        hub.shutdown();
    }

    #[test]
    fn test_unknown_session_end() {
        let (mut hub, _sink) = hub();
        assert!(hub.end_session(&SessionId::new("nope")).unwrap().is_none());
    }

    #[test]
    fn test_lifecycle_events() {
        let (mut hub, sink) = hub();
        hub.submit(DeviceFrame::new("s", BiometricData::new(72.0, 50.0, 20.0, at(0))))
            .unwrap();
        hub.shutdown();

        let kinds: Vec<_> = sink.events().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds.first(), Some(&"session_started"));
        assert_eq!(kinds.last(), Some(&"session_ended"));
    }
}
