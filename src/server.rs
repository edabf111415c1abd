//! HTTP server for receiving device frames.
//!
//! This module provides an HTTP server that:
//! - Accepts tagged biometric samples via POST /ingest
//! - Runs them through the session's early-warning pipeline
//! - Returns the resulting assessment to the caller
//!
//! # Architecture
//!
//! ```text
//! Device bridge ──→ POST /ingest ──→ session pipeline ──→ Assessment
//!                                          ↓
//!                                  [journal, gateway]
//! ```

use crate::core::engine::{EngineConfig, WarningEngine};
use crate::core::ingest::IngestError;
use crate::core::session::{Assessment, SessionPipeline, SessionSummary};
use crate::device::types::{DeviceFrame, SessionId};
use crate::gateway::{GatewayConfig, GatewaySink};
use crate::journal::events::{FanoutSink, SharedSink};
use crate::journal::log::{create_shared_journal, create_shared_journal_with_persistence, SharedJournal};
use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Thresholds for every session the server opens
    pub engine: EngineConfig,
    /// Backend for forwarding warning events
    pub gateway: Option<GatewayConfig>,
    /// Where the journal counters are persisted
    pub journal_path: Option<PathBuf>,
    /// Sessions without a sample for this long are ended (`None` keeps them
    /// until DELETE)
    pub idle_timeout: Option<Duration>,
}

/// Default idle timeout, matching the default window retention.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

impl ServerConfig {
    pub fn new(port: u16, engine: EngineConfig) -> Self {
        Self {
            port,
            engine,
            gateway: None,
            journal_path: None,
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
        }
    }

    pub fn with_gateway(mut self, gateway: GatewayConfig) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_journal(mut self, path: PathBuf) -> Self {
        self.journal_path = Some(path);
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

/// One open session and when it last received a sample.
struct SessionSlot {
    /// `None` once the session has been ended
    pipeline: Option<SessionPipeline>,
    last_seen: Instant,
}

type SharedPipeline = Arc<Mutex<SessionSlot>>;

/// Shared server state
pub struct ServerState {
    engine: WarningEngine,
    sink: SharedSink,
    journal: SharedJournal,
    sessions: RwLock<HashMap<SessionId, SharedPipeline>>,
}

impl ServerState {
    pub fn new(config: &ServerConfig) -> anyhow::Result<Self> {
        let engine = WarningEngine::new(config.engine.clone())?;

        let journal = match &config.journal_path {
            Some(path) => create_shared_journal_with_persistence(path.clone()),
            None => create_shared_journal(),
        };

        let mut sink = FanoutSink::new().with(journal.clone());
        if let Some(gateway) = &config.gateway {
            // The forwarder thread exits when the last sink handle is dropped.
            let (gateway_sink, _handle) = GatewaySink::spawn(gateway.clone())?;
            sink.push(Arc::new(gateway_sink));
        }

        Ok(Self {
            engine,
            sink: Arc::new(sink),
            journal,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    async fn pipeline(&self, session_id: &SessionId) -> SharedPipeline {
        if let Some(pipeline) = self.sessions.read().await.get(session_id) {
            return pipeline.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(SessionSlot {
                    pipeline: Some(self.engine.open_session(session_id.clone(), self.sink.clone())),
                    last_seen: Instant::now(),
                }))
            })
            .clone()
    }

    /// End every session idle for at least `idle_timeout`. Sessions busy with
    /// a request are skipped.
    async fn end_idle_sessions(&self, idle_timeout: Duration) -> Vec<SessionSummary> {
        let mut summaries = Vec::new();
        {
            let mut sessions = self.sessions.write().await;
            sessions.retain(|session_id, pipeline| {
                let Ok(mut slot) = pipeline.try_lock() else {
                    return true;
                };
                if slot.last_seen.elapsed() < idle_timeout {
                    return true;
                }
                if let Some(session) = slot.pipeline.take() {
                    tracing::info!(session = %session_id, "ending idle session");
                    summaries.push(session.end());
                }
                false
            });
        }

        if !summaries.is_empty() {
            self.save_journal();
        }
        summaries
    }

    fn save_journal(&self) {
        if let Err(e) = self.journal.save() {
            tracing::warn!("Failed to save journal: {}", e);
        }
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_sessions: usize,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn not_found(session_id: &SessionId, code: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("No assessment for session {session_id}"),
            code: code.to_string(),
        }),
    )
}

fn rejected(e: IngestError) -> ApiError {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ErrorResponse {
            error: e.to_string(),
            code: e.code().to_string(),
        }),
    )
}

fn session_ended(session_id: &SessionId) -> ApiError {
    (
        StatusCode::CONFLICT,
        Json(ErrorResponse {
            error: format!("Session {session_id} has ended"),
            code: "SESSION_ENDED".to_string(),
        }),
    )
}

/// GET /health
async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_sessions: state.sessions.read().await.len(),
    })
}

/// POST /ingest
///
/// Accepts one tagged sample and returns the session's updated assessment.
async fn ingest(
    State(state): State<Arc<ServerState>>,
    Json(frame): Json<DeviceFrame>,
) -> Result<Json<Assessment>, ApiError> {
    let pipeline = state.pipeline(&frame.session_id).await;
    let mut slot = pipeline.lock().await;
    slot.last_seen = Instant::now();
    let session = slot
        .pipeline
        .as_mut()
        .ok_or_else(|| session_ended(&frame.session_id))?;
    let assessment = session.ingest(frame.sample).map_err(rejected)?;
    Ok(Json(assessment))
}

/// GET /sessions/:id
async fn session_assessment(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<Assessment>, ApiError> {
    let pipeline = state
        .sessions
        .read()
        .await
        .get(&session_id)
        .cloned()
        .ok_or_else(|| not_found(&session_id, "UNKNOWN_SESSION"))?;

    let slot = pipeline.lock().await;
    slot.pipeline
        .as_ref()
        .and_then(SessionPipeline::latest)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found(&session_id, "NO_ASSESSMENT"))
}

/// DELETE /sessions/:id
async fn end_session(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<SessionSummary>, ApiError> {
    let pipeline = state
        .sessions
        .write()
        .await
        .remove(&session_id)
        .ok_or_else(|| not_found(&session_id, "UNKNOWN_SESSION"))?;

    let session = pipeline
        .lock()
        .await
        .pipeline
        .take()
        .ok_or_else(|| session_ended(&session_id))?;

    let summary = session.end();
    state.save_journal();
    Ok(Json(summary))
}

/// Periodically end idle sessions until the server state is dropped.
async fn sweep_idle_sessions(state: Weak<ServerState>, idle_timeout: Duration) {
    let period = (idle_timeout / 4).clamp(Duration::from_millis(10), Duration::from_secs(60));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(state) = state.upgrade() else {
            break;
        };
        state.end_idle_sessions(idle_timeout).await;
    }
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(ServerState::new(&config)?);

    let app = Router::new()
        .route("/health", get(health))
        .route("/ingest", post(ingest))
        .route("/sessions/:id", get(session_assessment).delete(end_session))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state.clone());

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Early-warning server listening on http://{}", actual_addr);

    if let Some(idle_timeout) = config.idle_timeout {
        tokio::spawn(sweep_idle_sessions(Arc::downgrade(&state), idle_timeout));
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }

        let sessions: Vec<_> = state.sessions.write().await.drain().collect();
        for (_, pipeline) in sessions {
            if let Some(session) = pipeline.lock().await.pipeline.take() {
                session.end();
            }
        }
        state.save_journal();
    });

    Ok((actual_addr, shutdown_tx))
}
