//! Gateway client for forwarding warning events to the Hana backend.
//!
//! The core itself never talks to the network. With the `gateway` feature,
//! [`GatewaySink`] can be attached like any other event sink: events are
//! queued and posted in batches from a background thread, and delivery
//! failures are logged without ever reaching the pipeline.

use crate::journal::events::WarningEvent;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of the backend, e.g. `https://hana.example.org`
    pub endpoint: String,
    /// Bearer authentication token
    pub token: String,
    /// Events per request
    pub batch_size: usize,
    /// Maximum time an event waits before its batch is sent
    pub flush_interval_ms: u64,
    /// Events buffered before new ones are dropped
    pub queue_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080".to_string(),
            token: String::new(),
            batch_size: 50,
            flush_interval_ms: 2_000,
            queue_capacity: 4_096,
        }
    }
}

impl GatewayConfig {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
            ..Default::default()
        }
    }

    /// Get the events endpoint URL.
    pub fn events_url(&self) -> String {
        format!("{}/v1/warning-events", self.endpoint.trim_end_matches('/'))
    }

    /// Get the health check endpoint URL.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.endpoint.trim_end_matches('/'))
    }
}

/// Gateway client error types.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway config error: {0}")]
    Config(String),

    #[error("Gateway network error: {0}")]
    Network(String),

    #[error("Gateway server error ({status}): {message}")]
    Server { status: u16, message: String },
}

/// Request body for the events endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EventBatch {
    /// Identifier of this agent instance
    pub device_id: String,
    pub producer: String,
    pub version: String,
    pub events: Vec<WarningEvent>,
}

/// Identifier for this agent instance: hostname plus a random suffix.
pub fn agent_id() -> String {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!(
        "hana-{}-{}",
        hostname,
        &uuid::Uuid::new_v4().to_string()[..8]
    )
}

/// Collects events into batches for the forwarder.
///
/// A batch is due once it holds `batch_size` events, once `flush_interval`
/// has passed since the last flush, or when the queue is closing.
#[derive(Debug)]
pub struct EventBatcher {
    pending: Vec<WarningEvent>,
    batch_size: usize,
    flush_interval: Duration,
    last_flush: Instant,
}

impl EventBatcher {
    pub fn new(config: &GatewayConfig, now: Instant) -> Self {
        let batch_size = config.batch_size.max(1);
        Self {
            pending: Vec::with_capacity(batch_size),
            batch_size,
            flush_interval: Duration::from_millis(config.flush_interval_ms.max(1)),
            last_flush: now,
        }
    }

    pub fn push(&mut self, event: WarningEvent) {
        self.pending.push(event);
    }

    /// Take the pending batch if it is due.
    pub fn take_due(&mut self, now: Instant, closing: bool) -> Option<Vec<WarningEvent>> {
        if self.pending.is_empty() {
            return None;
        }
        let due = closing
            || self.pending.len() >= self.batch_size
            || now.saturating_duration_since(self.last_flush) >= self.flush_interval;
        if !due {
            return None;
        }
        self.last_flush = now;
        Some(std::mem::take(&mut self.pending))
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(feature = "gateway")]
pub use client::{GatewayClient, GatewaySink};

#[cfg(feature = "gateway")]
mod client {
    use super::*;
    use crate::journal::events::EventSink;
    use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::thread::JoinHandle;

    /// Async HTTP client for the backend.
    pub struct GatewayClient {
        config: GatewayConfig,
        client: reqwest::Client,
        device_id: String,
    }

    impl GatewayClient {
        pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
            if config.endpoint.is_empty() {
                return Err(GatewayError::Config("endpoint is empty".to_string()));
            }

            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .map_err(|e| GatewayError::Config(format!("Failed to create HTTP client: {e}")))?;

            Ok(Self {
                config,
                client,
                device_id: agent_id(),
            })
        }

        /// Test connection to the gateway.
        pub async fn test_connection(&self) -> Result<bool, GatewayError> {
            let response = self
                .client
                .get(self.config.health_url())
                .send()
                .await
                .map_err(|e| GatewayError::Network(e.to_string()))?;

            Ok(response.status().is_success())
        }

        /// Post one batch of events.
        pub async fn send_events(&self, events: Vec<WarningEvent>) -> Result<(), GatewayError> {
            if events.is_empty() {
                return Ok(());
            }

            let batch = EventBatch {
                device_id: self.device_id.clone(),
                producer: "hana-early-warning".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                events,
            };

            let response = self
                .client
                .post(self.config.events_url())
                .bearer_auth(&self.config.token)
                .json(&batch)
                .send()
                .await
                .map_err(|e| GatewayError::Network(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(GatewayError::Server {
                    status: status.as_u16(),
                    message,
                });
            }
            Ok(())
        }

        pub fn device_id(&self) -> &str {
            &self.device_id
        }
    }

    /// Event sink that forwards to the backend in the background.
    pub struct GatewaySink {
        sender: Sender<WarningEvent>,
        dropped: Arc<AtomicU64>,
    }

    impl GatewaySink {
        /// Start the forwarding thread.
        ///
        /// The thread exits once every clone of the returned sink is dropped
        /// and the remaining events are flushed.
        pub fn spawn(config: GatewayConfig) -> Result<(Self, JoinHandle<()>), GatewayError> {
            let client = GatewayClient::new(config.clone())?;
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| GatewayError::Config(format!("Failed to create runtime: {e}")))?;

            let (sender, receiver) = bounded(config.queue_capacity.max(1));
            let handle = std::thread::Builder::new()
                .name("gateway-forwarder".to_string())
                .spawn(move || forward(runtime, client, receiver, &config))
                .map_err(|e| GatewayError::Config(format!("Failed to spawn forwarder: {e}")))?;

            Ok((
                Self {
                    sender,
                    dropped: Arc::new(AtomicU64::new(0)),
                },
                handle,
            ))
        }

        /// Events discarded because the queue was full.
        pub fn dropped(&self) -> u64 {
            self.dropped.load(Ordering::Relaxed)
        }
    }

    impl EventSink for GatewaySink {
        fn record(&self, event: &WarningEvent) {
            match self.sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(kind = event.kind(), "gateway queue full, dropping event");
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    fn forward(
        runtime: tokio::runtime::Runtime,
        client: GatewayClient,
        receiver: Receiver<WarningEvent>,
        config: &GatewayConfig,
    ) {
        let mut batcher = EventBatcher::new(config, Instant::now());

        loop {
            let open = match receiver.recv_timeout(batcher.flush_interval()) {
                Ok(event) => {
                    batcher.push(event);
                    true
                }
                Err(RecvTimeoutError::Timeout) => true,
                Err(RecvTimeoutError::Disconnected) => false,
            };

            if let Some(events) = batcher.take_due(Instant::now(), !open) {
                let count = events.len();
                match runtime.block_on(client.send_events(events)) {
                    Ok(()) => tracing::debug!(count, "forwarded warning events"),
                    Err(e) => tracing::warn!(error = %e, count, "failed to forward warning events"),
                }
            }

            if !open {
                break;
            }
        }
    }
}
