//! Hana Early Warning - early-warning classification for sensory wellness.
//!
//! This library turns a stream of wearable biometric samples (heart rate,
//! HRV, stress level) into a discrete warning level that caregivers and
//! wearers can act on before a sensory overload escalates.
//!
//! # Guarantees
//!
//! - **Ordered ingestion**: out-of-order or impossible samples are rejected
//!   without touching the window
//! - **Monotonic severity**: more or stronger patterns never lower the level
//! - **Session isolation**: sessions share no mutable state
//! - **No raw storage**: samples live only inside the current window
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Hana Early-Warning Core                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │  Ingestor   │──▶│   Feature   │──▶│   Pattern   │       │
//! │  │(order/range)│   │   Window    │   │  Detector   │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │         │                                    │              │
//! │         ▼                                    ▼              │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │ Event Sinks │◀──│  Smoother   │◀──│  Resolver   │       │
//! │  │  (journal)  │   │(hysteresis) │   │  (levels)   │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use hana_early_warning::{BiometricData, EngineConfig, MemorySink, WarningEngine};
//! use std::sync::Arc;
//!
//! let engine = WarningEngine::new(EngineConfig::default()).expect("valid config");
//! let mut session = engine.open_session("wearer-1", Arc::new(MemorySink::new()));
//!
//! let sample = BiometricData::new(180.0, 15.0, 90.0, chrono::Utc::now());
//! let assessment = session.ingest(sample).expect("accepted");
//! println!("level: {}", assessment.warning_level);
//! ```

pub mod config;
pub mod core;
pub mod device;
pub mod gateway;
pub mod hub;
pub mod journal;

#[cfg(feature = "server")]
pub mod server;

pub use config::{Config, ConfigError};
pub use core::{
    Assessment, EngineConfig, IngestError, Pattern, PatternCategory, PatternDetector,
    PatternRule, SessionPipeline, SessionSummary, WarningEngine, WarningLevel, WarningResolver,
};
pub use device::{BiometricData, DeviceFrame, DeviceLink, SessionId};
pub use gateway::{GatewayConfig, GatewayError};
pub use hub::{HubError, SessionHub};
pub use journal::{EventSink, Journal, MemorySink, NdjsonSink, WarningEvent};

#[cfg(feature = "gateway")]
pub use gateway::{GatewayClient, GatewaySink};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
