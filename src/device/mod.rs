//! Device-facing types for the early-warning core.
//!
//! This module defines the tagged sample types the wearable bridge delivers
//! and the bounded link that carries them into the pipeline.

pub mod link;
pub mod types;

// Re-export commonly used types
pub use link::{DeviceLink, FrameSender, LinkError, DEFAULT_LINK_CAPACITY};
pub use types::{BiometricData, DeviceFrame, SessionId, Signal};
