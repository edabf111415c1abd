//! Event sinks for the early-warning core.
//!
//! This module provides the sink interface the pipeline reports through,
//! plus a few in-process sinks: a counting journal, an NDJSON writer, and
//! an in-memory collector.

pub mod events;
pub mod log;

// Re-export commonly used types
pub use events::{
    EventSink, FanoutSink, MemorySink, NdjsonSink, NullSink, SharedSink, WarningEvent,
};
pub use log::{
    create_shared_journal, create_shared_journal_with_persistence, Journal, JournalStats,
    SharedJournal,
};
