// crates/geofeed-core/src/runtime/mod.rs
// ============================================================================
// Module: Geofeed Runtime Helpers
// Description: Reference implementations of the Store Gateway interfaces.
// Purpose: Provide an in-memory store, the notification hub, and log sinks.
// Dependencies: crate::interfaces, serde_json, tokio
// ============================================================================

//! ## Overview
//! [`NotificationHub`] is the broadcast fan-out every store uses to publish
//! committed inserts. [`InMemoryGeolocationStore`] is a process-local store for
//! tests and demos. [`LogSink`] implementations carry structured JSON-lines
//! events for every component.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod blocking;
pub mod log;
pub mod memory;
pub mod notify;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use blocking::call_store;
pub use log::FileLogSink;
pub use log::LogEvent;
pub use log::LogLevel;
pub use log::LogSink;
pub use log::MemoryLogSink;
pub use log::NoopLogSink;
pub use log::SharedLogSink;
pub use log::StderrLogSink;
pub use memory::InMemoryGeolocationStore;
pub use notify::DEFAULT_NOTIFY_CAPACITY;
pub use notify::NotificationHub;
