// crates/geofeed-core/src/lib.rs
// ============================================================================
// Module: Geofeed Core Library
// Description: Public API surface for the Geofeed core.
// Purpose: Expose location types, store interfaces, log sinks, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Geofeed core defines the tracked-device data model and the narrow Store
//! Gateway interfaces that the relay pipeline and the simulator consume. It is
//! backend-agnostic: durable storage lives in `geofeed-store-sqlite`, and an
//! in-memory reference store is provided for tests and local demos.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::ChangeFeed;
pub use interfaces::GeolocationStore;
pub use interfaces::INSERT_CHANNEL;
pub use interfaces::SharedChangeFeed;
pub use interfaces::SharedGeolocationStore;
pub use interfaces::StoreError;
pub use interfaces::StoreNotification;
pub use runtime::DEFAULT_NOTIFY_CAPACITY;
pub use runtime::FileLogSink;
pub use runtime::InMemoryGeolocationStore;
pub use runtime::LogEvent;
pub use runtime::LogLevel;
pub use runtime::LogSink;
pub use runtime::MemoryLogSink;
pub use runtime::NoopLogSink;
pub use runtime::NotificationHub;
pub use runtime::SharedLogSink;
pub use runtime::StderrLogSink;
pub use runtime::call_store;
