// crates/geofeed-cli/src/lib.rs
// ============================================================================
// Module: Geofeed CLI Library
// Description: Shared helpers for the `geofeed` binary.
// Purpose: Expose runtime assembly so it can be tested without the binary.
// Dependencies: crate::runtime
// ============================================================================

//! ## Overview
//! Library half of the `geofeed` binary. [`runtime`] builds the relay and the
//! simulated producer from a loaded configuration.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use runtime::Backend;
pub use runtime::Runtime;
pub use runtime::RuntimeError;
pub use runtime::RuntimeReport;
pub use runtime::open_log_sink;
pub use runtime::open_store;
pub use runtime::session_settings;
pub use runtime::simulator_settings;
