// crates/geofeed-config/src/lib.rs
// ============================================================================
// Module: Geofeed Config Library
// Description: Canonical config model, validation, and example generation.
// Purpose: Single source of truth for geofeed.toml semantics.
// Dependencies: geofeed-core, geofeed-simulator, geofeed-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `geofeed-config` defines the canonical configuration model for Geofeed.
//! It provides strict, fail-fast validation and a deterministic example.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
