// crates/geofeed-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Geolocation Store
// Description: Durable GeolocationStore backend using SQLite WAL.
// Purpose: Persist devices and samples and publish committed inserts.
// Dependencies: geofeed-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`GeolocationStore`] implementation.
//! Every committed sample insert publishes one notification on the
//! `geolocation_inserted` channel through the store's notification hub.
//!
//! [`GeolocationStore`]: geofeed_core::GeolocationStore

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::LATEST_FOR_DEVICE_SQL;
pub use store::LIST_LATEST_SQL;
pub use store::SqliteGeolocationStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
