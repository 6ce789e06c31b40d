// crates/geofeed-core/src/core/mod.rs
// ============================================================================
// Module: Geofeed Core Types
// Description: Canonical device, sample, and paging structures.
// Purpose: Provide stable, serializable types shared by store, relay, and simulator.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Core types define tracked devices, their location samples, and the paging
//! options used by list queries. These types are the canonical source of truth
//! for the subscriber wire format.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod geo;
pub mod identifiers;
pub mod paging;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use geo::CoordinateError;
pub use geo::Coordinates;
pub use geo::Device;
pub use geo::MAX_LATITUDE;
pub use geo::MAX_LONGITUDE;
pub use geo::NewSample;
pub use geo::Sample;
pub use geo::is_valid_latitude;
pub use geo::is_valid_longitude;
pub use identifiers::DeviceId;
pub use identifiers::IdentifierError;
pub use paging::MAX_PAGE_SIZE;
pub use paging::PageError;
pub use paging::PageOptions;
