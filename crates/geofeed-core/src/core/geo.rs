// crates/geofeed-core/src/core/geo.rs
// ============================================================================
// Module: Geofeed Location Model
// Description: Devices, coordinates, and location samples.
// Purpose: Define the records persisted by the store and streamed to subscribers.
// Dependencies: serde, thiserror, time
// ============================================================================

//! ## Overview
//! A [`Sample`] is one location observation tied to a [`DeviceId`] and an
//! event time. Samples are immutable once written, apart from the soft-delete
//! marker. Coordinates are validated at construction so invalid values never
//! reach persistence.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

use crate::core::identifiers::DeviceId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum absolute latitude in degrees.
pub const MAX_LATITUDE: f64 = 90.0;
/// Maximum absolute longitude in degrees.
pub const MAX_LONGITUDE: f64 = 180.0;

// ============================================================================
// SECTION: Coordinates
// ============================================================================

/// Coordinate validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CoordinateError {
    /// Latitude outside [-90, 90] or not finite.
    #[error("latitude out of range: {0}")]
    Latitude(f64),
    /// Longitude outside [-180, 180] or not finite.
    #[error("longitude out of range: {0}")]
    Longitude(f64),
}

/// Returns true when the latitude lies within [-90, 90].
#[must_use]
pub fn is_valid_latitude(latitude: f64) -> bool {
    (-MAX_LATITUDE..=MAX_LATITUDE).contains(&latitude)
}

/// Returns true when the longitude lies within [-180, 180].
#[must_use]
pub fn is_valid_longitude(longitude: f64) -> bool {
    (-MAX_LONGITUDE..=MAX_LONGITUDE).contains(&longitude)
}

/// Validated latitude/longitude pair in degrees.
///
/// # Invariants
/// - `latitude` is finite and within [-90, 90].
/// - `longitude` is finite and within [-180, 180].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    /// Latitude in degrees.
    latitude: f64,
    /// Longitude in degrees.
    longitude: f64,
}

impl Coordinates {
    /// Validates and constructs a coordinate pair.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError`] when either component is out of range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        // NaN fails the range checks below.
        if !is_valid_latitude(latitude) {
            return Err(CoordinateError::Latitude(latitude));
        }
        if !is_valid_longitude(longitude) {
            return Err(CoordinateError::Longitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Returns the latitude in degrees.
    #[must_use]
    pub const fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Returns the longitude in degrees.
    #[must_use]
    pub const fn longitude(&self) -> f64 {
        self.longitude
    }
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// Tracked device metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Store-assigned device identifier.
    pub device_id: DeviceId,
    /// Human-readable device name.
    pub name: String,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    /// Last update time, if any.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated: Option<OffsetDateTime>,
    /// Soft-delete marker, if deleted.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deleted: Option<OffsetDateTime>,
}

/// Location sample as stored and streamed to subscribers.
///
/// # Invariants
/// - `latitude`/`longitude` were validated through [`Coordinates`] before persistence.
/// - Immutable after creation except for `deleted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Device the sample belongs to.
    pub device_id: DeviceId,
    /// Time the observation was made.
    #[serde(with = "time::serde::rfc3339")]
    pub event_time: OffsetDateTime,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Store-assigned creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    /// Last update time, if any.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated: Option<OffsetDateTime>,
    /// Soft-delete marker, if deleted.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deleted: Option<OffsetDateTime>,
}

impl Sample {
    /// Returns the validated coordinates of this sample.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError`] if the stored values are out of range.
    pub fn coordinates(&self) -> Result<Coordinates, CoordinateError> {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// Sample insertion input; the store assigns `created`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSample {
    /// Device the sample belongs to.
    pub device_id: DeviceId,
    /// Time the observation was made.
    pub event_time: OffsetDateTime,
    /// Validated coordinates.
    pub coordinates: Coordinates,
}

impl NewSample {
    /// Builds a sample input, validating the raw coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError`] when the coordinates are out of range.
    pub fn new(
        device_id: DeviceId,
        event_time: OffsetDateTime,
        latitude: f64,
        longitude: f64,
    ) -> Result<Self, CoordinateError> {
        Ok(Self {
            device_id,
            event_time,
            coordinates: Coordinates::new(latitude, longitude)?,
        })
    }

    /// Materializes the stored record with the provided creation time.
    #[must_use]
    pub fn into_sample(self, created: OffsetDateTime) -> Sample {
        Sample {
            device_id: self.device_id,
            event_time: self.event_time,
            latitude: self.coordinates.latitude(),
            longitude: self.coordinates.longitude(),
            created,
            updated: None,
            deleted: None,
        }
    }
}
