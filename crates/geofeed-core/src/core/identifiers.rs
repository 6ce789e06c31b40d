// crates/geofeed-core/src/core/identifiers.rs
// ============================================================================
// Module: Geofeed Identifiers
// Description: Canonical opaque identifiers for tracked devices.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde, thiserror, uuid
// ============================================================================

//! ## Overview
//! Device identifiers are assigned by the store and are opaque to every other
//! component. They serialize as plain strings on the wire and in change
//! notifications.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted length of a device identifier in bytes.
pub const MAX_DEVICE_ID_LENGTH: usize = 128;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Identifier parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Identifier was empty or only whitespace.
    #[error("device id must not be empty")]
    Empty,
    /// Identifier exceeded the length limit.
    #[error("device id exceeds {MAX_DEVICE_ID_LENGTH} bytes")]
    TooLong,
    /// Identifier contained control characters or whitespace.
    #[error("device id contains invalid characters")]
    InvalidCharacters,
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Device identifier assigned by the store.
///
/// # Invariants
/// - Opaque UTF-8 string; immutable once assigned.
/// - Values produced by [`DeviceId::parse`] are non-empty, at most
///   [`MAX_DEVICE_ID_LENGTH`] bytes, and free of whitespace/control characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a new device identifier without validation.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier (UUID v4, hyphenated).
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Parses an identifier received from an untrusted source.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the value is empty, too long, or
    /// contains whitespace or control characters.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        if raw.trim().is_empty() {
            return Err(IdentifierError::Empty);
        }
        if raw.len() > MAX_DEVICE_ID_LENGTH {
            return Err(IdentifierError::TooLong);
        }
        if raw.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
            return Err(IdentifierError::InvalidCharacters);
        }
        Ok(Self(raw.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
