// crates/geofeed-core/src/interfaces/mod.rs
// ============================================================================
// Module: Geofeed Interfaces
// Description: Backend-agnostic store and change-feed contracts.
// Purpose: Define the Store Gateway surface consumed by the relay and simulator.
// Dependencies: crate::core, thiserror, tokio
// ============================================================================

//! ## Overview
//! The Store Gateway is split in two: [`GeolocationStore`] for synchronous
//! reads and writes, and [`ChangeFeed`] for the lightweight notifications a
//! store publishes after each committed sample insert. Implementations must
//! publish exactly one [`StoreNotification`] per committed row, and only after
//! the transaction that wrote it has committed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;

use crate::core::Device;
use crate::core::DeviceId;
use crate::core::NewSample;
use crate::core::PageOptions;
use crate::core::Sample;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Notification channel used for committed sample inserts.
pub const INSERT_CHANNEL: &str = "geolocation_inserted";

// ============================================================================
// SECTION: Change Feed
// ============================================================================

/// Store-native change notification.
///
/// # Invariants
/// - `payload` carries the device id of the inserted sample for [`INSERT_CHANNEL`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreNotification {
    /// Channel the notification was published on.
    pub channel: String,
    /// Raw payload.
    pub payload: String,
}

impl StoreNotification {
    /// Builds an insert notification for the given device.
    #[must_use]
    pub fn inserted(device_id: &DeviceId) -> Self {
        Self {
            channel: INSERT_CHANNEL.to_string(),
            payload: device_id.as_str().to_string(),
        }
    }
}

/// Source of store change notifications.
pub trait ChangeFeed: Send + Sync {
    /// Opens a new receiver positioned after the most recent notification.
    fn subscribe(&self) -> broadcast::Receiver<StoreNotification>;
}

/// Shared change feed handle.
pub type SharedChangeFeed = Arc<dyn ChangeFeed>;

// ============================================================================
// SECTION: Geolocation Store
// ============================================================================

/// Geolocation store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Only [`StoreError::Unavailable`] is transient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("geolocation store io error: {0}")]
    Io(String),
    /// Store is temporarily unavailable (busy, locked, or contended).
    #[error("geolocation store unavailable: {0}")]
    Unavailable(String),
    /// Input or stored data is invalid.
    #[error("geolocation store invalid data: {0}")]
    Invalid(String),
    /// Referenced record does not exist.
    #[error("geolocation store record not found: {0}")]
    NotFound(String),
    /// Store reported an error.
    #[error("geolocation store error: {0}")]
    Store(String),
}

impl StoreError {
    /// Returns true when retrying the same operation may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Persistence surface for devices and their location samples.
pub trait GeolocationStore: Send + Sync {
    /// Creates a device and returns its store-assigned identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn insert_device(&self, name: &str) -> Result<DeviceId, StoreError>;

    /// Lists devices ordered by creation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn list_devices(&self, page: PageOptions) -> Result<Vec<Device>, StoreError>;

    /// Persists one sample.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails or the device is unknown.
    fn insert_sample(&self, sample: &NewSample) -> Result<(), StoreError>;

    /// Persists several samples in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails; no sample is persisted.
    fn insert_samples(&self, samples: &[NewSample]) -> Result<(), StoreError>;

    /// Lists the latest non-deleted sample for each device, ordered by device id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn list_latest(&self, page: PageOptions) -> Result<Vec<Sample>, StoreError>;

    /// Returns the latest sample for each requested device, positionally.
    ///
    /// The reply has the same length and order as `device_ids`. Unknown ids and
    /// devices with no samples map to `None`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn latest_for_devices(&self, device_ids: &[DeviceId])
    -> Result<Vec<Option<Sample>>, StoreError>;
}

/// Shared geolocation store handle.
pub type SharedGeolocationStore = Arc<dyn GeolocationStore>;
