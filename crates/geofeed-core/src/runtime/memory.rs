// crates/geofeed-core/src/runtime/memory.rs
// ============================================================================
// Module: Geofeed In-Memory Store
// Description: Process-local geolocation store for tests and demos.
// Purpose: Reference implementation of the Store Gateway without durability.
// Dependencies: crate::{core, interfaces, runtime::notify}, time
// ============================================================================

//! ## Overview
//! Keeps devices in creation order and the latest sample per device. Writes
//! are applied under one mutex; notifications are published after the mutex
//! is released, which is the in-memory equivalent of "after commit".

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::MutexGuard;

use time::OffsetDateTime;
use tokio::sync::broadcast;

use crate::core::Device;
use crate::core::DeviceId;
use crate::core::NewSample;
use crate::core::PageOptions;
use crate::core::Sample;
use crate::interfaces::ChangeFeed;
use crate::interfaces::GeolocationStore;
use crate::interfaces::StoreError;
use crate::interfaces::StoreNotification;
use crate::runtime::notify::NotificationHub;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Mutable store contents.
#[derive(Debug, Default)]
struct MemoryState {
    /// Devices in creation order.
    devices: Vec<Device>,
    /// Latest sample per device.
    latest: BTreeMap<DeviceId, Sample>,
}

/// In-memory geolocation store.
///
/// # Invariants
/// - One notification is published per inserted sample, after the write is applied.
/// - A failed batch insert leaves the store unchanged.
#[derive(Debug, Default)]
pub struct InMemoryGeolocationStore {
    /// Guarded store contents.
    state: Mutex<MemoryState>,
    /// Post-write notification hub.
    hub: NotificationHub,
}

impl InMemoryGeolocationStore {
    /// Creates an empty store with the given notification capacity.
    #[must_use]
    pub fn new(notify_capacity: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            hub: NotificationHub::new(notify_capacity),
        }
    }

    /// Returns the notification hub used by this store.
    #[must_use]
    pub const fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    /// Returns the number of devices that have at least one sample.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store mutex is poisoned.
    pub fn tracked_devices(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.latest.len())
    }

    /// Acquires the state mutex.
    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Store("memory store mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: Store Implementation
// ============================================================================

impl GeolocationStore for InMemoryGeolocationStore {
    fn insert_device(&self, name: &str) -> Result<DeviceId, StoreError> {
        if name.trim().is_empty() {
            return Err(StoreError::Invalid("device name must not be empty".to_string()));
        }
        let device_id = DeviceId::generate();
        let mut state = self.lock()?;
        state.devices.push(Device {
            device_id: device_id.clone(),
            name: name.to_string(),
            created: OffsetDateTime::now_utc(),
            updated: None,
            deleted: None,
        });
        drop(state);
        Ok(device_id)
    }

    fn list_devices(&self, page: PageOptions) -> Result<Vec<Device>, StoreError> {
        let state = self.lock()?;
        Ok(page_slice(&state.devices, page).to_vec())
    }

    fn insert_sample(&self, sample: &NewSample) -> Result<(), StoreError> {
        self.insert_samples(std::slice::from_ref(sample))
    }

    fn insert_samples(&self, samples: &[NewSample]) -> Result<(), StoreError> {
        if samples.is_empty() {
            return Ok(());
        }
        let created = OffsetDateTime::now_utc();
        {
            let mut state = self.lock()?;
            for sample in samples {
                if !state.devices.iter().any(|device| device.device_id == sample.device_id) {
                    return Err(StoreError::NotFound(format!(
                        "device {} does not exist",
                        sample.device_id
                    )));
                }
            }
            for sample in samples {
                let record = sample.clone().into_sample(created);
                let replace = state
                    .latest
                    .get(&record.device_id)
                    .is_none_or(|current| record.event_time >= current.event_time);
                if replace {
                    state.latest.insert(record.device_id.clone(), record);
                }
            }
        }
        self.hub.publish_inserted(samples.iter().map(|sample| &sample.device_id));
        Ok(())
    }

    fn list_latest(&self, page: PageOptions) -> Result<Vec<Sample>, StoreError> {
        let state = self.lock()?;
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.page_size()).unwrap_or(usize::MAX);
        Ok(state
            .latest
            .values()
            .filter(|sample| sample.deleted.is_none())
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn latest_for_devices(
        &self,
        device_ids: &[DeviceId],
    ) -> Result<Vec<Option<Sample>>, StoreError> {
        let state = self.lock()?;
        Ok(device_ids
            .iter()
            .map(|device_id| {
                state.latest.get(device_id).filter(|sample| sample.deleted.is_none()).cloned()
            })
            .collect())
    }
}

impl ChangeFeed for InMemoryGeolocationStore {
    fn subscribe(&self) -> broadcast::Receiver<StoreNotification> {
        self.hub.subscribe()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the slice of `items` covered by `page`.
fn page_slice<T>(items: &[T], page: PageOptions) -> &[T] {
    let start = usize::try_from(page.offset()).unwrap_or(usize::MAX).min(items.len());
    let len = usize::try_from(page.page_size()).unwrap_or(usize::MAX);
    let end = start.saturating_add(len).min(items.len());
    &items[start..end]
}
