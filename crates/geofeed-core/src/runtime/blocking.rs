// crates/geofeed-core/src/runtime/blocking.rs
// ============================================================================
// Module: Geofeed Blocking Store Calls
// Description: Bridge from async tasks to the synchronous store interface.
// Purpose: Keep blocking store I/O off the async worker threads.
// Dependencies: crate::interfaces, tokio
// ============================================================================

//! ## Overview
//! [`call_store`] runs one store operation on tokio's blocking pool. A
//! panicked or cancelled blocking task surfaces as [`StoreError::Store`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use crate::interfaces::GeolocationStore;
use crate::interfaces::SharedGeolocationStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Runs `op` against `store` on the blocking pool.
///
/// # Errors
///
/// Returns the store's error, or [`StoreError::Store`] when the blocking task
/// could not complete.
pub async fn call_store<T, F>(store: &SharedGeolocationStore, op: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&dyn GeolocationStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|err| StoreError::Store(format!("store task failed: {err}")))?
}
