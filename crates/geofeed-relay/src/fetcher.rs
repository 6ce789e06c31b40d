// crates/geofeed-relay/src/fetcher.rs
// ============================================================================
// Module: Fetcher
// Description: Resolves coalesced identifiers into latest samples.
// Purpose: One batched store query per flushed batch.
// Dependencies: geofeed-core, thiserror
// ============================================================================

//! ## Overview
//! [`Fetcher::resolve_latest`] issues a single `latest_for_devices` query on
//! the blocking pool and returns one entry per requested identifier, in
//! request order. [`Fetcher::present`] drops the misses and logs each one; a
//! miss is never fatal.

// ============================================================================
// SECTION: Imports
// ============================================================================

use geofeed_core::DeviceId;
use geofeed_core::LogEvent;
use geofeed_core::LogLevel;
use geofeed_core::Sample;
use geofeed_core::SharedGeolocationStore;
use geofeed_core::SharedLogSink;
use geofeed_core::call_store;
use thiserror::Error;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Fetch errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The store query failed.
    #[error("latest sample query failed: {0}")]
    Store(String),
    /// The store returned the wrong number of entries.
    #[error("store returned {actual} entries for {expected} identifiers")]
    LengthMismatch {
        /// Identifiers requested.
        expected: usize,
        /// Entries returned.
        actual: usize,
    },
}

/// Batched latest-sample resolver.
#[derive(Clone)]
pub struct Fetcher {
    /// Store queried for latest samples.
    store: SharedGeolocationStore,
    /// Sink for miss reports.
    log: SharedLogSink,
    /// Session the fetcher reports for, if any.
    session_id: Option<String>,
}

// ============================================================================
// SECTION: Fetcher
// ============================================================================

impl Fetcher {
    /// Creates a fetcher over the store.
    #[must_use]
    pub fn new(store: SharedGeolocationStore, log: SharedLogSink) -> Self {
        Self {
            store,
            log,
            session_id: None,
        }
    }

    /// Tags miss reports with a session id.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Resolves the latest sample for each identifier.
    ///
    /// The result has the same length and order as `device_ids`; duplicates
    /// resolve to equal entries and unknown identifiers to `None`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the query fails or the reply is malformed.
    pub async fn resolve_latest(
        &self,
        device_ids: &[DeviceId],
    ) -> Result<Vec<Option<Sample>>, FetchError> {
        if device_ids.is_empty() {
            return Ok(Vec::new());
        }
        let requested = device_ids.to_vec();
        let resolved = call_store(&self.store, move |store| store.latest_for_devices(&requested))
            .await
            .map_err(|err| FetchError::Store(err.to_string()))?;
        if resolved.len() != device_ids.len() {
            return Err(FetchError::LengthMismatch {
                expected: device_ids.len(),
                actual: resolved.len(),
            });
        }
        Ok(resolved)
    }

    /// Drops unresolved entries, logging one miss per absent identifier.
    #[must_use]
    pub fn present(&self, device_ids: &[DeviceId], resolved: Vec<Option<Sample>>) -> Vec<Sample> {
        let mut samples = Vec::with_capacity(resolved.len());
        for (device_id, entry) in device_ids.iter().zip(resolved) {
            match entry {
                Some(sample) => samples.push(sample),
                None => self.report_miss(device_id),
            }
        }
        samples
    }

    /// Records a resolution miss.
    fn report_miss(&self, device_id: &DeviceId) {
        let mut event =
            LogEvent::new("resolution_miss", LogLevel::Debug, "no sample for changed device")
                .with_field("device_id", device_id.as_str());
        if let Some(session_id) = &self.session_id {
            event = event.with_session(session_id.as_str());
        }
        self.log.record(&event);
    }
}
