// crates/geofeed-relay/src/snapshot.rs
// ============================================================================
// Module: Snapshot Policy
// Description: Initial full-state read sent to each new subscriber.
// Purpose: Make the snapshot bound explicit and configured.
// Dependencies: geofeed-core, thiserror
// ============================================================================

//! ## Overview
//! A snapshot pages `list_latest` from page 1. [`SnapshotPolicy::Complete`]
//! reads until an empty or short page; [`SnapshotPolicy::Bounded`] also stops
//! once `max_records` samples are collected and reports the truncation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use geofeed_core::MAX_PAGE_SIZE;
use geofeed_core::PageOptions;
use geofeed_core::Sample;
use geofeed_core::SharedGeolocationStore;
use geofeed_core::call_store;
use thiserror::Error;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Snapshot errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// Policy parameters were out of range.
    #[error("invalid snapshot policy: {0}")]
    Invalid(String),
    /// A page query failed.
    #[error("snapshot query failed: {0}")]
    Store(String),
}

/// How much state a new subscriber receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPolicy {
    /// Every latest sample.
    Complete {
        /// Rows per page query.
        page_size: u32,
    },
    /// At most `max_records` latest samples.
    Bounded {
        /// Upper bound on samples sent.
        max_records: u64,
        /// Rows per page query.
        page_size: u32,
    },
}

/// Loaded snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Latest samples in store order.
    pub samples: Vec<Sample>,
    /// True when a bounded policy cut the read short.
    pub truncated: bool,
}

// ============================================================================
// SECTION: Policy
// ============================================================================

impl SnapshotPolicy {
    /// Returns the configured page size.
    #[must_use]
    pub const fn page_size(&self) -> u32 {
        match self {
            Self::Complete {
                page_size,
            }
            | Self::Bounded {
                page_size, ..
            } => *page_size,
        }
    }

    /// Checks the page size and record bound.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Invalid`] when a parameter is out of range.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        let page_size = self.page_size();
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(SnapshotError::Invalid(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        if let Self::Bounded {
            max_records: 0, ..
        } = self
        {
            return Err(SnapshotError::Invalid("max_records must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Reads the snapshot from the store.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] when the policy is invalid or a page query fails.
    pub async fn load(&self, store: &SharedGeolocationStore) -> Result<Snapshot, SnapshotError> {
        self.validate()?;
        let page_size = self.page_size();
        let limit = match self {
            Self::Complete {
                ..
            } => None,
            Self::Bounded {
                max_records, ..
            } => Some(usize::try_from(*max_records).unwrap_or(usize::MAX)),
        };
        let mut page = PageOptions::first(page_size)
            .map_err(|err| SnapshotError::Invalid(err.to_string()))?;
        let mut snapshot = Snapshot::default();
        loop {
            let rows = call_store(store, move |store| store.list_latest(page))
                .await
                .map_err(|err| SnapshotError::Store(err.to_string()))?;
            let short = rows.len() < usize::try_from(page_size).unwrap_or(usize::MAX);
            snapshot.samples.extend(rows);
            if let Some(limit) = limit
                && snapshot.samples.len() >= limit
            {
                snapshot.truncated = snapshot.samples.len() > limit
                    || (!short && rows_after(store, page).await?);
                snapshot.samples.truncate(limit);
                break;
            }
            if short {
                break;
            }
            match page.next() {
                Some(next) => page = next,
                None => break,
            }
        }
        Ok(snapshot)
    }
}

/// Returns whether any latest sample exists past `page`.
async fn rows_after(
    store: &SharedGeolocationStore,
    page: PageOptions,
) -> Result<bool, SnapshotError> {
    let Some(next) = page.next() else {
        return Ok(false);
    };
    let rows = call_store(store, move |store| store.list_latest(next))
        .await
        .map_err(|err| SnapshotError::Store(err.to_string()))?;
    Ok(!rows.is_empty())
}
