// crates/geofeed-relay/tests/snapshot.rs
// ============================================================================
// Module: Snapshot Policy Tests
// Description: Paging, truncation, and validation of the initial snapshot.
// Purpose: Ensure snapshot size is always an explicit configured bound.
// ============================================================================

//! Snapshot policy tests.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::sync::Arc;

use geofeed_core::InMemoryGeolocationStore;
use geofeed_core::SharedGeolocationStore;
use geofeed_relay::SnapshotError;
use geofeed_relay::SnapshotPolicy;

use crate::common::seed;

fn seeded(count: usize) -> SharedGeolocationStore {
    let store = InMemoryGeolocationStore::default();
    seed(&store, count);
    Arc::new(store)
}

#[tokio::test]
async fn complete_reads_every_page() {
    let store = seeded(25);
    let snapshot = SnapshotPolicy::Complete {
        page_size: 10,
    }
    .load(&store)
    .await
    .unwrap();
    assert_eq!(snapshot.samples.len(), 25);
    assert!(!snapshot.truncated);
}

#[tokio::test]
async fn complete_stops_on_empty_page_at_exact_multiple() {
    let store = seeded(20);
    let snapshot = SnapshotPolicy::Complete {
        page_size: 10,
    }
    .load(&store)
    .await
    .unwrap();
    assert_eq!(snapshot.samples.len(), 20);
}

#[tokio::test]
async fn bounded_truncates_explicitly() {
    let store = seeded(25);
    let snapshot = SnapshotPolicy::Bounded {
        max_records: 12,
        page_size: 10,
    }
    .load(&store)
    .await
    .unwrap();
    assert_eq!(snapshot.samples.len(), 12);
    assert!(snapshot.truncated);
}

#[tokio::test]
async fn bounded_exactly_full_at_page_multiple_is_not_truncated() {
    let store = seeded(20);
    let snapshot = SnapshotPolicy::Bounded {
        max_records: 20,
        page_size: 10,
    }
    .load(&store)
    .await
    .unwrap();
    assert_eq!(snapshot.samples.len(), 20);
    assert!(!snapshot.truncated);
}

#[tokio::test]
async fn bounded_at_page_multiple_with_more_rows_is_truncated() {
    let store = seeded(21);
    let snapshot = SnapshotPolicy::Bounded {
        max_records: 20,
        page_size: 10,
    }
    .load(&store)
    .await
    .unwrap();
    assert_eq!(snapshot.samples.len(), 20);
    assert!(snapshot.truncated);
}

#[tokio::test]
async fn bounded_under_limit_is_complete() {
    let store = seeded(5);
    let snapshot = SnapshotPolicy::Bounded {
        max_records: 12,
        page_size: 10,
    }
    .load(&store)
    .await
    .unwrap();
    assert_eq!(snapshot.samples.len(), 5);
    assert!(!snapshot.truncated);
}

#[tokio::test]
async fn empty_store_yields_empty_snapshot() {
    let store = seeded(0);
    let snapshot = SnapshotPolicy::Complete {
        page_size: 100,
    }
    .load(&store)
    .await
    .unwrap();
    assert!(snapshot.samples.is_empty());
    assert!(!snapshot.truncated);
}

#[test]
fn invalid_policies_are_rejected() {
    for policy in [
        SnapshotPolicy::Complete {
            page_size: 0,
        },
        SnapshotPolicy::Complete {
            page_size: 1001,
        },
        SnapshotPolicy::Bounded {
            max_records: 0,
            page_size: 10,
        },
    ] {
        assert!(matches!(policy.validate(), Err(SnapshotError::Invalid(_))));
    }
    assert!(
        SnapshotPolicy::Complete {
            page_size: 1000,
        }
        .validate()
        .is_ok()
    );
}
