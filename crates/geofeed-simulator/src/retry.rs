// crates/geofeed-simulator/src/retry.rs
// ============================================================================
// Module: Simulator Retry
// Description: Bounded retry of transient store errors.
// Purpose: Retry writes without hiding permanent failures or blocking shutdown.
// Dependencies: geofeed-core, tokio, tokio-util
// ============================================================================

//! ## Overview
//! [`retry_transient`] re-runs an operation while it fails with a transient
//! [`StoreError`], waiting per [`RetryPolicy`] between attempts. Permanent
//! errors are returned immediately. Cancellation is observed during every
//! wait.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::time::Duration;

use geofeed_core::StoreError;
use tokio_util::sync::CancellationToken;

use crate::settings::RetryPolicy;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Result of a retried operation that did not fail permanently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// An attempt succeeded.
    Succeeded {
        /// Attempts used, including the successful one.
        attempts: u32,
    },
    /// Every attempt failed with a transient error.
    Exhausted {
        /// Attempts used.
        attempts: u32,
        /// Error from the final attempt.
        last: StoreError,
    },
    /// Cancellation was observed while waiting to retry.
    Cancelled,
}

// ============================================================================
// SECTION: Retry Loop
// ============================================================================

/// Runs `op` until it succeeds, fails permanently, exhausts the policy, or is cancelled.
///
/// `on_retry` is called with the failed attempt number, its error, and the
/// delay before the next attempt.
///
/// # Errors
///
/// Returns the first non-transient [`StoreError`].
pub async fn retry_transient<F, Fut, R>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut on_retry: R,
    mut op: F,
) -> Result<RetryOutcome, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), StoreError>>,
    R: FnMut(u32, &StoreError, Duration),
{
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        match op().await {
            Ok(()) => {
                return Ok(RetryOutcome::Succeeded {
                    attempts: attempt,
                });
            }
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) => {
                if attempt >= policy.max_attempts() {
                    return Ok(RetryOutcome::Exhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
                let delay = policy.delay_after(attempt);
                on_retry(attempt, &err, delay);
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Ok(RetryOutcome::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
