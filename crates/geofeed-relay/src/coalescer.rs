// crates/geofeed-relay/src/coalescer.rs
// ============================================================================
// Module: Coalescer
// Description: Size/time batching of changed device identifiers.
// Purpose: Bound both the latency and the burstiness of subscriber updates.
// Dependencies: geofeed-core, thiserror, tokio, tokio-util
// ============================================================================

//! ## Overview
//! The coalescer collects distinct device identifiers and releases them as a
//! [`PendingBatch`] when either limit is reached:
//! - size: the `record` call that brings the set to `max_batch` flushes inline;
//! - time: the timer task flushes a non-empty set once `max_wait` has passed
//!   since the previous flush.
//!
//! The pending set sits behind a `std::sync::Mutex` that is never held across
//! an `.await`. A flush swaps the set out and resets the flush clock in the
//! same critical section. An empty set never flushes; while empty the timer
//! parks on a [`Notify`] instead of polling.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;
use std::mem;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use geofeed_core::DeviceId;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Coalescer configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoalescerConfigError {
    /// `max_batch` was zero.
    #[error("max_batch must be at least 1")]
    MaxBatch,
    /// `max_wait` was zero.
    #[error("max_wait must be greater than zero")]
    MaxWait,
}

/// Flush thresholds.
///
/// # Invariants
/// - `max_batch >= 1` and `max_wait > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoalescerConfig {
    /// Size threshold.
    max_batch: usize,
    /// Time threshold measured from the previous flush.
    max_wait: Duration,
}

impl CoalescerConfig {
    /// Validates and builds a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CoalescerConfigError`] when either threshold is zero.
    pub const fn new(max_batch: usize, max_wait: Duration) -> Result<Self, CoalescerConfigError> {
        if max_batch == 0 {
            return Err(CoalescerConfigError::MaxBatch);
        }
        if max_wait.is_zero() {
            return Err(CoalescerConfigError::MaxWait);
        }
        Ok(Self {
            max_batch,
            max_wait,
        })
    }

    /// Returns the size threshold.
    #[must_use]
    pub const fn max_batch(&self) -> usize {
        self.max_batch
    }

    /// Returns the time threshold.
    #[must_use]
    pub const fn max_wait(&self) -> Duration {
        self.max_wait
    }
}

// ============================================================================
// SECTION: Batches
// ============================================================================

/// Distinct device identifiers released by one flush, in first-recorded order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingBatch {
    /// Identifiers in first-recorded order.
    device_ids: Vec<DeviceId>,
}

impl PendingBatch {
    /// Returns the identifiers.
    #[must_use]
    pub fn device_ids(&self) -> &[DeviceId] {
        &self.device_ids
    }

    /// Returns the number of identifiers.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.device_ids.len()
    }

    /// Returns true when the batch carries no identifiers.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.device_ids.is_empty()
    }

    /// Consumes the batch and returns its identifiers.
    #[must_use]
    pub fn into_device_ids(self) -> Vec<DeviceId> {
        self.device_ids
    }
}

/// Mutable state behind the coalescer lock.
struct PendingState {
    /// Identifiers in first-recorded order.
    order: Vec<DeviceId>,
    /// Membership index for `order`.
    seen: HashSet<DeviceId>,
    /// Time of the previous flush, or of construction.
    last_flush: Instant,
}

impl PendingState {
    /// Swaps out the pending set and restarts the flush clock.
    fn take(&mut self, now: Instant) -> PendingBatch {
        self.seen.clear();
        self.last_flush = now;
        PendingBatch {
            device_ids: mem::take(&mut self.order),
        }
    }
}

// ============================================================================
// SECTION: Coalescer
// ============================================================================

/// Dual-threshold coalescer.
pub struct Coalescer {
    /// Flush thresholds.
    config: CoalescerConfig,
    /// Pending set and flush clock.
    state: Mutex<PendingState>,
    /// Wakes the timer when the set becomes non-empty.
    wake: Notify,
}

impl Coalescer {
    /// Creates an empty coalescer; the flush clock starts now.
    #[must_use]
    pub fn new(config: CoalescerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(PendingState {
                order: Vec::new(),
                seen: HashSet::new(),
                last_flush: Instant::now(),
            }),
            wake: Notify::new(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &CoalescerConfig {
        &self.config
    }

    /// Records a changed device.
    ///
    /// Returns the batch when this call brought the set to `max_batch`.
    /// The first id after an idle period longer than `max_wait` restarts the
    /// window so the burst it opens is flushed together.
    pub fn record(&self, device_id: DeviceId) -> Option<PendingBatch> {
        let flushed = {
            let mut state = self.lock();
            if !state.seen.contains(&device_id) {
                let now = Instant::now();
                if state.order.is_empty()
                    && now.saturating_duration_since(state.last_flush) >= self.config.max_wait
                {
                    state.last_flush = now;
                }
                state.seen.insert(device_id.clone());
                state.order.push(device_id);
            }
            (state.order.len() >= self.config.max_batch).then(|| state.take(Instant::now()))
        };
        if flushed.is_none() {
            self.wake.notify_one();
        }
        flushed
    }

    /// Flushes when the set is non-empty and `max_wait` has passed since the last flush.
    pub fn flush_due(&self, now: Instant) -> Option<PendingBatch> {
        let mut state = self.lock();
        let due = !state.order.is_empty()
            && now.saturating_duration_since(state.last_flush) >= self.config.max_wait;
        due.then(|| state.take(now))
    }

    /// Returns the number of pending identifiers.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.lock().order.len()
    }

    /// Runs the time-based flush until cancelled or `out` is closed.
    pub async fn run_timer(&self, cancel: &CancellationToken, out: &mpsc::Sender<PendingBatch>) {
        loop {
            let Some(deadline) = self.deadline() else {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    () = self.wake.notified() => continue,
                }
            };
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = tokio::time::sleep_until(deadline) => {}
            }
            let Some(batch) = self.flush_due(Instant::now()) else {
                continue;
            };
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                sent = out.send(batch) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Returns the next time-based flush instant, if anything is pending.
    fn deadline(&self) -> Option<Instant> {
        let state = self.lock();
        (!state.order.is_empty()).then(|| state.last_flush + self.config.max_wait)
    }

    /// Locks the pending state; the set stays consistent even after a panic elsewhere.
    fn lock(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
