// crates/geofeed-simulator/src/runner.rs
// ============================================================================
// Module: Simulator Runner
// Description: Device setup and the fixed-rate producer loop.
// Purpose: Feed the store with simulated samples under bounded retry.
// Dependencies: geofeed-core, rand, time, tokio, tokio-util
// ============================================================================

//! ## Overview
//! [`Simulator::run`] ensures the configured number of devices exists, then
//! advances every device once per period and writes the resulting samples.
//! Each write goes through [`retry_transient`]; what happens after the last
//! failed attempt is decided by [`ExhaustionPolicy`]. The loop sleeps for the
//! remainder of the period and stops cleanly when cancelled.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use geofeed_core::DeviceId;
use geofeed_core::LogEvent;
use geofeed_core::LogLevel;
use geofeed_core::MAX_PAGE_SIZE;
use geofeed_core::NewSample;
use geofeed_core::PageOptions;
use geofeed_core::SharedGeolocationStore;
use geofeed_core::SharedLogSink;
use geofeed_core::StoreError;
use geofeed_core::call_store;
use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::motion::HomeRegion;
use crate::motion::SimulatedDevice;
use crate::retry::RetryOutcome;
use crate::retry::retry_transient;
use crate::settings::ExhaustionPolicy;
use crate::settings::InsertMode;
use crate::settings::SimulatorSettings;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Producer errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulatorError {
    /// Settings were invalid or device setup failed.
    #[error("simulator setup failed: {0}")]
    Setup(String),
    /// A write failed on every attempt and the policy is abort.
    #[error("simulator write failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        /// Attempts used.
        attempts: u32,
        /// Error from the final attempt.
        message: String,
    },
    /// A write failed with a permanent store error.
    #[error("simulator store error: {0}")]
    Store(String),
}

/// Outcome of a single producer step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// All samples for the step were written.
    Written,
    /// Retries were exhausted and the rest of the step was dropped.
    Skipped,
    /// Cancellation was observed mid-step.
    Cancelled,
}

/// Summary returned when the producer stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatorReport {
    /// Steps attempted, including skipped steps.
    pub steps: u64,
    /// Steps dropped after retry exhaustion.
    pub skipped_steps: u64,
}

/// Simulated producer.
///
/// # Invariants
/// - After [`Simulator::setup`], `devices` holds exactly `settings.devices` entries.
pub struct Simulator {
    /// Store the samples are written to.
    store: SharedGeolocationStore,
    /// Validated settings.
    settings: SimulatorSettings,
    /// Home region derived from the settings.
    region: HomeRegion,
    /// Structured log sink.
    log: SharedLogSink,
    /// Random source for spawn positions and headings.
    rng: StdRng,
    /// Simulated device state.
    devices: Vec<SimulatedDevice>,
}

// ============================================================================
// SECTION: Simulator
// ============================================================================

impl Simulator {
    /// Creates a producer from validated settings.
    ///
    /// # Errors
    ///
    /// Returns [`SimulatorError::Setup`] when the settings are invalid.
    pub fn new(
        store: SharedGeolocationStore,
        settings: SimulatorSettings,
        log: SharedLogSink,
    ) -> Result<Self, SimulatorError> {
        settings.validate().map_err(|err| SimulatorError::Setup(err.to_string()))?;
        let rng = settings.seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Ok(Self {
            store,
            region: HomeRegion::new(settings.center, settings.radius),
            settings,
            log,
            rng,
            devices: Vec::new(),
        })
    }

    /// Returns the simulated devices.
    #[must_use]
    pub fn devices(&self) -> &[SimulatedDevice] {
        &self.devices
    }

    /// Returns the home region.
    #[must_use]
    pub const fn region(&self) -> &HomeRegion {
        &self.region
    }

    /// Loads existing devices, creates missing ones, and places them.
    ///
    /// # Errors
    ///
    /// Returns [`SimulatorError::Setup`] when listing or creating devices fails.
    pub async fn setup(&mut self) -> Result<(), SimulatorError> {
        let target = usize::try_from(self.settings.devices).unwrap_or(usize::MAX);
        let page_size = self.settings.devices.min(MAX_PAGE_SIZE);
        let mut page = PageOptions::first(page_size).map_err(setup_error)?;
        let mut ids: Vec<DeviceId> = Vec::with_capacity(target);
        loop {
            let batch = call_store(&self.store, move |store| store.list_devices(page))
                .await
                .map_err(setup_error)?;
            let short = batch.len() < usize::try_from(page_size).unwrap_or(usize::MAX);
            ids.extend(
                batch.into_iter().filter(|device| device.deleted.is_none()).map(|d| d.device_id),
            );
            if short || ids.len() >= target {
                break;
            }
            page = page.next().ok_or_else(|| setup_error("device paging overflowed"))?;
        }
        ids.truncate(target);
        let existing = ids.len();
        for index in existing .. target {
            let name = format!("simulated-device-{index}");
            let id = call_store(&self.store, move |store| store.insert_device(&name))
                .await
                .map_err(setup_error)?;
            ids.push(id);
        }
        let speed = self.settings.movement_per_sec;
        self.devices = ids
            .into_iter()
            .map(|id| SimulatedDevice::spawn(id, &self.region, speed, &mut self.rng))
            .collect();
        self.log.record(
            &LogEvent::new("simulator_setup", LogLevel::Info, "simulated devices ready")
                .with_field("existing", existing)
                .with_field("created", target - existing),
        );
        Ok(())
    }

    /// Advances every device by `elapsed` and returns the samples to write.
    ///
    /// # Errors
    ///
    /// Returns [`SimulatorError::Store`] when a position is not a valid coordinate.
    pub fn advance(&mut self, elapsed: Duration) -> Result<Vec<NewSample>, SimulatorError> {
        let event_time = OffsetDateTime::now_utc();
        let cooldown_steps = self.settings.bounce_cooldown_steps;
        self.devices
            .iter_mut()
            .map(|device| {
                device.step(elapsed, &self.region, cooldown_steps);
                let coordinates =
                    device.position().map_err(|err| SimulatorError::Store(err.to_string()))?;
                Ok(NewSample {
                    device_id: device.device_id.clone(),
                    event_time,
                    coordinates,
                })
            })
            .collect()
    }

    /// Writes one step's samples using the configured insert mode.
    ///
    /// # Errors
    ///
    /// Returns [`SimulatorError`] on a permanent store error, or on retry
    /// exhaustion when the policy is [`ExhaustionPolicy::Abort`].
    pub async fn write_step(
        &self,
        samples: Vec<NewSample>,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, SimulatorError> {
        match self.settings.insert_mode {
            InsertMode::Batch => {
                let batch: Arc<[NewSample]> = samples.into();
                let size = batch.len();
                let outcome = self
                    .write_with_retry(cancel, || {
                        let batch = Arc::clone(&batch);
                        call_store(&self.store, move |store| store.insert_samples(&batch))
                    })
                    .await?;
                self.resolve(outcome, size)
            }
            InsertMode::PerDevice => {
                for sample in samples {
                    let outcome = self
                        .write_with_retry(cancel, || {
                            let sample = sample.clone();
                            call_store(&self.store, move |store| store.insert_sample(&sample))
                        })
                        .await?;
                    let step = self.resolve(outcome, 1)?;
                    if step != StepOutcome::Written {
                        return Ok(step);
                    }
                }
                Ok(StepOutcome::Written)
            }
        }
    }

    /// Advances and writes one step.
    ///
    /// # Errors
    ///
    /// Returns [`SimulatorError`] per [`Simulator::write_step`].
    pub async fn step(
        &mut self,
        elapsed: Duration,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, SimulatorError> {
        let samples = self.advance(elapsed)?;
        self.write_step(samples, cancel).await
    }

    /// Runs setup and the producer loop until cancelled or aborted.
    ///
    /// # Errors
    ///
    /// Returns [`SimulatorError`] when setup fails or a step aborts.
    pub async fn run(
        mut self,
        cancel: CancellationToken,
    ) -> Result<SimulatorReport, SimulatorError> {
        let mut report = SimulatorReport::default();
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(report),
            result = self.setup() => result?,
        }
        let period = self.settings.period();
        let mut last_step = Instant::now();
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let started = Instant::now();
            let elapsed = started.duration_since(last_step);
            last_step = started;
            match self.step(elapsed, &cancel).await? {
                StepOutcome::Written => report.steps += 1,
                StepOutcome::Skipped => {
                    report.steps += 1;
                    report.skipped_steps += 1;
                }
                StepOutcome::Cancelled => break,
            }
            let spent = started.elapsed();
            if spent > period {
                self.log.record(
                    &LogEvent::new("simulator_step_overrun", LogLevel::Warn, "step exceeded period")
                        .with_field("spent_ms", duration_ms(spent))
                        .with_field("period_ms", duration_ms(period)),
                );
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(period.saturating_sub(spent)) => {}
            }
        }
        self.log.record(
            &LogEvent::new("simulator_stopped", LogLevel::Info, "simulator stopped")
                .with_field("steps", report.steps)
                .with_field("skipped_steps", report.skipped_steps),
        );
        Ok(report)
    }

    /// Runs one write under the retry policy, logging each retry.
    async fn write_with_retry<F, Fut>(
        &self,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<RetryOutcome, SimulatorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), StoreError>>,
    {
        let log = Arc::clone(&self.log);
        retry_transient(
            &self.settings.retry,
            cancel,
            move |attempt, err, delay| {
                log.record(
                    &LogEvent::new("simulator_retry", LogLevel::Warn, err.to_string())
                        .with_field("attempt", attempt)
                        .with_field("delay_ms", duration_ms(delay)),
                );
            },
            op,
        )
        .await
        .map_err(|err| SimulatorError::Store(err.to_string()))
    }

    /// Maps a retry outcome onto a step outcome per the exhaustion policy.
    fn resolve(
        &self,
        outcome: RetryOutcome,
        samples: usize,
    ) -> Result<StepOutcome, SimulatorError> {
        match outcome {
            RetryOutcome::Succeeded {
                ..
            } => Ok(StepOutcome::Written),
            RetryOutcome::Cancelled => Ok(StepOutcome::Cancelled),
            RetryOutcome::Exhausted {
                attempts,
                last,
            } => match self.settings.on_exhausted {
                ExhaustionPolicy::Abort => Err(SimulatorError::RetriesExhausted {
                    attempts,
                    message: last.to_string(),
                }),
                ExhaustionPolicy::SkipStep => {
                    self.log.record(
                        &LogEvent::new("simulator_step_skipped", LogLevel::Warn, last.to_string())
                            .with_field("attempts", attempts)
                            .with_field("samples", samples),
                    );
                    Ok(StepOutcome::Skipped)
                }
            },
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Wraps a setup failure.
fn setup_error(err: impl ToString) -> SimulatorError {
    SimulatorError::Setup(err.to_string())
}

/// Returns a duration in whole milliseconds, saturating.
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
