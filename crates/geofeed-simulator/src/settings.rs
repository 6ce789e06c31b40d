// crates/geofeed-simulator/src/settings.rs
// ============================================================================
// Module: Simulator Settings
// Description: Producer settings, retry policy, and write-shape choices.
// Purpose: Validate producer parameters once, before the loop starts.
// Dependencies: geofeed-core, serde, thiserror
// ============================================================================

//! ## Overview
//! [`SimulatorSettings`] carries everything the producer loop needs. Values
//! are validated up front; the loop itself never re-checks them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use geofeed_core::Coordinates;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Producer configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulatorConfigError {
    /// A value was outside its accepted range.
    #[error("{0}")]
    Invalid(String),
}

/// Builds an invalid-setting error.
fn invalid(message: &str) -> SimulatorConfigError {
    SimulatorConfigError::Invalid(message.to_string())
}

// ============================================================================
// SECTION: Policy Enums
// ============================================================================

/// Shape of the per-step write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertMode {
    /// One write per device; models independent trackers.
    PerDevice,
    /// One transactional write for all devices in the step.
    Batch,
}

/// Delay growth between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed,
    /// Delay doubles per retry, capped by `max_delay`.
    Exponential,
}

/// Behavior once every attempt of a step's write has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Stop the producer with an error.
    Abort,
    /// Drop the rest of this step's writes and continue with the next step.
    SkipStep,
}

// ============================================================================
// SECTION: Retry Policy
// ============================================================================

/// Bounded retry policy for transient store errors.
///
/// # Invariants
/// - `max_attempts >= 1` and counts the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    max_attempts: u32,
    /// Base delay between attempts.
    delay: Duration,
    /// Delay growth.
    backoff: Backoff,
    /// Upper bound for exponential delays.
    max_delay: Option<Duration>,
}

impl RetryPolicy {
    /// Validates and constructs a retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`SimulatorConfigError`] when `max_attempts` is zero or the
    /// delay cap is below the base delay.
    pub fn new(
        max_attempts: u32,
        delay: Duration,
        backoff: Backoff,
        max_delay: Option<Duration>,
    ) -> Result<Self, SimulatorConfigError> {
        if max_attempts == 0 {
            return Err(invalid("max_attempts must be at least 1"));
        }
        if max_delay.is_some_and(|cap| cap < delay) {
            return Err(invalid("max_delay_ms must not be below delay_ms"));
        }
        Ok(Self {
            max_attempts,
            delay,
            backoff,
            max_delay,
        })
    }

    /// Returns the total attempt budget.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let delay = match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
                self.delay.saturating_mul(factor)
            }
        };
        self.max_delay.map_or(delay, |cap| delay.min(cap))
    }
}

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Validated producer settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatorSettings {
    /// Number of simulated devices.
    pub devices: u32,
    /// Home-region center.
    pub center: Coordinates,
    /// Home-region radius in degrees.
    pub radius: f64,
    /// Steps per second.
    pub frequency_hz: f64,
    /// Speed in degrees per second.
    pub movement_per_sec: f64,
    /// Steps after a bounce during which no further bounce happens.
    pub bounce_cooldown_steps: u32,
    /// Per-step write shape.
    pub insert_mode: InsertMode,
    /// Retry policy for each write.
    pub retry: RetryPolicy,
    /// Behavior after retries are exhausted.
    pub on_exhausted: ExhaustionPolicy,
    /// Optional RNG seed.
    pub seed: Option<u64>,
}

impl SimulatorSettings {
    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns [`SimulatorConfigError`] when a value is out of range.
    pub fn validate(&self) -> Result<(), SimulatorConfigError> {
        if self.devices == 0 {
            return Err(invalid("devices must be at least 1"));
        }
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(invalid("radius must be positive and finite"));
        }
        if !(self.frequency_hz.is_finite() && self.frequency_hz > 0.0) {
            return Err(invalid("frequency_hz must be positive and finite"));
        }
        if Duration::try_from_secs_f64(1.0 / self.frequency_hz).is_err() {
            return Err(invalid("frequency_hz is too small"));
        }
        if !(self.movement_per_sec.is_finite() && self.movement_per_sec >= 0.0) {
            return Err(invalid("movement_per_sec must be non-negative and finite"));
        }
        Ok(())
    }

    /// Returns the target step period.
    #[must_use]
    pub fn period(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.frequency_hz).unwrap_or(Duration::MAX)
    }
}
