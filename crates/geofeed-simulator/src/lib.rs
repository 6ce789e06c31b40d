// crates/geofeed-simulator/src/lib.rs
// ============================================================================
// Module: Geofeed Simulator Library
// Description: Simulated device producer for the geolocation store.
// Purpose: Generate realistic write load with explicit retry and insert policies.
// Dependencies: geofeed-core, rand, tokio, tokio-util
// ============================================================================

//! ## Overview
//! The simulator moves a fleet of devices around a circular home region and
//! writes one sample per device per step. It exercises the same store
//! interface as real producers, so every write triggers the same change
//! notifications the relay consumes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod motion;
pub mod retry;
pub mod runner;
pub mod settings;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use motion::HomeRegion;
pub use motion::SimulatedDevice;
pub use retry::RetryOutcome;
pub use retry::retry_transient;
pub use runner::Simulator;
pub use runner::SimulatorError;
pub use runner::SimulatorReport;
pub use runner::StepOutcome;
pub use settings::Backoff;
pub use settings::ExhaustionPolicy;
pub use settings::InsertMode;
pub use settings::RetryPolicy;
pub use settings::SimulatorConfigError;
pub use settings::SimulatorSettings;
