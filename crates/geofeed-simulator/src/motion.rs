// crates/geofeed-simulator/src/motion.rs
// ============================================================================
// Module: Simulator Motion
// Description: Bounded-region bounce motion for simulated devices.
// Purpose: Advance device positions deterministically from elapsed time.
// Dependencies: geofeed-core, rand
// ============================================================================

//! ## Overview
//! Each device moves in a straight line at constant speed. When it leaves the
//! home circle its velocity is reversed, and a cooldown prevents it from
//! reversing again while it is still travelling back inside.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::f64::consts::TAU;
use std::time::Duration;

use geofeed_core::CoordinateError;
use geofeed_core::Coordinates;
use geofeed_core::DeviceId;
use geofeed_core::MAX_LATITUDE;
use geofeed_core::MAX_LONGITUDE;
use rand::Rng;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Circular home region in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HomeRegion {
    /// Center latitude.
    pub center_latitude: f64,
    /// Center longitude.
    pub center_longitude: f64,
    /// Radius in degrees.
    pub radius: f64,
}

impl HomeRegion {
    /// Builds a region around a validated center.
    #[must_use]
    pub const fn new(center: Coordinates, radius: f64) -> Self {
        Self {
            center_latitude: center.latitude(),
            center_longitude: center.longitude(),
            radius,
        }
    }

    /// Returns true when the point lies strictly outside the circle.
    #[must_use]
    pub fn is_outside(&self, latitude: f64, longitude: f64) -> bool {
        let d_lat = latitude - self.center_latitude;
        let d_lon = longitude - self.center_longitude;
        d_lat.mul_add(d_lat, d_lon * d_lon) > self.radius * self.radius
    }
}

/// Simulated device state.
///
/// # Invariants
/// - Velocity magnitude never changes; bounces only flip its sign.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedDevice {
    /// Store-assigned identifier.
    pub device_id: DeviceId,
    /// Current latitude.
    pub latitude: f64,
    /// Current longitude.
    pub longitude: f64,
    /// Latitude velocity in degrees per second.
    pub velocity_latitude: f64,
    /// Longitude velocity in degrees per second.
    pub velocity_longitude: f64,
    /// Remaining steps before another bounce is allowed.
    pub cooldown: u32,
}

impl SimulatedDevice {
    /// Places a device at a random point within half the radius, with a random heading.
    pub fn spawn<R: Rng + ?Sized>(
        device_id: DeviceId,
        region: &HomeRegion,
        speed: f64,
        rng: &mut R,
    ) -> Self {
        let half = region.radius / 2.0;
        let latitude = half.mul_add(rng.gen_range(-1.0 ..= 1.0), region.center_latitude);
        let longitude = half.mul_add(rng.gen_range(-1.0 ..= 1.0), region.center_longitude);
        let heading: f64 = rng.gen_range(0.0 .. TAU);
        Self {
            device_id,
            latitude,
            longitude,
            velocity_latitude: speed * heading.sin(),
            velocity_longitude: speed * heading.cos(),
            cooldown: 0,
        }
    }

    /// Advances the device by `elapsed` and applies the bounce rule.
    ///
    /// Returns true when the velocity was reversed during this step.
    pub fn step(&mut self, elapsed: Duration, region: &HomeRegion, cooldown_steps: u32) -> bool {
        let seconds = elapsed.as_secs_f64();
        self.latitude = seconds.mul_add(self.velocity_latitude, self.latitude);
        self.longitude = seconds.mul_add(self.velocity_longitude, self.longitude);
        if self.cooldown == 0 && region.is_outside(self.latitude, self.longitude) {
            self.velocity_latitude = -self.velocity_latitude;
            self.velocity_longitude = -self.velocity_longitude;
            self.cooldown = cooldown_steps;
            return true;
        }
        self.cooldown = self.cooldown.saturating_sub(1);
        false
    }

    /// Returns the current position clamped to valid coordinate ranges.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError`] when the position is not a number.
    pub fn position(&self) -> Result<Coordinates, CoordinateError> {
        Coordinates::new(
            self.latitude.clamp(-MAX_LATITUDE, MAX_LATITUDE),
            self.longitude.clamp(-MAX_LONGITUDE, MAX_LONGITUDE),
        )
    }
}
