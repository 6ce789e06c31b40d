// crates/geofeed-simulator/tests/motion.rs
// ============================================================================
// Module: Simulator Motion Tests
// Description: Bounce reflection and bounded-position properties.
// Purpose: Pin the motion rule independently of the store.
// ============================================================================

//! Motion tests for simulated devices.

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

use std::time::Duration;

use geofeed_core::Coordinates;
use geofeed_core::DeviceId;
use geofeed_simulator::Backoff;
use geofeed_simulator::HomeRegion;
use geofeed_simulator::RetryPolicy;
use geofeed_simulator::SimulatedDevice;
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn unit_region() -> HomeRegion {
    HomeRegion::new(Coordinates::new(0.0, 0.0).unwrap(), 1.0)
}

fn device_at_origin(velocity_latitude: f64, velocity_longitude: f64) -> SimulatedDevice {
    SimulatedDevice {
        device_id: DeviceId::new("d"),
        latitude: 0.0,
        longitude: 0.0,
        velocity_latitude,
        velocity_longitude,
        cooldown: 0,
    }
}

#[test]
fn velocity_reverses_after_crossing_radius() {
    let region = unit_region();
    let mut device = device_at_origin(1.0, 0.0);
    let half_second = Duration::from_millis(500);

    assert!(!device.step(half_second, &region, 5));
    assert!(!device.step(half_second, &region, 5));
    assert_eq!(device.velocity_latitude, 1.0);
    assert!(device.step(half_second, &region, 5));
    assert_eq!(device.velocity_latitude, -1.0);
    assert_eq!(device.velocity_longitude, -0.0);
    assert_eq!(device.cooldown, 5);
}

#[test]
fn cooldown_blocks_second_bounce_and_saturates() {
    let region = unit_region();
    let mut device = device_at_origin(1.0, 0.0);
    device.latitude = 5.0;
    device.cooldown = 2;
    assert!(!device.step(Duration::ZERO, &region, 5));
    assert_eq!(device.cooldown, 1);
    assert!(!device.step(Duration::ZERO, &region, 5));
    assert_eq!(device.cooldown, 0);
    assert!(device.step(Duration::ZERO, &region, 5));
    assert_eq!(device.velocity_latitude, -1.0);

    let mut inside = device_at_origin(0.0, 0.0);
    inside.step(Duration::from_secs(1), &region, 5);
    assert_eq!(inside.cooldown, 0);
}

#[test]
fn spawn_places_devices_within_half_radius() {
    let region = HomeRegion::new(Coordinates::new(53.5357, -113.5068).unwrap(), 0.25);
    let mut rng = StdRng::seed_from_u64(11);
    for index in 0 .. 200 {
        let device =
            SimulatedDevice::spawn(DeviceId::new(format!("d{index}")), &region, 0.025, &mut rng);
        assert!((device.latitude - region.center_latitude).abs() <= 0.125 + 1e-12);
        assert!((device.longitude - region.center_longitude).abs() <= 0.125 + 1e-12);
        let speed = device.velocity_latitude.hypot(device.velocity_longitude);
        assert!((speed - 0.025).abs() < 1e-12);
    }
}

#[test]
fn exponential_backoff_doubles_and_caps() {
    let policy = RetryPolicy::new(
        5,
        Duration::from_millis(2),
        Backoff::Exponential,
        Some(Duration::from_millis(10)),
    )
    .unwrap();
    let delays: Vec<u128> =
        (1 ..= 5).map(|attempt| policy.delay_after(attempt).as_millis()).collect();
    assert_eq!(delays, vec![2, 4, 8, 10, 10]);

    let fixed = RetryPolicy::new(3, Duration::from_millis(2), Backoff::Fixed, None).unwrap();
    assert_eq!(fixed.delay_after(3), Duration::from_millis(2));
    assert!(RetryPolicy::new(0, Duration::ZERO, Backoff::Fixed, None).is_err());
}

proptest! {
    #[test]
    fn position_stays_near_home_region(seed in any::<u64>(), steps in 1usize .. 2_000) {
        let region = unit_region();
        let speed: f64 = 0.5;
        let dt = Duration::from_millis(33);
        let cooldown: u32 = 5;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut device = SimulatedDevice::spawn(DeviceId::new("d"), &region, speed, &mut rng);
        let bound = speed.mul_add(dt.as_secs_f64() * f64::from(cooldown + 2), region.radius);
        for _ in 0 .. steps {
            device.step(dt, &region, cooldown);
            let distance = device.latitude.hypot(device.longitude);
            prop_assert!(distance <= bound, "distance {} exceeded {}", distance, bound);
        }
    }
}
