// crates/geofeed-relay/tests/common/mod.rs
// =============================================================================
// Module: Relay Test Helpers
// Description: Channel-backed transports and store fixtures.
// Purpose: Drive sessions without a network and seed stores tersely.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use geofeed_core::DeviceId;
use geofeed_core::GeolocationStore;
use geofeed_core::InMemoryGeolocationStore;
use geofeed_core::NewSample;
use geofeed_relay::CoalescerConfig;
use geofeed_relay::Frame;
use geofeed_relay::FrameReader;
use geofeed_relay::FrameWriter;
use geofeed_relay::GeolocationsMessage;
use geofeed_relay::KeepAlive;
use geofeed_relay::SessionSettings;
use geofeed_relay::SnapshotPolicy;
use geofeed_relay::TransportError;
use time::macros::datetime;
use tokio::sync::mpsc;

// ============================================================================
// SECTION: Transport
// ============================================================================

/// Reader fed by the test through an unbounded channel.
pub struct ChannelReader {
    pub rx: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
}

#[async_trait]
impl FrameReader for ChannelReader {
    async fn read(&mut self) -> Option<Result<Frame, TransportError>> {
        self.rx.recv().await
    }
}

/// Creates a reader and the sender the test uses to act as the peer.
pub fn channel_reader() -> (mpsc::UnboundedSender<Result<Frame, TransportError>>, ChannelReader) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        tx,
        ChannelReader {
            rx,
        },
    )
}

/// Everything a [`RecordingWriter`] observed.
#[derive(Clone, Default)]
pub struct Wire {
    pub frames: Arc<Mutex<Vec<Frame>>>,
    pub overlaps: Arc<AtomicUsize>,
    pub shutdowns: Arc<AtomicUsize>,
    in_flight: Arc<AtomicBool>,
}

impl Wire {
    pub fn frames(&self) -> Vec<Frame> {
        self.frames.lock().unwrap().clone()
    }

    /// Data frames decoded from text, excluding `pong` replies.
    pub fn data_frames(&self) -> Vec<GeolocationsMessage> {
        self.frames()
            .into_iter()
            .filter_map(|frame| match frame {
                Frame::Text(text) if text != "pong" => Some(serde_json::from_str(&text).unwrap()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&Frame) -> bool) -> usize {
        self.frames().iter().filter(|frame| predicate(frame)).count()
    }
}

/// Writer that records frames, optionally taking `delay` per write.
pub struct RecordingWriter {
    pub wire: Wire,
    pub delay: Duration,
}

impl RecordingWriter {
    pub fn new(wire: &Wire) -> Self {
        Self {
            wire: wire.clone(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(wire: &Wire, delay: Duration) -> Self {
        Self {
            wire: wire.clone(),
            delay,
        }
    }
}

#[async_trait]
impl FrameWriter for RecordingWriter {
    async fn write(&mut self, frame: Frame) -> Result<(), TransportError> {
        if self.wire.in_flight.swap(true, Ordering::SeqCst) {
            self.wire.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.wire.frames.lock().unwrap().push(frame);
        self.wire.in_flight.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.wire.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// SECTION: Settings
// ============================================================================

pub fn settings(
    ping_interval_ms: u64,
    pong_wait_ms: u64,
    max_batch: usize,
    max_wait_ms: u64,
) -> SessionSettings {
    SessionSettings {
        keep_alive: KeepAlive::new(
            Duration::from_millis(ping_interval_ms),
            Duration::from_millis(pong_wait_ms),
            Duration::from_millis(100),
        )
        .unwrap(),
        snapshot: SnapshotPolicy::Complete {
            page_size: 100,
        },
        coalescer: CoalescerConfig::new(max_batch, Duration::from_millis(max_wait_ms)).unwrap(),
        channel_capacity: 16,
    }
}

// ============================================================================
// SECTION: Store Fixtures
// ============================================================================

/// Builds a sample `minute` minutes into 2024.
pub fn sample(device_id: &DeviceId, minute: u8, latitude: f64) -> NewSample {
    let event_time = datetime!(2024-01-01 00:00 UTC) + time::Duration::minutes(i64::from(minute));
    NewSample::new(device_id.clone(), event_time, latitude, -113.5).unwrap()
}

/// Creates `count` devices with one sample each.
pub fn seed(store: &InMemoryGeolocationStore, count: usize) -> Vec<DeviceId> {
    (0 .. count)
        .map(|index| {
            let id = store.insert_device(&format!("device-{index}")).unwrap();
            store.insert_sample(&sample(&id, 0, 50.0)).unwrap();
            id
        })
        .collect()
}

/// Creates `count` devices without samples.
pub fn devices(store: &InMemoryGeolocationStore, count: usize) -> Vec<DeviceId> {
    (0 .. count)
        .map(|index| store.insert_device(&format!("device-{index}")).unwrap())
        .collect()
}
