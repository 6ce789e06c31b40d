// crates/geofeed-relay/tests/session.rs
// ============================================================================
// Module: Subscriber Session Tests
// Description: Snapshot, live delivery, keep-alive, and termination paths.
// Purpose: Validate the session state machine over channel transports.
// ============================================================================

//! Subscriber session tests.

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
use std::sync::atomic::Ordering;
use std::time::Duration;

use geofeed_core::GeolocationStore;
use geofeed_core::InMemoryGeolocationStore;
use geofeed_core::LogLevel;
use geofeed_core::MemoryLogSink;
use geofeed_relay::CloseReason;
use geofeed_relay::Frame;
use geofeed_relay::KeepAlive;
use geofeed_relay::Session;
use geofeed_relay::SessionError;
use geofeed_relay::SessionReport;
use geofeed_relay::SessionSettings;
use geofeed_relay::SessionWriter;
use geofeed_relay::TransportError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::common::ChannelReader;
use crate::common::RecordingWriter;
use crate::common::Wire;
use crate::common::channel_reader;
use crate::common::devices;
use crate::common::sample;
use crate::common::seed;
use crate::common::settings;

// ============================================================================
// SECTION: Harness
// ============================================================================

struct Running {
    store: Arc<InMemoryGeolocationStore>,
    log: Arc<MemoryLogSink>,
    cancel: CancellationToken,
    handle: JoinHandle<SessionReport>,
}

fn start(
    store: Arc<InMemoryGeolocationStore>,
    settings: SessionSettings,
    reader: ChannelReader,
    writer: RecordingWriter,
) -> Running {
    let log = Arc::new(MemoryLogSink::default());
    let session = Session::new(store.clone(), store.clone(), settings, log.clone());
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(session.run(reader, writer, cancel.clone()));
    Running {
        store,
        log,
        cancel,
        handle,
    }
}

fn quiet() -> SessionSettings {
    settings(1_000, 3_600_000, 100, 50)
}

// ============================================================================
// SECTION: Snapshot
// ============================================================================

#[tokio::test(start_paused = true)]
async fn snapshot_is_the_first_frame() {
    let store = Arc::new(InMemoryGeolocationStore::default());
    seed(&store, 3);
    let wire = Wire::default();
    let (_peer, reader) = channel_reader();
    let running = start(store, quiet(), reader, RecordingWriter::new(&wire));

    tokio::time::sleep(Duration::from_millis(10)).await;
    running.cancel.cancel();
    let report = running.handle.await.unwrap();

    assert_eq!(report.reason, CloseReason::Cancelled);
    assert_eq!(report.snapshot_records, 3);
    let frames = wire.frames();
    assert!(matches!(frames.first(), Some(Frame::Text(_))));
    assert_eq!(wire.data_frames()[0].geolocations.len(), 3);
    assert_eq!(frames.last(), Some(&Frame::Close));
    assert_eq!(wire.shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(running.log.count("session_opened"), 1);
    assert_eq!(running.log.count("snapshot_sent"), 1);
    assert_eq!(running.log.count("session_closed"), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_snapshot_still_sends_a_frame() {
    let store = Arc::new(InMemoryGeolocationStore::default());
    let wire = Wire::default();
    let (_peer, reader) = channel_reader();
    let running = start(store, quiet(), reader, RecordingWriter::new(&wire));

    tokio::time::sleep(Duration::from_millis(10)).await;
    running.cancel.cancel();
    running.handle.await.unwrap();

    assert_eq!(wire.frames()[0], Frame::Text("{\"geolocations\":[]}".to_string()));
}

// ============================================================================
// SECTION: Delivery
// ============================================================================

#[tokio::test(start_paused = true)]
async fn data_frames_and_pings_never_interleave() {
    let store = Arc::new(InMemoryGeolocationStore::default());
    let ids = devices(&store, 10);
    let wire = Wire::default();
    let (_peer, reader) = channel_reader();
    let running = start(
        store,
        settings(50, 3_600_000, 1, 10),
        reader,
        RecordingWriter::with_delay(&wire, Duration::from_millis(5)),
    );

    tokio::time::sleep(Duration::from_millis(5)).await;
    for id in &ids {
        running.store.insert_sample(&sample(id, 1, 51.0)).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    running.cancel.cancel();
    let report = running.handle.await.unwrap();

    let data = wire.data_frames();
    assert_eq!(data.len(), 1 + ids.len());
    for (frame, id) in data[1 ..].iter().zip(&ids) {
        assert_eq!(frame.geolocations.len(), 1);
        assert_eq!(&frame.geolocations[0].device_id, id);
    }
    let pings = wire.count(|frame| matches!(frame, Frame::Ping(_)));
    assert!(pings >= 5, "expected pings, saw {pings}");
    assert_eq!(wire.frames().len(), data.len() + pings + 1);
    assert_eq!(wire.overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(report.batches_delivered, 10);
    assert_eq!(report.samples_delivered, 10);
}

#[tokio::test(start_paused = true)]
async fn coalesced_updates_arrive_as_one_frame() {
    let store = Arc::new(InMemoryGeolocationStore::default());
    let ids = devices(&store, 4);
    let wire = Wire::default();
    let (_peer, reader) = channel_reader();
    let running = start(store, settings(1_000, 3_600_000, 100, 50), reader, RecordingWriter::new(&wire));

    tokio::time::sleep(Duration::from_millis(5)).await;
    for id in &ids {
        running.store.insert_sample(&sample(id, 1, 51.0)).unwrap();
        running.store.insert_sample(&sample(id, 2, 52.0)).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    running.cancel.cancel();
    let report = running.handle.await.unwrap();

    let data = wire.data_frames();
    assert_eq!(data.len(), 2);
    assert_eq!(data[1].geolocations.len(), 4);
    assert!(data[1].geolocations.iter().all(|sample| sample.latitude == 52.0));
    assert_eq!(report.batches_delivered, 1);
}

#[tokio::test(start_paused = true)]
async fn lagging_listener_ends_the_session() {
    let store = Arc::new(InMemoryGeolocationStore::new(2));
    let ids = devices(&store, 6);
    let wire = Wire::default();
    let (_peer, reader) = channel_reader();
    let running = start(store, quiet(), reader, RecordingWriter::new(&wire));

    tokio::time::sleep(Duration::from_millis(5)).await;
    for id in &ids {
        running.store.insert_sample(&sample(id, 1, 51.0)).unwrap();
    }
    let report = running.handle.await.unwrap();

    assert!(matches!(report.reason, CloseReason::PipelineFailed(ref message) if message.contains("lagged")));
    assert_eq!(running.log.count("listener_failed"), 1);
}

// ============================================================================
// SECTION: Inbound and Keep-Alive
// ============================================================================

#[tokio::test(start_paused = true)]
async fn text_ping_is_answered_with_pong() {
    let store = Arc::new(InMemoryGeolocationStore::default());
    let wire = Wire::default();
    let (peer, reader) = channel_reader();
    let running = start(store, quiet(), reader, RecordingWriter::new(&wire));

    tokio::time::sleep(Duration::from_millis(5)).await;
    peer.send(Ok(Frame::Text("ping".to_string()))).unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    running.cancel.cancel();
    running.handle.await.unwrap();

    assert_eq!(wire.count(|frame| *frame == Frame::Text("pong".to_string())), 1);
}

#[tokio::test(start_paused = true)]
async fn silent_peer_is_closed_within_one_ping_interval_of_deadline() {
    let store = Arc::new(InMemoryGeolocationStore::default());
    let wire = Wire::default();
    let (_peer, reader) = channel_reader();
    let started = Instant::now();
    let running = start(store, settings(200, 300, 100, 50), reader, RecordingWriter::new(&wire));

    let report = running.handle.await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(report.reason, CloseReason::LivenessTimeout);
    assert!(elapsed > Duration::from_millis(300));
    assert!(elapsed <= Duration::from_millis(500), "closed after {elapsed:?}");
    assert_eq!(wire.frames().last(), Some(&Frame::Close));
    let closed = running.log.events().into_iter().find(|event| event.event == "session_closed");
    assert_eq!(closed.unwrap().level, LogLevel::Warn);
}

#[tokio::test(start_paused = true)]
async fn inbound_traffic_keeps_the_session_alive() {
    let store = Arc::new(InMemoryGeolocationStore::default());
    let wire = Wire::default();
    let (peer, reader) = channel_reader();
    let running = start(store, settings(200, 300, 100, 50), reader, RecordingWriter::new(&wire));

    for _ in 0 .. 10 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        peer.send(Ok(Frame::Pong(Vec::new()))).unwrap();
    }
    running.cancel.cancel();
    let report = running.handle.await.unwrap();

    assert_eq!(report.reason, CloseReason::Cancelled);
    assert!(wire.count(|frame| matches!(frame, Frame::Ping(_))) >= 4);
}

// ============================================================================
// SECTION: Termination
// ============================================================================

#[tokio::test(start_paused = true)]
async fn peer_close_is_logged_not_escalated() {
    let store = Arc::new(InMemoryGeolocationStore::default());
    let wire = Wire::default();
    let (peer, reader) = channel_reader();
    let running = start(store, quiet(), reader, RecordingWriter::new(&wire));

    tokio::time::sleep(Duration::from_millis(5)).await;
    peer.send(Ok(Frame::Close)).unwrap();
    let report = running.handle.await.unwrap();

    assert_eq!(report.reason, CloseReason::PeerClosed);
    let closed = running.log.events().into_iter().find(|event| event.event == "session_closed");
    assert_eq!(closed.unwrap().level, LogLevel::Info);
    assert_eq!(wire.shutdowns.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn lifecycle_transitions_are_logged_in_order() {
    let store = Arc::new(InMemoryGeolocationStore::default());
    let wire = Wire::default();
    let (_peer, reader) = channel_reader();
    let running = start(store, quiet(), reader, RecordingWriter::new(&wire));

    tokio::time::sleep(Duration::from_millis(5)).await;
    running.cancel.cancel();
    running.handle.await.unwrap();

    let transitions: Vec<(String, String)> = running
        .log
        .events()
        .into_iter()
        .filter(|event| event.event == "session_state")
        .map(|event| {
            let field = |name: &str| {
                event.fields.get(name).and_then(|value| value.as_str()).unwrap().to_string()
            };
            (field("from"), field("state"))
        })
        .collect();
    let expected = [("connecting", "active"), ("active", "closing"), ("closing", "closed")];
    assert_eq!(transitions.len(), expected.len());
    for ((from, to), (want_from, want_to)) in transitions.iter().zip(expected) {
        assert_eq!(from, want_from);
        assert_eq!(to, want_to);
    }
}

#[tokio::test(start_paused = true)]
async fn end_of_stream_counts_as_peer_close() {
    let store = Arc::new(InMemoryGeolocationStore::default());
    let wire = Wire::default();
    let (peer, reader) = channel_reader();
    let running = start(store, quiet(), reader, RecordingWriter::new(&wire));

    tokio::time::sleep(Duration::from_millis(5)).await;
    drop(peer);
    assert_eq!(running.handle.await.unwrap().reason, CloseReason::PeerClosed);
}

#[tokio::test(start_paused = true)]
async fn read_error_ends_the_session() {
    let store = Arc::new(InMemoryGeolocationStore::default());
    let wire = Wire::default();
    let (peer, reader) = channel_reader();
    let running = start(store, quiet(), reader, RecordingWriter::new(&wire));

    tokio::time::sleep(Duration::from_millis(5)).await;
    peer.send(Err(TransportError("reset by peer".to_string()))).unwrap();
    let report = running.handle.await.unwrap();
    assert_eq!(report.reason, CloseReason::ReadFailed("reset by peer".to_string()));
}

#[tokio::test(start_paused = true)]
async fn stalled_writer_times_out() {
    let store = Arc::new(InMemoryGeolocationStore::default());
    let wire = Wire::default();
    let (_peer, reader) = channel_reader();
    let started = Instant::now();
    let running = start(
        store,
        quiet(),
        reader,
        RecordingWriter::with_delay(&wire, Duration::from_secs(3_600)),
    );

    let report = running.handle.await.unwrap();
    assert!(matches!(report.reason, CloseReason::WriteFailed(ref message) if message.contains("timed out")));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(report.snapshot_records, 0);
    assert_eq!(wire.shutdowns.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn writer_close_is_idempotent() {
    let wire = Wire::default();
    let writer =
        SessionWriter::new(Box::new(RecordingWriter::new(&wire)), Duration::from_millis(100));
    writer.send(Frame::Text("hello".to_string())).await.unwrap();
    assert!(writer.close().await);
    assert!(!writer.close().await);
    assert!(writer.is_closed().await);
    assert_eq!(writer.send(Frame::Ping(Vec::new())).await, Err(SessionError::Closed));
    assert_eq!(wire.frames(), vec![Frame::Text("hello".to_string()), Frame::Close]);
    assert_eq!(wire.shutdowns.load(Ordering::SeqCst), 1);
}

#[test]
fn keep_alive_requires_pong_wait_beyond_ping_interval() {
    let ms = Duration::from_millis;
    assert!(KeepAlive::new(ms(100), ms(100), ms(10)).is_err());
    assert!(KeepAlive::new(ms(100), ms(50), ms(10)).is_err());
    assert!(KeepAlive::new(ms(0), ms(50), ms(10)).is_err());
    assert!(KeepAlive::new(ms(100), ms(200), ms(0)).is_err());
    let keep_alive = KeepAlive::new(ms(9_000), ms(10_000), ms(3_000)).unwrap();
    assert_eq!(keep_alive.pong_wait(), ms(10_000));
}

#[test]
fn settings_reject_zero_channel_capacity() {
    let mut invalid = quiet();
    invalid.channel_capacity = 0;
    assert!(invalid.validate().is_err());
    assert!(quiet().validate().is_ok());
}
