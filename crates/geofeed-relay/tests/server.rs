// crates/geofeed-relay/tests/server.rs
// ============================================================================
// Module: Relay Server Tests
// Description: Health route, WebSocket upgrade, and graceful shutdown.
// Purpose: Exercise the axum surface over a real loopback socket.
// ============================================================================

//! Relay server tests.

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

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use geofeed_core::InMemoryGeolocationStore;
use geofeed_core::MemoryLogSink;
use geofeed_relay::GeolocationsMessage;
use geofeed_relay::RelayContext;
use geofeed_relay::ServerError;
use geofeed_relay::bind;
use geofeed_relay::serve;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::common::seed;
use crate::common::settings;

struct Running {
    addr: SocketAddr,
    log: Arc<MemoryLogSink>,
    shutdown: CancellationToken,
    handle: JoinHandle<Result<(), ServerError>>,
}

async fn start(store: Arc<InMemoryGeolocationStore>) -> Running {
    let log = Arc::new(MemoryLogSink::default());
    let context =
        RelayContext::new(store.clone(), store, settings(9_000, 10_000, 100, 500), log.clone())
            .unwrap();
    let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(serve(listener, context, shutdown.clone()));
    Running {
        addr,
        log,
        shutdown,
        handle,
    }
}

async fn request(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

/// Reads one unmasked server frame and returns its opcode and payload.
async fn read_frame(stream: &mut TcpStream) -> (u8, Vec<u8>) {
    let mut head = [0u8; 2];
    stream.read_exact(&mut head).await.unwrap();
    let opcode = head[0] & 0x0f;
    let length = match head[1] & 0x7f {
        126 => {
            let mut extended = [0u8; 2];
            stream.read_exact(&mut extended).await.unwrap();
            usize::from(u16::from_be_bytes(extended))
        }
        127 => {
            let mut extended = [0u8; 8];
            stream.read_exact(&mut extended).await.unwrap();
            usize::try_from(u64::from_be_bytes(extended)).unwrap()
        }
        short => usize::from(short),
    };
    let mut payload = vec![0u8; length];
    stream.read_exact(&mut payload).await.unwrap();
    (opcode, payload)
}

#[tokio::test]
async fn ping_route_answers_pong() {
    let running = start(Arc::new(InMemoryGeolocationStore::default())).await;
    let response = request(
        running.addr,
        "GET /ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.ends_with("pong"), "{response}");

    running.shutdown.cancel();
    running.handle.await.unwrap().unwrap();
    assert_eq!(running.log.count("server_started"), 1);
    assert_eq!(running.log.count("server_stopped"), 1);
}

#[tokio::test]
async fn stream_route_requires_upgrade() {
    let running = start(Arc::new(InMemoryGeolocationStore::default())).await;
    let response = request(
        running.addr,
        "GET /geolocation/stream HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 4"), "{response}");
    running.shutdown.cancel();
    running.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn websocket_subscriber_receives_snapshot_then_close_on_shutdown() {
    let store = Arc::new(InMemoryGeolocationStore::default());
    seed(&store, 2);
    let running = start(store).await;

    let mut stream = TcpStream::connect(running.addr).await.unwrap();
    let handshake = "GET /geolocation/stream HTTP/1.1\r\n\
                     Host: localhost\r\n\
                     Upgrade: websocket\r\n\
                     Connection: Upgrade\r\n\
                     Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                     Sec-WebSocket-Version: 13\r\n\r\n";
    stream.write_all(handshake.as_bytes()).await.unwrap();

    let mut header = Vec::new();
    while !header.ends_with(b"\r\n\r\n") {
        let mut byte = [0u8; 1];
        stream.read_exact(&mut byte).await.unwrap();
        header.push(byte[0]);
    }
    let header = String::from_utf8(header).unwrap();
    assert!(header.starts_with("HTTP/1.1 101"), "{header}");

    let (opcode, payload) = read_frame(&mut stream).await;
    assert_eq!(opcode, 0x1);
    let snapshot: GeolocationsMessage = serde_json::from_slice(&payload).unwrap();
    assert_eq!(snapshot.geolocations.len(), 2);

    running.shutdown.cancel();
    let (opcode, _) = tokio::time::timeout(Duration::from_secs(5), read_frame(&mut stream))
        .await
        .unwrap();
    assert_eq!(opcode, 0x8);
    drop(stream);
    tokio::time::timeout(Duration::from_secs(5), running.handle).await.unwrap().unwrap().unwrap();
}

#[test]
fn context_rejects_invalid_settings() {
    let store = Arc::new(InMemoryGeolocationStore::default());
    let mut invalid = settings(9_000, 10_000, 100, 500);
    invalid.channel_capacity = 0;
    let result = RelayContext::new(
        store.clone(),
        store,
        invalid,
        Arc::new(MemoryLogSink::default()),
    );
    assert!(matches!(result, Err(ServerError::Config(_))));
}
