// crates/geofeed-relay/src/server.rs
// ============================================================================
// Module: Relay Server
// Description: axum router exposing the subscriber stream.
// Purpose: Upgrade subscribers to WebSocket sessions and shut down cleanly.
// Dependencies: axum, futures-util, geofeed-core, thiserror, tokio, tokio-util
// ============================================================================

//! ## Overview
//! Routes:
//! - `GET /ping` answers `pong` for health checks;
//! - `GET /geolocation/stream` upgrades to a WebSocket and runs a [`Session`].
//!
//! The server is built from an explicit [`RelayContext`]; nothing is global.
//! Every session runs under a child of the shutdown token, so cancelling that
//! token closes all sessions and stops [`serve`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::Response;
use axum::routing::get;
use futures_util::SinkExt;
use futures_util::StreamExt;
use futures_util::stream::SplitSink;
use futures_util::stream::SplitStream;
use geofeed_core::LogEvent;
use geofeed_core::LogLevel;
use geofeed_core::SharedChangeFeed;
use geofeed_core::SharedGeolocationStore;
use geofeed_core::SharedLogSink;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::message::PONG_TEXT;
use crate::session::Session;
use crate::session::SessionSettings;
use crate::transport::Frame;
use crate::transport::FrameReader;
use crate::transport::FrameWriter;
use crate::transport::TransportError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Health check route.
pub const PING_ROUTE: &str = "/ping";

/// Subscriber stream route.
pub const STREAM_ROUTE: &str = "/geolocation/stream";

/// Server errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    /// Session settings were invalid.
    #[error("invalid relay settings: {0}")]
    Config(String),
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {message}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Bind failure.
        message: String,
    },
    /// The server failed while running.
    #[error("server io error: {0}")]
    Io(String),
}

/// Dependencies shared by every session.
#[derive(Clone)]
pub struct RelayContext {
    /// Store for snapshots and fetches.
    pub store: SharedGeolocationStore,
    /// Change feed sessions listen on.
    pub feed: SharedChangeFeed,
    /// Per-session settings.
    pub settings: SessionSettings,
    /// Structured log sink.
    pub log: SharedLogSink,
}

impl RelayContext {
    /// Builds a context after validating the session settings.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] when the settings are invalid.
    pub fn new(
        store: SharedGeolocationStore,
        feed: SharedChangeFeed,
        settings: SessionSettings,
        log: SharedLogSink,
    ) -> Result<Self, ServerError> {
        settings.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        Ok(Self {
            store,
            feed,
            settings,
            log,
        })
    }

    /// Creates a session bound to this context.
    #[must_use]
    pub fn session(&self) -> Session {
        Session::new(
            self.store.clone(),
            self.feed.clone(),
            self.settings,
            self.log.clone(),
        )
    }
}

/// Router state.
#[derive(Clone)]
struct RelayState {
    /// Shared dependencies.
    context: RelayContext,
    /// Parent token of every session.
    shutdown: CancellationToken,
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the relay router.
pub fn router(context: RelayContext, shutdown: CancellationToken) -> Router {
    Router::new()
        .route(PING_ROUTE, get(ping))
        .route(STREAM_ROUTE, get(stream))
        .with_state(RelayState {
            context,
            shutdown,
        })
}

/// Binds the listen address.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] when the address is unavailable.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr).await.map_err(|err| ServerError::Bind {
        addr: addr.to_string(),
        message: err.to_string(),
    })
}

/// Serves the relay until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns [`ServerError::Io`] when the listener fails.
pub async fn serve(
    listener: TcpListener,
    context: RelayContext,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let local = listener.local_addr().map_err(|err| ServerError::Io(err.to_string()))?;
    let log = context.log.clone();
    log.record(
        &LogEvent::new("server_started", LogLevel::Info, "relay listening")
            .with_field("addr", local.to_string()),
    );
    let app = router(context, shutdown.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|err| ServerError::Io(err.to_string()))?;
    log.record(&LogEvent::new("server_stopped", LogLevel::Info, "relay stopped"));
    Ok(())
}

/// Health check handler.
async fn ping() -> &'static str {
    PONG_TEXT
}

/// Upgrades a subscriber to a WebSocket session.
async fn stream(State(state): State<RelayState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_socket(socket, state))
}

/// Runs one session over an upgraded socket.
async fn run_socket(socket: WebSocket, state: RelayState) {
    let (sink, stream) = socket.split();
    let session = state.context.session();
    session.run(WebSocketReader(stream), WebSocketWriter(sink), state.shutdown).await;
}

// ============================================================================
// SECTION: WebSocket Transport
// ============================================================================

/// Outbound half of an axum WebSocket.
pub struct WebSocketWriter(SplitSink<WebSocket, Message>);

/// Inbound half of an axum WebSocket.
pub struct WebSocketReader(SplitStream<WebSocket>);

#[async_trait]
impl FrameWriter for WebSocketWriter {
    async fn write(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.0.send(to_message(frame)).await.map_err(|err| TransportError(err.to_string()))
    }

    async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.0.close().await.map_err(|err| TransportError(err.to_string()))
    }
}

#[async_trait]
impl FrameReader for WebSocketReader {
    async fn read(&mut self) -> Option<Result<Frame, TransportError>> {
        let message = self.0.next().await?;
        Some(message.map(from_message).map_err(|err| TransportError(err.to_string())))
    }
}

/// Converts an outbound frame into an axum message.
fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(payload) => Message::Binary(payload.into()),
        Frame::Ping(payload) => Message::Ping(payload.into()),
        Frame::Pong(payload) => Message::Pong(payload.into()),
        Frame::Close => Message::Close(None),
    }
}

/// Converts an inbound axum message into a frame.
fn from_message(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Text(text.as_str().to_owned()),
        Message::Binary(payload) => Frame::Binary(payload.to_vec()),
        Message::Ping(payload) => Frame::Ping(payload.to_vec()),
        Message::Pong(payload) => Frame::Pong(payload.to_vec()),
        Message::Close(_) => Frame::Close,
    }
}
