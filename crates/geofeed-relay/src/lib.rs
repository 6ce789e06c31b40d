// crates/geofeed-relay/src/lib.rs
// ============================================================================
// Module: Geofeed Relay Library
// Description: Change relay and subscriber delivery pipeline.
// Purpose: Expose the listener, coalescer, fetcher, sessions, and server.
// Dependencies: crate::{coalescer, fetcher, listener, message, pipeline, server, session, snapshot, transport}
// ============================================================================

//! ## Overview
//! The relay turns store change notifications into bounded, batched updates
//! for live subscribers:
//!
//! store feed -> [`ChangeListener`] -> [`Coalescer`] -> [`Fetcher`] -> [`Session`]
//!
//! Each subscriber gets its own pipeline, so one slow peer never delays the
//! others. Delivery is best-effort and at-least-once.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod coalescer;
pub mod fetcher;
pub mod listener;
pub mod message;
pub mod pipeline;
pub mod server;
pub mod session;
pub mod snapshot;
pub mod transport;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use coalescer::Coalescer;
pub use coalescer::CoalescerConfig;
pub use coalescer::CoalescerConfigError;
pub use coalescer::PendingBatch;
pub use fetcher::FetchError;
pub use fetcher::Fetcher;
pub use listener::ChangeEvent;
pub use listener::ChangeHandler;
pub use listener::ChangeListener;
pub use listener::HandlerError;
pub use listener::ListenerError;
pub use listener::parse_notification;
pub use message::GeolocationsMessage;
pub use message::PING_TEXT;
pub use message::PONG_TEXT;
pub use pipeline::CoalescingHandler;
pub use pipeline::DeliveryPipeline;
pub use server::PING_ROUTE;
pub use server::RelayContext;
pub use server::STREAM_ROUTE;
pub use server::ServerError;
pub use server::WebSocketReader;
pub use server::WebSocketWriter;
pub use server::bind;
pub use server::router;
pub use server::serve;
pub use session::CloseReason;
pub use session::KeepAlive;
pub use session::Session;
pub use session::SessionConfigError;
pub use session::SessionReport;
pub use session::SessionSettings;
pub use session::SessionState;
pub use snapshot::Snapshot;
pub use snapshot::SnapshotError;
pub use snapshot::SnapshotPolicy;
pub use transport::Frame;
pub use transport::FrameReader;
pub use transport::FrameWriter;
pub use transport::SessionError;
pub use transport::SessionWriter;
pub use transport::TransportError;
