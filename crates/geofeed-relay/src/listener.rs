// crates/geofeed-relay/src/listener.rs
// ============================================================================
// Module: Change Listener
// Description: Turns store notifications into change events.
// Purpose: Feed the coalescer one event per notification, in receipt order.
// Dependencies: async-trait, geofeed-core, thiserror, tokio, tokio-util
// ============================================================================

//! ## Overview
//! A [`ChangeListener`] owns a receiver on the store's change feed and hands
//! one [`ChangeEvent`] per notification to a [`ChangeHandler`]. It does not
//! deduplicate. Anything that means notifications were lost or cannot be
//! understood (a lagged receiver, a closed feed, a malformed payload) ends the
//! listener with an error, because silently continuing would leave the
//! subscriber with a stale view.
//!
//! The receiver is attached when the listener is constructed, so a session can
//! build its listener before reading the snapshot and miss nothing in between.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use geofeed_core::ChangeFeed;
use geofeed_core::DeviceId;
use geofeed_core::INSERT_CHANNEL;
use geofeed_core::StoreNotification;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Notification that a device has a new sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeEvent {
    /// Device whose latest sample changed.
    pub device_id: DeviceId,
}

/// Error returned by a [`ChangeHandler`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    /// Builds a handler error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Change listener errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListenerError {
    /// Notification arrived on a channel other than the insert channel.
    #[error("notification on unexpected channel: {0}")]
    UnexpectedChannel(String),
    /// Notification payload was not a device identifier.
    #[error("malformed notification payload: {0}")]
    MalformedPayload(String),
    /// The receiver fell behind and notifications were dropped.
    #[error("change feed lagged, {0} notifications lost")]
    Lagged(u64),
    /// The change feed was closed.
    #[error("change feed closed")]
    Closed,
    /// The handler rejected an event.
    #[error("change handler failed: {0}")]
    Handler(String),
}

/// Consumer of change events.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    /// Handles one change event.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the event cannot be accepted; the
    /// listener stops.
    async fn handle(&self, event: ChangeEvent) -> Result<(), HandlerError>;
}

/// Change listener bound to one feed receiver.
pub struct ChangeListener {
    /// Receiver attached at construction time.
    receiver: broadcast::Receiver<StoreNotification>,
}

// ============================================================================
// SECTION: Listener
// ============================================================================

impl ChangeListener {
    /// Attaches a new receiver to the feed.
    #[must_use]
    pub fn new(feed: &dyn ChangeFeed) -> Self {
        Self {
            receiver: feed.subscribe(),
        }
    }

    /// Delivers events to `handler` until cancelled or failed.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError`] on a malformed notification, lost
    /// notifications, a closed feed, or a handler failure. Cancellation
    /// returns `Ok(())`.
    pub async fn subscribe<H>(
        mut self,
        cancel: &CancellationToken,
        handler: &H,
    ) -> Result<(), ListenerError>
    where
        H: ChangeHandler + ?Sized,
    {
        loop {
            let received = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                received = self.receiver.recv() => received,
            };
            let notification = match received {
                Ok(notification) => notification,
                Err(RecvError::Lagged(skipped)) => return Err(ListenerError::Lagged(skipped)),
                Err(RecvError::Closed) => return Err(ListenerError::Closed),
            };
            let event = parse_notification(&notification)?;
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                handled = handler.handle(event) => {
                    handled.map_err(|err| ListenerError::Handler(err.to_string()))?;
                }
            }
        }
    }
}

/// Validates a store notification and extracts the change event.
///
/// # Errors
///
/// Returns [`ListenerError::UnexpectedChannel`] or
/// [`ListenerError::MalformedPayload`].
pub fn parse_notification(notification: &StoreNotification) -> Result<ChangeEvent, ListenerError> {
    if notification.channel != INSERT_CHANNEL {
        return Err(ListenerError::UnexpectedChannel(notification.channel.clone()));
    }
    let device_id = DeviceId::parse(&notification.payload)
        .map_err(|err| ListenerError::MalformedPayload(err.to_string()))?;
    Ok(ChangeEvent {
        device_id,
    })
}
