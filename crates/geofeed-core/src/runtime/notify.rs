// crates/geofeed-core/src/runtime/notify.rs
// ============================================================================
// Module: Geofeed Notification Hub
// Description: Broadcast fan-out for committed insert notifications.
// Purpose: Give every store the same post-commit publish path.
// Dependencies: crate::interfaces, tokio
// ============================================================================

//! ## Overview
//! The hub wraps a `tokio::sync::broadcast` sender. Publishing never blocks;
//! receivers that fall behind by more than the capacity observe a lag error
//! on their next receive.

// ============================================================================
// SECTION: Imports
// ============================================================================

use tokio::sync::broadcast;

use crate::core::DeviceId;
use crate::interfaces::ChangeFeed;
use crate::interfaces::StoreNotification;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default number of buffered notifications per receiver.
pub const DEFAULT_NOTIFY_CAPACITY: usize = 4_096;

// ============================================================================
// SECTION: Hub
// ============================================================================

/// Broadcast hub for store notifications.
///
/// # Invariants
/// - Notifications are delivered to each receiver in publish order.
#[derive(Debug, Clone)]
pub struct NotificationHub {
    /// Broadcast sender shared with all subscribers.
    sender: broadcast::Sender<StoreNotification>,
}

impl NotificationHub {
    /// Creates a hub buffering up to `capacity` notifications per receiver.
    ///
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
        }
    }

    /// Publishes one notification. Having no receivers is not an error.
    pub fn publish(&self, notification: StoreNotification) {
        let _ = self.sender.send(notification);
    }

    /// Publishes one insert notification per device id, in order.
    pub fn publish_inserted<'a>(&self, device_ids: impl IntoIterator<Item = &'a DeviceId>) {
        for device_id in device_ids {
            self.publish(StoreNotification::inserted(device_id));
        }
    }

    /// Returns the number of live receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFY_CAPACITY)
    }
}

impl ChangeFeed for NotificationHub {
    fn subscribe(&self) -> broadcast::Receiver<StoreNotification> {
        self.sender.subscribe()
    }
}
