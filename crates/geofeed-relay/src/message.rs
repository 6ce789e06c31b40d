// crates/geofeed-relay/src/message.rs
// ============================================================================
// Module: Relay Wire Messages
// Description: JSON payloads sent to subscribers.
// Purpose: Pin the data frame shape shared by snapshots and live batches.
// Dependencies: geofeed-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Every data frame is a single JSON text frame of the form
//! `{"geolocations":[...]}`. Snapshots and live batches use the same shape.

use geofeed_core::Sample;
use serde::Deserialize;
use serde::Serialize;

/// Client text frame answered with [`PONG_TEXT`].
pub const PING_TEXT: &str = "ping";

/// Reply to a [`PING_TEXT`] frame.
pub const PONG_TEXT: &str = "pong";

/// Data frame carrying one or more samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeolocationsMessage {
    /// Samples in delivery order.
    pub geolocations: Vec<Sample>,
}

impl GeolocationsMessage {
    /// Wraps samples into a data frame.
    #[must_use]
    pub const fn new(geolocations: Vec<Sample>) -> Self {
        Self {
            geolocations,
        }
    }

    /// Serializes the frame as JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] when a sample cannot be encoded.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
