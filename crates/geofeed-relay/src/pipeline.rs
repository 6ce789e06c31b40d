// crates/geofeed-relay/src/pipeline.rs
// ============================================================================
// Module: Delivery Pipeline
// Description: Per-session wiring from change events to flushed batches.
// Purpose: Connect the listener, coalescer, and delivery queue of one session.
// Dependencies: async-trait, tokio
// ============================================================================

//! ## Overview
//! Each session owns a [`DeliveryPipeline`]: its own [`Coalescer`] plus a
//! bounded queue of [`PendingBatch`]es. The [`CoalescingHandler`] records
//! change events and forwards size flushes; the coalescer timer forwards time
//! flushes into the same queue. A slow session backs up only its own queue,
//! and eventually its own listener.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::coalescer::Coalescer;
use crate::coalescer::CoalescerConfig;
use crate::coalescer::PendingBatch;
use crate::listener::ChangeEvent;
use crate::listener::ChangeHandler;
use crate::listener::HandlerError;

// ============================================================================
// SECTION: Handler
// ============================================================================

/// Change handler that feeds a coalescer.
#[derive(Clone)]
pub struct CoalescingHandler {
    /// Session coalescer.
    coalescer: Arc<Coalescer>,
    /// Queue for size-triggered flushes.
    out: mpsc::Sender<PendingBatch>,
}

impl CoalescingHandler {
    /// Builds a handler over a coalescer and its output queue.
    #[must_use]
    pub const fn new(coalescer: Arc<Coalescer>, out: mpsc::Sender<PendingBatch>) -> Self {
        Self {
            coalescer,
            out,
        }
    }
}

#[async_trait]
impl ChangeHandler for CoalescingHandler {
    async fn handle(&self, event: ChangeEvent) -> Result<(), HandlerError> {
        if let Some(batch) = self.coalescer.record(event.device_id) {
            self.out.send(batch).await.map_err(|_| HandlerError::new("batch queue closed"))?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// Coalescer and batch queue for one session.
pub struct DeliveryPipeline {
    /// Session coalescer, shared with the timer task.
    pub coalescer: Arc<Coalescer>,
    /// Producer half of the batch queue.
    pub sender: mpsc::Sender<PendingBatch>,
    /// Consumer half of the batch queue.
    pub batches: mpsc::Receiver<PendingBatch>,
}

impl DeliveryPipeline {
    /// Creates a pipeline; `capacity` is clamped to at least one batch.
    #[must_use]
    pub fn new(config: CoalescerConfig, capacity: usize) -> Self {
        let (sender, batches) = mpsc::channel(capacity.max(1));
        Self {
            coalescer: Arc::new(Coalescer::new(config)),
            sender,
            batches,
        }
    }

    /// Returns a handler feeding this pipeline.
    #[must_use]
    pub fn handler(&self) -> CoalescingHandler {
        CoalescingHandler::new(Arc::clone(&self.coalescer), self.sender.clone())
    }
}
