// crates/geofeed-relay/src/transport.rs
// ============================================================================
// Module: Session Transport
// Description: Frame abstraction and the single-writer discipline.
// Purpose: Serialize every outbound frame of a session through one lock.
// Dependencies: async-trait, thiserror, tokio
// ============================================================================

//! ## Overview
//! Sessions talk to peers through [`FrameReader`] and [`FrameWriter`], which
//! the server implements over an axum WebSocket and tests implement over
//! channels. All outbound frames go through [`SessionWriter::send`], which
//! holds a `tokio::sync::Mutex` for exactly one frame write bounded by the
//! write timeout, so concurrent senders never interleave on the wire.
//!
//! [`SessionWriter::close`] takes the underlying writer out of the lock. The
//! first call sends a best-effort close frame and shuts the writer down; every
//! later call, and every later send, sees the writer gone.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

// ============================================================================
// SECTION: Frames
// ============================================================================

/// Transport-neutral WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Ping control frame.
    Ping(Vec<u8>),
    /// Pong control frame.
    Pong(Vec<u8>),
    /// Close control frame.
    Close,
}

/// Transport failure reported by a reader or writer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Outbound half of a connection.
#[async_trait]
pub trait FrameWriter: Send {
    /// Writes and flushes one frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the frame cannot be written.
    async fn write(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Shuts the outbound half down.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the shutdown fails.
    async fn shutdown(&mut self) -> Result<(), TransportError>;
}

/// Inbound half of a connection.
#[async_trait]
pub trait FrameReader: Send {
    /// Reads the next frame; `None` means the stream ended.
    async fn read(&mut self) -> Option<Result<Frame, TransportError>>;
}

// ============================================================================
// SECTION: Writer
// ============================================================================

/// Outbound write errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The writer was already closed.
    #[error("session writer closed")]
    Closed,
    /// The write did not complete within the write timeout.
    #[error("write timed out after {0} ms")]
    WriteTimeout(u128),
    /// The transport rejected the write.
    #[error("write failed: {0}")]
    Transport(String),
}

/// Mutex-guarded writer shared by all subtasks of a session.
///
/// # Invariants
/// - At most one frame write is in flight at a time.
/// - The underlying writer is released exactly once.
pub struct SessionWriter {
    /// Underlying writer; `None` once closed.
    writer: Mutex<Option<Box<dyn FrameWriter>>>,
    /// Upper bound on a single frame write.
    write_timeout: Duration,
}

impl SessionWriter {
    /// Wraps a writer.
    #[must_use]
    pub fn new(writer: Box<dyn FrameWriter>, write_timeout: Duration) -> Self {
        Self {
            writer: Mutex::new(Some(writer)),
            write_timeout,
        }
    }

    /// Writes one frame under the lock.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the writer is closed, the write times
    /// out, or the transport fails.
    pub async fn send(&self, frame: Frame) -> Result<(), SessionError> {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(SessionError::Closed);
        };
        match tokio::time::timeout(self.write_timeout, writer.write(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(SessionError::Transport(err.to_string())),
            Err(_) => Err(SessionError::WriteTimeout(self.write_timeout.as_millis())),
        }
    }

    /// Sends a best-effort close frame and releases the writer.
    ///
    /// Returns false when the writer was already closed.
    pub async fn close(&self) -> bool {
        let Some(mut writer) = self.writer.lock().await.take() else {
            return false;
        };
        let _ = tokio::time::timeout(self.write_timeout, writer.write(Frame::Close)).await;
        let _ = tokio::time::timeout(self.write_timeout, writer.shutdown()).await;
        true
    }

    /// Returns true once [`SessionWriter::close`] has run.
    pub async fn is_closed(&self) -> bool {
        self.writer.lock().await.is_none()
    }
}
