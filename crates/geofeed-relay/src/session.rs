// crates/geofeed-relay/src/session.rs
// ============================================================================
// Module: Subscriber Session
// Description: Per-connection lifecycle, keep-alive, and delivery.
// Purpose: Stream a snapshot and then live batches to one subscriber.
// Dependencies: geofeed-core, thiserror, tokio, tokio-util, uuid
// ============================================================================

//! ## Overview
//! A session moves through `Connecting -> Active -> Closing -> Closed`.
//! While connecting it attaches a change listener and sends one snapshot
//! frame. While active, five subtasks run in a [`JoinSet`] under a child
//! cancellation token:
//! - read: drains inbound frames, refreshes liveness, answers text `"ping"`;
//! - keep-alive: pings every interval, ends the session after `pong_wait`
//!   of inbound silence;
//! - listener and coalescer timer: feed the session's delivery queue;
//! - delivery: fetches each batch (without the write lock) and writes one
//!   data frame per non-empty batch.
//!
//! The first terminal condition is recorded and cancels the token; the join
//! set is drained, a best-effort close frame is sent, and the writer is
//! released exactly once.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use geofeed_core::LogEvent;
use geofeed_core::LogLevel;
use geofeed_core::SharedChangeFeed;
use geofeed_core::SharedGeolocationStore;
use geofeed_core::SharedLogSink;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::coalescer::CoalescerConfig;
use crate::coalescer::PendingBatch;
use crate::fetcher::Fetcher;
use crate::listener::ChangeListener;
use crate::message::GeolocationsMessage;
use crate::message::PING_TEXT;
use crate::message::PONG_TEXT;
use crate::pipeline::DeliveryPipeline;
use crate::snapshot::SnapshotPolicy;
use crate::transport::Frame;
use crate::transport::FrameReader;
use crate::transport::FrameWriter;
use crate::transport::SessionWriter;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Session configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionConfigError {
    /// A keep-alive or queue parameter was out of range.
    #[error("invalid session config: {0}")]
    Invalid(String),
}

/// Keep-alive timing.
///
/// # Invariants
/// - All durations are non-zero and `pong_wait > ping_interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    /// Interval between pings.
    ping_interval: Duration,
    /// Inbound silence tolerated before the session is closed.
    pong_wait: Duration,
    /// Upper bound on a single frame write.
    write_timeout: Duration,
}

impl KeepAlive {
    /// Validates and builds keep-alive timing.
    ///
    /// # Errors
    ///
    /// Returns [`SessionConfigError`] for zero durations or when `pong_wait`
    /// does not exceed `ping_interval`.
    pub fn new(
        ping_interval: Duration,
        pong_wait: Duration,
        write_timeout: Duration,
    ) -> Result<Self, SessionConfigError> {
        if ping_interval.is_zero() || pong_wait.is_zero() || write_timeout.is_zero() {
            return Err(SessionConfigError::Invalid(
                "keep-alive durations must be greater than zero".to_string(),
            ));
        }
        if pong_wait <= ping_interval {
            return Err(SessionConfigError::Invalid(
                "pong_wait must be greater than ping_interval".to_string(),
            ));
        }
        Ok(Self {
            ping_interval,
            pong_wait,
            write_timeout,
        })
    }

    /// Returns the ping interval.
    #[must_use]
    pub const fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    /// Returns the tolerated inbound silence.
    #[must_use]
    pub const fn pong_wait(&self) -> Duration {
        self.pong_wait
    }

    /// Returns the frame write timeout.
    #[must_use]
    pub const fn write_timeout(&self) -> Duration {
        self.write_timeout
    }
}

/// Everything a session needs besides its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Keep-alive timing.
    pub keep_alive: KeepAlive,
    /// Snapshot bound.
    pub snapshot: SnapshotPolicy,
    /// Coalescer thresholds.
    pub coalescer: CoalescerConfig,
    /// Capacity of the per-session batch queue.
    pub channel_capacity: usize,
}

impl SessionSettings {
    /// Checks the parts not already validated by their constructors.
    ///
    /// # Errors
    ///
    /// Returns [`SessionConfigError`] when the snapshot policy or queue
    /// capacity is invalid.
    pub fn validate(&self) -> Result<(), SessionConfigError> {
        self.snapshot.validate().map_err(|err| SessionConfigError::Invalid(err.to_string()))?;
        if self.channel_capacity == 0 {
            return Err(SessionConfigError::Invalid(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Lifecycle Types
// ============================================================================

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake done, snapshot pending.
    Connecting,
    /// Streaming live batches.
    Active,
    /// Subtasks stopped, closing the connection.
    Closing,
    /// Connection released.
    Closed,
}

impl SessionState {
    /// Returns the stable label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloseReason {
    /// No inbound frame within `pong_wait`.
    #[error("liveness timeout")]
    LivenessTimeout,
    /// Reading from the peer failed.
    #[error("read failed: {0}")]
    ReadFailed(String),
    /// Writing to the peer failed or timed out.
    #[error("write failed: {0}")]
    WriteFailed(String),
    /// The peer closed the connection.
    #[error("peer closed")]
    PeerClosed,
    /// The server is shutting down.
    #[error("cancelled")]
    Cancelled,
    /// The listener, coalescer, or fetcher failed.
    #[error("pipeline failed: {0}")]
    PipelineFailed(String),
    /// The initial snapshot could not be loaded.
    #[error("snapshot failed: {0}")]
    SnapshotFailed(String),
}

impl CloseReason {
    /// Returns the stable label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::LivenessTimeout => "liveness_timeout",
            Self::ReadFailed(_) => "read_failed",
            Self::WriteFailed(_) => "write_failed",
            Self::PeerClosed => "peer_closed",
            Self::Cancelled => "cancelled",
            Self::PipelineFailed(_) => "pipeline_failed",
            Self::SnapshotFailed(_) => "snapshot_failed",
        }
    }

    /// Returns true for endings that are part of normal operation.
    #[must_use]
    pub const fn is_expected(&self) -> bool {
        matches!(self, Self::PeerClosed | Self::Cancelled)
    }
}

/// Summary returned when a session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Session identifier.
    pub session_id: String,
    /// First terminal condition observed.
    pub reason: CloseReason,
    /// Samples in the snapshot frame.
    pub snapshot_records: usize,
    /// Live data frames written.
    pub batches_delivered: u64,
    /// Samples across live data frames.
    pub samples_delivered: u64,
}

// ============================================================================
// SECTION: Shared State
// ============================================================================

/// State shared by the subtasks of one session.
struct SessionShared {
    /// Session identifier for logs.
    id: String,
    /// Single writer.
    writer: SessionWriter,
    /// Structured log sink.
    log: SharedLogSink,
    /// Child token cancelled on the first terminal condition.
    token: CancellationToken,
    /// Time of the most recent inbound frame.
    last_inbound: Mutex<Instant>,
    /// First terminal condition.
    reason: Mutex<Option<CloseReason>>,
    /// Live data frames written.
    batches: AtomicU64,
    /// Samples across live data frames.
    samples: AtomicU64,
}

impl SessionShared {
    /// Marks inbound activity.
    fn touch(&self) {
        *self.last_inbound.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Returns the inbound silence at `now`.
    fn silence(&self, now: Instant) -> Duration {
        let last = *self.last_inbound.lock().unwrap_or_else(PoisonError::into_inner);
        now.saturating_duration_since(last)
    }

    /// Records `reason` if it is the first terminal condition and stops the subtasks.
    fn terminate(&self, reason: CloseReason) {
        {
            let mut slot = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(reason);
            }
        }
        self.token.cancel();
    }

    /// Returns the recorded terminal condition.
    fn reason(&self) -> Option<CloseReason> {
        self.reason.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Records a log event tagged with the session id.
    fn log(&self, event: LogEvent) {
        self.log.record(&event.with_session(self.id.as_str()));
    }
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// One subscriber session.
pub struct Session {
    /// Session identifier.
    id: String,
    /// Store used for the snapshot and for fetches.
    store: SharedGeolocationStore,
    /// Change feed the listener attaches to.
    feed: SharedChangeFeed,
    /// Session settings.
    settings: SessionSettings,
    /// Structured log sink.
    log: SharedLogSink,
    /// Current lifecycle state.
    state: SessionState,
}

impl Session {
    /// Creates a session in the `Connecting` state.
    #[must_use]
    pub fn new(
        store: SharedGeolocationStore,
        feed: SharedChangeFeed,
        settings: SessionSettings,
        log: SharedLogSink,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            store,
            feed,
            settings,
            log,
            state: SessionState::Connecting,
        }
    }

    /// Returns the session identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Runs the session to completion.
    ///
    /// Cancelling `cancel` ends the session with [`CloseReason::Cancelled`]
    /// unless another terminal condition was recorded first.
    pub async fn run<R, W>(
        mut self,
        reader: R,
        writer: W,
        cancel: CancellationToken,
    ) -> SessionReport
    where
        R: FrameReader + 'static,
        W: FrameWriter + 'static,
    {
        let token = cancel.child_token();
        let shared = Arc::new(SessionShared {
            id: self.id.clone(),
            writer: SessionWriter::new(Box::new(writer), self.settings.keep_alive.write_timeout()),
            log: Arc::clone(&self.log),
            token: token.clone(),
            last_inbound: Mutex::new(Instant::now()),
            reason: Mutex::new(None),
            batches: AtomicU64::new(0),
            samples: AtomicU64::new(0),
        });
        shared.log(LogEvent::new("session_opened", LogLevel::Info, "subscriber connected"));

        let listener = ChangeListener::new(self.feed.as_ref());
        let snapshot_records = tokio::select! {
            biased;
            () = token.cancelled() => 0,
            sent = self.send_snapshot(&shared) => match sent {
                Ok(records) => records,
                Err(reason) => {
                    shared.terminate(reason);
                    0
                }
            },
        };

        let mut tasks = JoinSet::new();
        if !token.is_cancelled() {
            self.transition(&shared, SessionState::Active);
            shared.touch();
            self.spawn_subtasks(&mut tasks, &shared, reader, listener);
        }
        token.cancelled().await;
        while tasks.join_next().await.is_some() {}

        self.transition(&shared, SessionState::Closing);
        let reason = shared.reason().unwrap_or(CloseReason::Cancelled);
        shared.writer.close().await;
        self.transition(&shared, SessionState::Closed);

        let report = SessionReport {
            session_id: self.id.clone(),
            reason,
            snapshot_records,
            batches_delivered: shared.batches.load(Ordering::SeqCst),
            samples_delivered: shared.samples.load(Ordering::SeqCst),
        };
        let level = if report.reason.is_expected() { LogLevel::Info } else { LogLevel::Warn };
        shared.log(
            LogEvent::new("session_closed", level, report.reason.to_string())
                .with_field("reason", report.reason.label())
                .with_field("batches_delivered", report.batches_delivered)
                .with_field("samples_delivered", report.samples_delivered),
        );
        report
    }

    /// Moves to `next` and logs the transition.
    fn transition(&mut self, shared: &SessionShared, next: SessionState) {
        let previous = std::mem::replace(&mut self.state, next);
        shared.log(
            LogEvent::new("session_state", LogLevel::Debug, "session state changed")
                .with_field("from", previous.as_str())
                .with_field("state", next.as_str()),
        );
    }

    /// Loads and writes the snapshot frame; returns the record count.
    async fn send_snapshot(&self, shared: &SessionShared) -> Result<usize, CloseReason> {
        let snapshot = self
            .settings
            .snapshot
            .load(&self.store)
            .await
            .map_err(|err| CloseReason::SnapshotFailed(err.to_string()))?;
        let records = snapshot.samples.len();
        let truncated = snapshot.truncated;
        let payload = GeolocationsMessage::new(snapshot.samples)
            .to_json()
            .map_err(|err| CloseReason::SnapshotFailed(err.to_string()))?;
        shared
            .writer
            .send(Frame::Text(payload))
            .await
            .map_err(|err| CloseReason::WriteFailed(err.to_string()))?;
        shared.log(
            LogEvent::new("snapshot_sent", LogLevel::Info, "snapshot sent")
                .with_field("records", records)
                .with_field("truncated", truncated),
        );
        Ok(records)
    }

    /// Spawns the active-state subtasks.
    fn spawn_subtasks<R>(
        &self,
        tasks: &mut JoinSet<()>,
        shared: &Arc<SessionShared>,
        reader: R,
        listener: ChangeListener,
    ) where
        R: FrameReader + 'static,
    {
        let pipeline =
            DeliveryPipeline::new(self.settings.coalescer, self.settings.channel_capacity);
        let handler = pipeline.handler();
        let DeliveryPipeline {
            coalescer,
            sender,
            batches,
        } = pipeline;
        let fetcher = Fetcher::new(Arc::clone(&self.store), Arc::clone(&self.log))
            .with_session(self.id.as_str());

        tasks.spawn(read_loop(Arc::clone(shared), reader));
        tasks.spawn(keep_alive_loop(Arc::clone(shared), self.settings.keep_alive));
        tasks.spawn(delivery_loop(Arc::clone(shared), batches, fetcher));

        let listen_shared = Arc::clone(shared);
        tasks.spawn(async move {
            let token = listen_shared.token.clone();
            if let Err(err) = listener.subscribe(&token, &handler).await {
                listen_shared.log(LogEvent::new(
                    "listener_failed",
                    LogLevel::Error,
                    err.to_string(),
                ));
                listen_shared.terminate(CloseReason::PipelineFailed(err.to_string()));
            }
        });

        let timer_token = shared.token.clone();
        tasks.spawn(async move {
            coalescer.run_timer(&timer_token, &sender).await;
        });
    }
}

// ============================================================================
// SECTION: Subtasks
// ============================================================================

/// Drains inbound frames until the peer goes away or the session stops.
async fn read_loop<R: FrameReader>(shared: Arc<SessionShared>, mut reader: R) {
    loop {
        let next = tokio::select! {
            biased;
            () = shared.token.cancelled() => return,
            next = reader.read() => next,
        };
        let frame = match next {
            None => {
                shared.terminate(CloseReason::PeerClosed);
                return;
            }
            Some(Err(err)) => {
                shared.terminate(CloseReason::ReadFailed(err.to_string()));
                return;
            }
            Some(Ok(frame)) => frame,
        };
        shared.touch();
        match frame {
            Frame::Close => {
                shared.terminate(CloseReason::PeerClosed);
                return;
            }
            Frame::Text(text) if text == PING_TEXT => {
                if let Err(err) = shared.writer.send(Frame::Text(PONG_TEXT.to_string())).await {
                    shared.terminate(CloseReason::WriteFailed(err.to_string()));
                    return;
                }
            }
            Frame::Text(_) | Frame::Binary(_) | Frame::Ping(_) | Frame::Pong(_) => {}
        }
    }
}

/// Pings on every interval and enforces the inbound silence bound.
async fn keep_alive_loop(shared: Arc<SessionShared>, keep_alive: KeepAlive) {
    let period = keep_alive.ping_interval();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            () = shared.token.cancelled() => return,
            _ = ticker.tick() => {}
        }
        if shared.silence(Instant::now()) > keep_alive.pong_wait() {
            shared.terminate(CloseReason::LivenessTimeout);
            return;
        }
        if let Err(err) = shared.writer.send(Frame::Ping(Vec::new())).await {
            shared.terminate(CloseReason::WriteFailed(err.to_string()));
            return;
        }
    }
}

/// Resolves flushed batches and writes one data frame per non-empty result.
async fn delivery_loop(
    shared: Arc<SessionShared>,
    mut batches: mpsc::Receiver<PendingBatch>,
    fetcher: Fetcher,
) {
    loop {
        let batch = tokio::select! {
            biased;
            () = shared.token.cancelled() => return,
            batch = batches.recv() => batch,
        };
        let Some(batch) = batch else {
            shared.terminate(CloseReason::PipelineFailed("batch queue closed".to_string()));
            return;
        };
        let resolved = tokio::select! {
            biased;
            () = shared.token.cancelled() => return,
            resolved = fetcher.resolve_latest(batch.device_ids()) => resolved,
        };
        let resolved = match resolved {
            Ok(resolved) => resolved,
            Err(err) => {
                shared.terminate(CloseReason::PipelineFailed(err.to_string()));
                return;
            }
        };
        let samples = fetcher.present(batch.device_ids(), resolved);
        if samples.is_empty() {
            continue;
        }
        let count = samples.len();
        let payload = match GeolocationsMessage::new(samples).to_json() {
            Ok(payload) => payload,
            Err(err) => {
                shared.terminate(CloseReason::PipelineFailed(err.to_string()));
                return;
            }
        };
        if let Err(err) = shared.writer.send(Frame::Text(payload)).await {
            shared.terminate(CloseReason::WriteFailed(err.to_string()));
            return;
        }
        shared.batches.fetch_add(1, Ordering::SeqCst);
        shared.samples.fetch_add(u64::try_from(count).unwrap_or(u64::MAX), Ordering::SeqCst);
        shared.log(
            LogEvent::new("batch_delivered", LogLevel::Debug, "batch delivered")
                .with_field("samples", count),
        );
    }
}
