// crates/geofeed-cli/src/runtime.rs
// ============================================================================
// Module: Runtime Assembly
// Description: Builds the relay and producer from a validated configuration.
// Purpose: Wire store, log sink, session settings, and simulator for `serve`.
// Dependencies: geofeed-config, geofeed-core, geofeed-relay, geofeed-simulator,
// geofeed-store-sqlite, thiserror, tokio, tokio-util
// ============================================================================

//! ## Overview
//! [`Runtime::build`] turns a [`GeofeedConfig`] into a [`RelayContext`] and an
//! optional [`Simulator`]. [`Runtime::run`] serves subscribers until the root
//! token is cancelled; the producer runs under a child token and a producer
//! abort cancels the root so the process exits with an error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;

use geofeed_config::GeofeedConfig;
use geofeed_config::LogSinkKind;
use geofeed_config::LoggingConfig;
use geofeed_config::SnapshotConfig;
use geofeed_config::StoreConfig;
use geofeed_core::FileLogSink;
use geofeed_core::InMemoryGeolocationStore;
use geofeed_core::LogEvent;
use geofeed_core::LogLevel;
use geofeed_core::NoopLogSink;
use geofeed_core::SharedChangeFeed;
use geofeed_core::SharedGeolocationStore;
use geofeed_core::SharedLogSink;
use geofeed_core::StderrLogSink;
use geofeed_relay::CoalescerConfig;
use geofeed_relay::KeepAlive;
use geofeed_relay::RelayContext;
use geofeed_relay::SessionSettings;
use geofeed_relay::SnapshotPolicy;
use geofeed_relay::serve;
use geofeed_simulator::Simulator;
use geofeed_simulator::SimulatorReport;
use geofeed_simulator::SimulatorSettings;
use geofeed_store_sqlite::SqliteGeolocationStore;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while assembling or running the process.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The store backend could not be opened.
    #[error("store init failed: {0}")]
    Store(String),
    /// The log sink could not be opened.
    #[error("log sink init failed: {0}")]
    Log(String),
    /// Session or producer settings were rejected.
    #[error("invalid settings: {0}")]
    Settings(String),
    /// The producer aborted.
    #[error("simulator failed: {0}")]
    Simulator(String),
    /// The relay server failed.
    #[error("server failed: {0}")]
    Server(String),
}

// ============================================================================
// SECTION: Assembly
// ============================================================================

/// Store handles shared by the relay and the producer.
#[derive(Clone)]
pub struct Backend {
    /// Query and write surface.
    pub store: SharedGeolocationStore,
    /// Committed-insert notifications.
    pub feed: SharedChangeFeed,
}

/// Opens the configured store backend.
///
/// Opening `SQLite` touches the filesystem; call from a blocking context.
///
/// # Errors
///
/// Returns [`RuntimeError::Store`] when the backend cannot be opened.
pub fn open_store(config: &StoreConfig) -> Result<Backend, RuntimeError> {
    let sqlite = config.sqlite_config().map_err(|err| RuntimeError::Store(err.to_string()))?;
    match sqlite {
        None => {
            let store = Arc::new(InMemoryGeolocationStore::new(config.notify_capacity()));
            Ok(Backend {
                store: store.clone(),
                feed: store,
            })
        }
        Some(sqlite) => {
            let store = Arc::new(
                SqliteGeolocationStore::new(&sqlite)
                    .map_err(|err| RuntimeError::Store(err.to_string()))?,
            );
            Ok(Backend {
                store: store.clone(),
                feed: store,
            })
        }
    }
}

/// Opens the configured log sink.
///
/// # Errors
///
/// Returns [`RuntimeError::Log`] when the file sink cannot be opened.
pub fn open_log_sink(config: &LoggingConfig) -> Result<SharedLogSink, RuntimeError> {
    match config.sink {
        LogSinkKind::Stderr => Ok(Arc::new(StderrLogSink)),
        LogSinkKind::None => Ok(Arc::new(NoopLogSink)),
        LogSinkKind::File => {
            let path = config
                .path
                .as_deref()
                .ok_or_else(|| RuntimeError::Log("logging.path is required".to_string()))?;
            let sink = FileLogSink::new(Path::new(path))
                .map_err(|err| RuntimeError::Log(err.to_string()))?;
            Ok(Arc::new(sink))
        }
    }
}

/// Maps the session and coalescer sections onto relay settings.
///
/// # Errors
///
/// Returns [`RuntimeError::Settings`] when the relay rejects a value.
pub fn session_settings(config: &GeofeedConfig) -> Result<SessionSettings, RuntimeError> {
    let session = &config.session;
    let keep_alive =
        KeepAlive::new(session.ping_interval(), session.pong_wait(), session.write_timeout())
            .map_err(|err| RuntimeError::Settings(err.to_string()))?;
    let snapshot = match session.snapshot {
        SnapshotConfig::Complete {
            page_size,
        } => SnapshotPolicy::Complete {
            page_size,
        },
        SnapshotConfig::Bounded {
            max_records,
            page_size,
        } => SnapshotPolicy::Bounded {
            max_records,
            page_size,
        },
    };
    let coalescer = CoalescerConfig::new(config.coalescer.max_batch, config.coalescer.max_wait())
        .map_err(|err| RuntimeError::Settings(err.to_string()))?;
    let settings = SessionSettings {
        keep_alive,
        snapshot,
        coalescer,
        channel_capacity: config.coalescer.channel_capacity,
    };
    settings.validate().map_err(|err| RuntimeError::Settings(err.to_string()))?;
    Ok(settings)
}

/// Returns producer settings when the simulator section is present and enabled.
///
/// # Errors
///
/// Returns [`RuntimeError::Settings`] when the section is invalid.
pub fn simulator_settings(
    config: &GeofeedConfig,
) -> Result<Option<SimulatorSettings>, RuntimeError> {
    config
        .simulator
        .as_ref()
        .filter(|simulator| simulator.enabled)
        .map(|simulator| {
            simulator.to_settings().map_err(|err| RuntimeError::Settings(err.to_string()))
        })
        .transpose()
}

// ============================================================================
// SECTION: Runtime
// ============================================================================

/// Outcome of a completed run.
#[derive(Debug, Default)]
pub struct RuntimeReport {
    /// Producer summary when the simulator was enabled.
    pub simulator: Option<SimulatorReport>,
}

/// Assembled relay and optional producer.
pub struct Runtime {
    /// Dependencies shared by every subscriber session.
    context: RelayContext,
    /// Producer, when enabled.
    simulator: Option<Simulator>,
    /// Process log sink.
    log: SharedLogSink,
}

impl Runtime {
    /// Builds every component named by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] when any component fails to initialize.
    pub async fn build(config: &GeofeedConfig) -> Result<Self, RuntimeError> {
        let log = open_log_sink(&config.logging)?;
        let store_config = config.store.clone();
        let backend = tokio::task::spawn_blocking(move || open_store(&store_config))
            .await
            .map_err(|err| RuntimeError::Store(format!("init join failed: {err}")))??;
        Self::with_backend(config, backend, log)
    }

    /// Builds the runtime over an already opened backend and log sink.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Settings`] when session or producer settings are invalid.
    pub fn with_backend(
        config: &GeofeedConfig,
        backend: Backend,
        log: SharedLogSink,
    ) -> Result<Self, RuntimeError> {
        let settings = session_settings(config)?;
        let simulator = simulator_settings(config)?
            .map(|settings| Simulator::new(backend.store.clone(), settings, log.clone()))
            .transpose()
            .map_err(|err| RuntimeError::Settings(err.to_string()))?;
        let context = RelayContext::new(backend.store, backend.feed, settings, log.clone())
            .map_err(|err| RuntimeError::Settings(err.to_string()))?;
        Ok(Self {
            context,
            simulator,
            log,
        })
    }

    /// Returns the relay context.
    #[must_use]
    pub const fn context(&self) -> &RelayContext {
        &self.context
    }

    /// Returns whether the producer will run.
    #[must_use]
    pub const fn has_simulator(&self) -> bool {
        self.simulator.is_some()
    }

    /// Serves subscribers on `listener` until `shutdown` is cancelled.
    ///
    /// The producer is stopped and joined before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Server`] when the listener fails and
    /// [`RuntimeError::Simulator`] when the producer aborted.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<RuntimeReport, RuntimeError> {
        let Self {
            context,
            simulator,
            log,
        } = self;
        let producer_token = shutdown.child_token();
        let producer = simulator.map(|simulator| {
            let token = producer_token.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let result = simulator.run(token).await;
                if let Err(err) = &result {
                    log.record(&LogEvent::new(
                        "simulator_failed",
                        LogLevel::Error,
                        err.to_string(),
                    ));
                    shutdown.cancel();
                }
                result
            })
        });

        let served = serve(listener, context, shutdown).await;
        producer_token.cancel();
        let simulator = match producer {
            Some(handle) => Some(
                handle
                    .await
                    .map_err(|err| RuntimeError::Simulator(format!("join failed: {err}")))?
                    .map_err(|err| RuntimeError::Simulator(err.to_string())),
            ),
            None => None,
        };
        served.map_err(|err| RuntimeError::Server(err.to_string()))?;
        Ok(RuntimeReport {
            simulator: simulator.transpose()?,
        })
    }
}
