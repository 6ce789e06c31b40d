// crates/geofeed-config/src/config.rs
// ============================================================================
// Module: Geofeed Configuration
// Description: Configuration loading and validation for Geofeed.
// Purpose: Provide strict, fail-fast config parsing with hard limits.
// Dependencies: geofeed-core, geofeed-simulator, geofeed-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Relay-critical values (bind address, keep-alive timings, coalescing
//! thresholds, snapshot policy) have no embedded defaults: a missing key is a
//! parse error and an out-of-range value is rejected by [`GeofeedConfig::validate`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use geofeed_core::Coordinates;
use geofeed_core::DEFAULT_NOTIFY_CAPACITY;
use geofeed_core::MAX_LATITUDE;
use geofeed_core::MAX_LONGITUDE;
use geofeed_core::MAX_PAGE_SIZE;
use geofeed_simulator::Backoff;
use geofeed_simulator::ExhaustionPolicy;
use geofeed_simulator::InsertMode;
use geofeed_simulator::RetryPolicy;
use geofeed_simulator::SimulatorSettings;
use geofeed_store_sqlite::SqliteStoreConfig;
use geofeed_store_sqlite::SqliteStoreMode;
use geofeed_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "geofeed.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "GEOFEED_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default `SQLite` busy timeout when unset.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Geofeed configuration loaded from TOML.
///
/// # Invariants
/// - Values returned by [`GeofeedConfig::load`] have passed [`GeofeedConfig::validate`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeofeedConfig {
    /// HTTP/WebSocket server configuration.
    pub server: ServerConfig,
    /// Subscriber session configuration.
    pub session: SessionConfig,
    /// Change coalescing configuration.
    pub coalescer: CoalescerSection,
    /// Store backend configuration.
    pub store: StoreConfig,
    /// Optional simulated producer.
    #[serde(default)]
    pub simulator: Option<SimulatorConfig>,
    /// Structured log sink configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GeofeedConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// Resolution order: explicit `path`, then `GEOFEED_CONFIG`, then
    /// `geofeed.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.session.validate()?;
        self.coalescer.validate()?;
        self.store.validate()?;
        if let Some(simulator) = &self.simulator {
            simulator.validate()?;
        }
        self.logging.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Server listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to bind, e.g. `127.0.0.1:8080`.
    pub bind: String,
}

impl ServerConfig {
    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind.trim().parse().map_err(|_| {
            ConfigError::Invalid(format!("server.bind is not a socket address: {}", self.bind))
        })
    }

    /// Validates server configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr().map(|_| ())
    }
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// Subscriber session keep-alive and snapshot configuration.
///
/// # Invariants
/// - `0 < ping_interval_ms < pong_wait_ms`.
/// - `write_timeout_ms > 0`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Interval between keep-alive pings.
    pub ping_interval_ms: u64,
    /// Maximum silence tolerated from the peer.
    pub pong_wait_ms: u64,
    /// Deadline for a single frame write.
    pub write_timeout_ms: u64,
    /// Initial snapshot policy.
    pub snapshot: SnapshotConfig,
}

impl SessionConfig {
    /// Returns the ping interval.
    #[must_use]
    pub const fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Returns the liveness deadline.
    #[must_use]
    pub const fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    /// Returns the per-frame write deadline.
    #[must_use]
    pub const fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Validates session configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.ping_interval_ms == 0 {
            return Err(invalid("session.ping_interval_ms must be greater than zero"));
        }
        if self.pong_wait_ms <= self.ping_interval_ms {
            return Err(invalid("session.pong_wait_ms must be greater than ping_interval_ms"));
        }
        if self.write_timeout_ms == 0 {
            return Err(invalid("session.write_timeout_ms must be greater than zero"));
        }
        self.snapshot.validate()
    }
}

/// Initial snapshot configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case", deny_unknown_fields)]
pub enum SnapshotConfig {
    /// Send every latest sample, paging until exhausted.
    Complete {
        /// Page size used while reading the snapshot.
        page_size: u32,
    },
    /// Send at most `max_records` latest samples.
    Bounded {
        /// Maximum number of samples in the snapshot.
        max_records: u64,
        /// Page size used while reading the snapshot.
        page_size: u32,
    },
}

impl SnapshotConfig {
    /// Validates snapshot configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let page_size = match self {
            Self::Complete {
                page_size,
            } => *page_size,
            Self::Bounded {
                max_records,
                page_size,
            } => {
                if *max_records == 0 {
                    return Err(invalid("session.snapshot.max_records must be at least 1"));
                }
                *page_size
            }
        };
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "session.snapshot.page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Coalescer
// ============================================================================

/// Change coalescing configuration.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoalescerSection {
    /// Pending-set size that forces a flush.
    pub max_batch: usize,
    /// Maximum age of a non-empty pending set.
    pub max_wait_ms: u64,
    /// Capacity of the per-session batch channel.
    pub channel_capacity: usize,
}

impl CoalescerSection {
    /// Returns the maximum wait.
    #[must_use]
    pub const fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    /// Validates coalescer configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch == 0 {
            return Err(invalid("coalescer.max_batch must be at least 1"));
        }
        if self.max_wait_ms == 0 {
            return Err(invalid("coalescer.max_wait_ms must be at least 1"));
        }
        if self.channel_capacity == 0 {
            return Err(invalid("coalescer.channel_capacity must be at least 1"));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Store backend configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum StoreConfig {
    /// Process-local store; contents are lost on exit.
    Memory {
        /// Buffered notifications per change-feed receiver.
        #[serde(default)]
        notify_capacity: Option<usize>,
    },
    /// Durable `SQLite` store.
    Sqlite {
        /// Database file path.
        #[serde(default)]
        path: Option<String>,
        /// Busy timeout in milliseconds.
        #[serde(default)]
        busy_timeout_ms: Option<u64>,
        /// Journal mode.
        #[serde(default)]
        journal_mode: Option<SqliteStoreMode>,
        /// Sync mode.
        #[serde(default)]
        sync_mode: Option<SqliteSyncMode>,
        /// Buffered notifications per change-feed receiver.
        #[serde(default)]
        notify_capacity: Option<usize>,
    },
}

impl StoreConfig {
    /// Returns the `SQLite` store config, or `None` for the memory backend.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the `SQLite` path is missing.
    pub fn sqlite_config(&self) -> Result<Option<SqliteStoreConfig>, ConfigError> {
        match self {
            Self::Memory {
                ..
            } => Ok(None),
            Self::Sqlite {
                path,
                busy_timeout_ms,
                journal_mode,
                sync_mode,
                notify_capacity,
            } => {
                let path =
                    path.as_deref().ok_or_else(|| invalid("store.path is required for sqlite"))?;
                Ok(Some(SqliteStoreConfig {
                    path: PathBuf::from(path),
                    busy_timeout_ms: busy_timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS),
                    journal_mode: journal_mode.unwrap_or_default(),
                    sync_mode: sync_mode.unwrap_or_default(),
                    notify_capacity: notify_capacity.unwrap_or(DEFAULT_NOTIFY_CAPACITY),
                }))
            }
        }
    }

    /// Returns the configured notification capacity.
    #[must_use]
    pub fn notify_capacity(&self) -> usize {
        match self {
            Self::Memory {
                notify_capacity,
            }
            | Self::Sqlite {
                notify_capacity,
                ..
            } => notify_capacity.unwrap_or(DEFAULT_NOTIFY_CAPACITY),
        }
    }

    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.notify_capacity() == 0 {
            return Err(invalid("store.notify_capacity must be at least 1"));
        }
        if let Self::Sqlite {
            path,
            ..
        } = self
        {
            let Some(path) = path else {
                return Err(invalid("store.path is required for sqlite"));
            };
            validate_path_string("store.path", path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Simulator
// ============================================================================

/// Simulated producer configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulatorConfig {
    /// Whether the producer runs alongside the relay.
    pub enabled: bool,
    /// Number of simulated devices.
    pub devices: u32,
    /// Home-region center latitude.
    pub center_latitude: f64,
    /// Home-region center longitude.
    pub center_longitude: f64,
    /// Home-region radius in degrees.
    pub radius: f64,
    /// Steps per second.
    pub frequency_hz: f64,
    /// Speed in degrees per second.
    pub movement_per_sec: f64,
    /// Steps after a bounce during which no further bounce happens.
    pub bounce_cooldown_steps: u32,
    /// Per-step write shape.
    pub insert_mode: InsertMode,
    /// Optional RNG seed for reproducible runs.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Write retry policy.
    pub retry: RetryConfig,
}

impl SimulatorConfig {
    /// Builds validated producer settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any simulator value is out of range.
    pub fn to_settings(&self) -> Result<SimulatorSettings, ConfigError> {
        let center = Coordinates::new(self.center_latitude, self.center_longitude)
            .map_err(|err| ConfigError::Invalid(format!("simulator center: {err}")))?;
        let retry = RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.delay_ms),
            self.retry.backoff,
            self.retry.max_delay_ms.map(Duration::from_millis),
        )
        .map_err(|err| ConfigError::Invalid(format!("simulator.retry: {err}")))?;
        let settings = SimulatorSettings {
            devices: self.devices,
            center,
            radius: self.radius,
            frequency_hz: self.frequency_hz,
            movement_per_sec: self.movement_per_sec,
            bounce_cooldown_steps: self.bounce_cooldown_steps,
            insert_mode: self.insert_mode,
            retry,
            on_exhausted: self.retry.on_exhausted,
            seed: self.seed,
        };
        settings.validate().map_err(|err| ConfigError::Invalid(format!("simulator: {err}")))?;
        Ok(settings)
    }

    /// Validates simulator configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.radius.is_finite()
            && (self.center_latitude.abs() + self.radius > MAX_LATITUDE
                || self.center_longitude.abs() + self.radius > MAX_LONGITUDE)
        {
            return Err(invalid("simulator home region must stay within coordinate bounds"));
        }
        self.to_settings().map(|_| ())
    }
}

/// Write retry configuration.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts per step, including the first.
    pub max_attempts: u32,
    /// Base delay between attempts.
    pub delay_ms: u64,
    /// Backoff shape.
    pub backoff: Backoff,
    /// Cap for exponential backoff.
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
    /// Behavior after the final failed attempt.
    pub on_exhausted: ExhaustionPolicy,
}

// ============================================================================
// SECTION: Logging
// ============================================================================

/// Log sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard all events.
    None,
}

/// Structured log configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Sink selection.
    #[serde(default)]
    pub sink: LogSinkKind,
    /// File path for the file sink.
    #[serde(default)]
    pub path: Option<String>,
}

impl LoggingConfig {
    /// Validates logging configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.sink == LogSinkKind::File {
            let Some(path) = &self.path else {
                return Err(invalid("logging.path is required for the file sink"));
            };
            validate_path_string("logging.path", path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds an [`ConfigError::Invalid`] from a static message.
fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid(message.to_string())
}

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(invalid("config path exceeds max length"));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    if path.to_string_lossy().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(invalid("config path exceeds max length"));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(invalid("config path component too long"));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}
