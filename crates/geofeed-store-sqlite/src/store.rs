// crates/geofeed-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Geolocation Store
// Description: Durable GeolocationStore backed by SQLite WAL.
// Purpose: Persist devices and samples; publish one notification per committed row.
// Dependencies: geofeed-core, rusqlite, serde, thiserror, time, tokio
// ============================================================================

//! ## Overview
//! This module implements a durable [`GeolocationStore`] using `SQLite`.
//! Timestamps are stored as UTC microseconds. Latest-sample resolution walks
//! `idx_geolocations_latest` one device at a time, ranked by event time with
//! insertion order breaking ties, so its cost does not grow with history.
//! Notifications are published only after the writing transaction commits;
//! a rolled-back batch publishes nothing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use geofeed_core::ChangeFeed;
use geofeed_core::DEFAULT_NOTIFY_CAPACITY;
use geofeed_core::Device;
use geofeed_core::DeviceId;
use geofeed_core::GeolocationStore;
use geofeed_core::NewSample;
use geofeed_core::NotificationHub;
use geofeed_core::PageOptions;
use geofeed_core::Sample;
use geofeed_core::StoreError;
use geofeed_core::StoreNotification;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::broadcast;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Latest live sample for one device; served by `idx_geolocations_latest`.
pub const LATEST_FOR_DEVICE_SQL: &str = "SELECT device_id, event_time_us, latitude, longitude, \
                                         created_us, updated_us, deleted_us FROM geolocations \
                                         WHERE device_id = ?1 AND deleted_us IS NULL ORDER BY \
                                         event_time_us DESC, id DESC LIMIT 1";
/// One page of latest samples ordered by device id.
///
/// `CROSS JOIN` pins `devices` as the outer loop so each device costs one
/// index seek into `geolocations`.
pub const LIST_LATEST_SQL: &str = "SELECT g.device_id, g.event_time_us, g.latitude, \
                                   g.longitude, g.created_us, g.updated_us, g.deleted_us FROM \
                                   devices d CROSS JOIN geolocations g WHERE g.id = (SELECT l.id \
                                   FROM geolocations l WHERE l.device_id = d.device_id AND \
                                   l.deleted_us IS NULL ORDER BY l.event_time_us DESC, l.id DESC \
                                   LIMIT 1) ORDER BY d.device_id LIMIT ?1 OFFSET ?2";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode.
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` geolocation store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds; zero fails fast on contention.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Buffered notifications per change-feed receiver.
    #[serde(default = "default_notify_capacity")]
    pub notify_capacity: usize,
}

impl SqliteStoreConfig {
    /// Builds a config for `path` with default tuning.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            notify_capacity: DEFAULT_NOTIFY_CAPACITY,
        }
    }
}

/// Returns the default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default notification capacity.
const fn default_notify_capacity() -> usize {
    DEFAULT_NOTIFY_CAPACITY
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - [`SqliteStoreError::Busy`] is the only transient variant.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Database was busy or locked by another connection.
    #[error("sqlite store busy: {0}")]
    Busy(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data or input.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Referenced record does not exist.
    #[error("sqlite store record not found: {0}")]
    NotFound(String),
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        match error.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                Self::Busy(error.to_string())
            }
            _ => Self::Db(error.to_string()),
        }
    }
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Busy(message) => Self::Unavailable(message),
            SqliteStoreError::VersionMismatch(message) => {
                Self::Store(format!("version mismatch: {message}"))
            }
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed geolocation store with WAL support.
///
/// # Invariants
/// - `SQLite` connection access is serialized through a mutex.
/// - Notifications are published after commit, one per inserted sample.
#[derive(Clone)]
pub struct SqliteGeolocationStore {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
    /// Post-commit notification hub.
    hub: NotificationHub,
}

impl SqliteGeolocationStore {
    /// Opens (or creates) the store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the path is invalid, the database
    /// cannot be opened, or the schema version is unsupported.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            hub: NotificationHub::new(config.notify_capacity),
        })
    }

    /// Returns the notification hub used by this store.
    #[must_use]
    pub const fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    /// Acquires the connection mutex.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("sqlite mutex poisoned".to_string()))
    }

    /// Inserts a device row and returns its identifier.
    fn insert_device_inner(&self, name: &str) -> Result<DeviceId, SqliteStoreError> {
        if name.trim().is_empty() {
            return Err(SqliteStoreError::Invalid("device name must not be empty".to_string()));
        }
        let device_id = DeviceId::generate();
        let created_us = to_micros(OffsetDateTime::now_utc())?;
        let connection = self.lock()?;
        connection.execute(
            "INSERT INTO devices (device_id, name, created_us) VALUES (?1, ?2, ?3)",
            params![device_id.as_str(), name, created_us],
        )?;
        Ok(device_id)
    }

    /// Lists devices in creation order.
    fn list_devices_inner(&self, page: PageOptions) -> Result<Vec<Device>, SqliteStoreError> {
        let (limit, offset) = limit_offset(page)?;
        let connection = self.lock()?;
        let mut stmt = connection.prepare_cached(
            "SELECT device_id, name, created_us, updated_us, deleted_us FROM devices ORDER BY seq \
             LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt
            .query_map(params![limit, offset], |row| {
                Ok(DeviceRow {
                    device_id: row.get(0)?,
                    name: row.get(1)?,
                    created_us: row.get(2)?,
                    updated_us: row.get(3)?,
                    deleted_us: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(DeviceRow::into_device).collect()
    }

    /// Inserts samples in one transaction and returns after commit.
    fn insert_samples_inner(&self, samples: &[NewSample]) -> Result<(), SqliteStoreError> {
        if samples.is_empty() {
            return Ok(());
        }
        let created_us = to_micros(OffsetDateTime::now_utc())?;
        let mut connection = self.lock()?;
        let tx = connection.transaction()?;
        {
            let mut exists = tx.prepare_cached("SELECT 1 FROM devices WHERE device_id = ?1")?;
            let mut insert = tx.prepare_cached(
                "INSERT INTO geolocations (device_id, event_time_us, latitude, longitude, \
                 created_us) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for sample in samples {
                let known: Option<i64> = exists
                    .query_row(params![sample.device_id.as_str()], |row| row.get(0))
                    .optional()?;
                if known.is_none() {
                    return Err(SqliteStoreError::NotFound(format!(
                        "device {} does not exist",
                        sample.device_id
                    )));
                }
                insert.execute(params![
                    sample.device_id.as_str(),
                    to_micros(sample.event_time)?,
                    sample.coordinates.latitude(),
                    sample.coordinates.longitude(),
                    created_us,
                ])?;
            }
        }
        tx.commit()?;
        drop(connection);
        self.hub.publish_inserted(samples.iter().map(|sample| &sample.device_id));
        Ok(())
    }

    /// Lists the latest sample per device ordered by device id.
    fn list_latest_inner(&self, page: PageOptions) -> Result<Vec<Sample>, SqliteStoreError> {
        let (limit, offset) = limit_offset(page)?;
        let connection = self.lock()?;
        let mut stmt = connection.prepare_cached(LIST_LATEST_SQL)?;
        let rows = stmt
            .query_map(params![limit, offset], read_sample_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(SampleRow::into_sample).collect()
    }

    /// Resolves the latest sample for each requested id, positionally.
    fn latest_for_devices_inner(
        &self,
        device_ids: &[DeviceId],
    ) -> Result<Vec<Option<Sample>>, SqliteStoreError> {
        let mut seen = HashSet::new();
        let unique: Vec<&str> =
            device_ids.iter().map(DeviceId::as_str).filter(|id| seen.insert(*id)).collect();
        let mut found: HashMap<&str, Sample> = HashMap::with_capacity(unique.len());
        let connection = self.lock()?;
        let mut stmt = connection.prepare_cached(LATEST_FOR_DEVICE_SQL)?;
        for device_id in unique {
            let row = stmt.query_row(params![device_id], read_sample_row).optional()?;
            if let Some(row) = row {
                found.insert(device_id, row.into_sample()?);
            }
        }
        drop(stmt);
        drop(connection);
        Ok(device_ids.iter().map(|device_id| found.get(device_id.as_str()).cloned()).collect())
    }
}

impl GeolocationStore for SqliteGeolocationStore {
    fn insert_device(&self, name: &str) -> Result<DeviceId, StoreError> {
        Ok(self.insert_device_inner(name)?)
    }

    fn list_devices(&self, page: PageOptions) -> Result<Vec<Device>, StoreError> {
        Ok(self.list_devices_inner(page)?)
    }

    fn insert_sample(&self, sample: &NewSample) -> Result<(), StoreError> {
        Ok(self.insert_samples_inner(std::slice::from_ref(sample))?)
    }

    fn insert_samples(&self, samples: &[NewSample]) -> Result<(), StoreError> {
        Ok(self.insert_samples_inner(samples)?)
    }

    fn list_latest(&self, page: PageOptions) -> Result<Vec<Sample>, StoreError> {
        Ok(self.list_latest_inner(page)?)
    }

    fn latest_for_devices(
        &self,
        device_ids: &[DeviceId],
    ) -> Result<Vec<Option<Sample>>, StoreError> {
        Ok(self.latest_for_devices_inner(device_ids)?)
    }
}

impl ChangeFeed for SqliteGeolocationStore {
    fn subscribe(&self) -> broadcast::Receiver<StoreNotification> {
        self.hub.subscribe()
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Raw device row.
struct DeviceRow {
    /// Device identifier.
    device_id: String,
    /// Device name.
    name: String,
    /// Creation time (UTC microseconds).
    created_us: i64,
    /// Update time (UTC microseconds).
    updated_us: Option<i64>,
    /// Delete time (UTC microseconds).
    deleted_us: Option<i64>,
}

impl DeviceRow {
    /// Converts the raw row into a [`Device`].
    fn into_device(self) -> Result<Device, SqliteStoreError> {
        Ok(Device {
            device_id: DeviceId::new(self.device_id),
            name: self.name,
            created: from_micros(self.created_us)?,
            updated: self.updated_us.map(from_micros).transpose()?,
            deleted: self.deleted_us.map(from_micros).transpose()?,
        })
    }
}

/// Raw sample row.
struct SampleRow {
    /// Device identifier.
    device_id: String,
    /// Event time (UTC microseconds).
    event_time_us: i64,
    /// Latitude in degrees.
    latitude: f64,
    /// Longitude in degrees.
    longitude: f64,
    /// Creation time (UTC microseconds).
    created_us: i64,
    /// Update time (UTC microseconds).
    updated_us: Option<i64>,
    /// Delete time (UTC microseconds).
    deleted_us: Option<i64>,
}

impl SampleRow {
    /// Converts the raw row into a [`Sample`], rejecting corrupt coordinates.
    fn into_sample(self) -> Result<Sample, SqliteStoreError> {
        let sample = Sample {
            device_id: DeviceId::new(self.device_id),
            event_time: from_micros(self.event_time_us)?,
            latitude: self.latitude,
            longitude: self.longitude,
            created: from_micros(self.created_us)?,
            updated: self.updated_us.map(from_micros).transpose()?,
            deleted: self.deleted_us.map(from_micros).transpose()?,
        };
        sample.coordinates().map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        Ok(sample)
    }
}

/// Reads one row of [`LATEST_FOR_DEVICE_SQL`] or [`LIST_LATEST_SQL`].
fn read_sample_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SampleRow> {
    Ok(SampleRow {
        device_id: row.get(0)?,
        event_time_us: row.get(1)?,
        latitude: row.get(2)?,
        longitude: row.get(3)?,
        created_us: row.get(4)?,
        updated_us: row.get(5)?,
        deleted_us: row.get(6)?,
    })
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path.display().to_string().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with the configured pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)?;
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))?;
    connection.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;
    Ok(connection)
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction()?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS devices (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    device_id TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    created_us INTEGER NOT NULL,
                    updated_us INTEGER,
                    deleted_us INTEGER
                );
                CREATE TABLE IF NOT EXISTS geolocations (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    device_id TEXT NOT NULL REFERENCES devices(device_id),
                    event_time_us INTEGER NOT NULL,
                    latitude REAL NOT NULL CHECK (latitude BETWEEN -90.0 AND 90.0),
                    longitude REAL NOT NULL CHECK (longitude BETWEEN -180.0 AND 180.0),
                    created_us INTEGER NOT NULL,
                    updated_us INTEGER,
                    deleted_us INTEGER
                );
                CREATE INDEX IF NOT EXISTS idx_geolocations_latest
                    ON geolocations (device_id, event_time_us DESC, id DESC);",
            )?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit()?;
    Ok(())
}

/// Converts page options into `(limit, offset)` SQL parameters.
fn limit_offset(page: PageOptions) -> Result<(i64, i64), SqliteStoreError> {
    let offset = i64::try_from(page.offset())
        .map_err(|_| SqliteStoreError::Invalid("page offset too large".to_string()))?;
    Ok((i64::from(page.page_size()), offset))
}

/// Converts a timestamp into UTC microseconds.
fn to_micros(value: OffsetDateTime) -> Result<i64, SqliteStoreError> {
    i64::try_from(value.unix_timestamp_nanos() / 1_000)
        .map_err(|_| SqliteStoreError::Invalid("timestamp out of range".to_string()))
}

/// Converts UTC microseconds into a timestamp.
fn from_micros(micros: i64) -> Result<OffsetDateTime, SqliteStoreError> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000)
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}
