// crates/warden-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Control-Plane Store
// Description: Single-writer SQLite store with WAL reads and instance lock.
// Purpose: Serialize all mutations through one writer connection.
// Dependencies: rusqlite, serde, serde_json, thiserror, warden-core
// ============================================================================

//! ## Overview
//! This module owns the database connections for the control plane. All
//! mutations funnel through a single mutex-guarded writer connection so one
//! transaction applies at a time; reads run concurrently against a WAL read
//! pool selected round-robin. Opening the store applies the migration ladder
//! and claims the single-instance lock; a second opener fails with
//! [`SqliteStoreError::Contention`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::Transaction;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;
use warden_core::OwnerId;
use warden_core::StoreError;
use warden_core::Timestamp;

use crate::migrations::apply_migrations;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default read connection pool size.
const DEFAULT_READ_POOL_SIZE: usize = 4;
/// Default instance lock TTL (ms).
const DEFAULT_INSTANCE_TTL_MS: i64 = 30_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteJournalMode {
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
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
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

/// Configuration for the control-plane store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
/// - `read_pool_size` must be greater than zero.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Number of read-only connections for read path isolation.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
    /// Instance lock TTL in milliseconds.
    #[serde(default = "default_instance_ttl_ms")]
    pub instance_ttl_ms: i64,
}

impl SqliteStoreConfig {
    /// Creates a config with defaults for everything except the path.
    #[must_use]
    pub fn for_path(path: PathBuf) -> Self {
        Self {
            path,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
            read_pool_size: DEFAULT_READ_POOL_SIZE,
            instance_ttl_ms: DEFAULT_INSTANCE_TTL_MS,
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default read connection pool size.
const fn default_read_pool_size() -> usize {
    DEFAULT_READ_POOL_SIZE
}

/// Returns the default instance lock TTL.
const fn default_instance_ttl_ms() -> i64 {
    DEFAULT_INSTANCE_TTL_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw row payloads.
#[derive(Debug, Error, Clone)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Write rejected by a database-enforced invariant.
    #[error("sqlite store constraint violation: {0}")]
    Constraint(String),
    /// Store corruption or integrity mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Requested row does not exist.
    #[error("sqlite store row not found: {0}")]
    NotFound(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Migration ladder failed to apply.
    #[error("sqlite store migration failure: {0}")]
    Migration(String),
    /// Another live instance holds the database.
    #[error("sqlite store instance contention: {0}")]
    Contention(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Db(message),
            SqliteStoreError::Constraint(message) => Self::Constraint(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::Migration(message) => Self::Migration(message),
            SqliteStoreError::Contention(message) => Self::Contention(message),
        }
    }
}

/// Classifies a rusqlite error into a store error.
pub(crate) fn classify_db_error(error: &rusqlite::Error) -> SqliteStoreError {
    match error {
        rusqlite::Error::SqliteFailure(failure, message) => {
            let text = message.clone().unwrap_or_else(|| failure.to_string());
            if failure.code == ErrorCode::ConstraintViolation {
                SqliteStoreError::Constraint(text)
            } else {
                SqliteStoreError::Db(text)
            }
        }
        rusqlite::Error::QueryReturnedNoRows => {
            SqliteStoreError::NotFound("query returned no rows".to_string())
        }
        other => SqliteStoreError::Db(other.to_string()),
    }
}

// ============================================================================
// SECTION: Path Validation
// ============================================================================

/// Validates the configured database path.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let raw = path.as_os_str();
    if raw.is_empty() {
        return Err(SqliteStoreError::Invalid("store path is empty".to_string()));
    }
    if raw.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid(format!(
            "store path exceeds {MAX_TOTAL_PATH_LENGTH} bytes"
        )));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(format!(
                "store path component exceeds {MAX_PATH_COMPONENT_LENGTH} bytes"
            )));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path resolves to a directory".to_string(),
        ));
    }
    Ok(())
}

/// Creates the parent directory of the database file when missing.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Connection Setup
// ============================================================================

/// Opens a connection with the configured pragmas applied.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| classify_db_error(&err))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| classify_db_error(&err))?;
    connection
        .pragma_update(None, "journal_mode", config.journal_mode.pragma_value())
        .map_err(|err| classify_db_error(&err))?;
    connection
        .pragma_update(None, "synchronous", config.sync_mode.pragma_value())
        .map_err(|err| classify_db_error(&err))?;
    connection
        .pragma_update(None, "foreign_keys", "on")
        .map_err(|err| classify_db_error(&err))?;
    Ok(connection)
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed control-plane store.
///
/// # Invariants
/// - All mutations go through the single writer connection.
/// - Read connections never issue writes.
#[derive(Clone)]
pub struct ControlStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Owner identity recorded in the instance lock.
    instance_owner: OwnerId,
    /// Shared writer connection guarded by a mutex.
    write_connection: Arc<Mutex<Connection>>,
    /// Read-only connection pool for read path isolation under WAL.
    read_connections: Arc<Vec<Mutex<Connection>>>,
    /// Round-robin cursor for read connection selection.
    read_cursor: Arc<AtomicUsize>,
}

impl ControlStore {
    /// Opens the store, applies migrations, and claims the instance lock.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Migration`] when the ladder fails,
    /// [`SqliteStoreError::Contention`] when another live instance holds the
    /// database, and other variants for I/O or engine failures.
    pub fn open(
        config: SqliteStoreConfig,
        owner: OwnerId,
        now: Timestamp,
    ) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        if config.read_pool_size == 0 {
            return Err(SqliteStoreError::Invalid(
                "read_pool_size must be greater than zero".to_string(),
            ));
        }
        let mut write_connection = open_connection(&config)?;
        apply_migrations(&mut write_connection)?;
        claim_instance_lock(&mut write_connection, &owner, now, config.instance_ttl_ms)?;
        let mut read_connections = Vec::with_capacity(config.read_pool_size);
        for _ in 0 .. config.read_pool_size {
            read_connections.push(Mutex::new(open_connection(&config)?));
        }
        Ok(Self {
            config,
            instance_owner: owner,
            write_connection: Arc::new(Mutex::new(write_connection)),
            read_connections: Arc::new(read_connections),
            read_cursor: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Returns the instance lock owner identity.
    #[must_use]
    pub const fn instance_owner(&self) -> &OwnerId {
        &self.instance_owner
    }

    /// Runs a closure inside one writer transaction.
    ///
    /// The writer mutex is the serialization point: one transaction applies
    /// at a time across the whole process.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or [`SqliteStoreError::Db`] when the
    /// transaction itself fails to begin or commit.
    pub(crate) fn with_write<T>(
        &self,
        operation: impl FnOnce(&Transaction<'_>) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let mut guard = self
            .write_connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("write mutex poisoned".to_string()))?;
        let tx = guard.transaction().map_err(|err| classify_db_error(&err))?;
        let value = operation(&tx)?;
        tx.commit().map_err(|err| classify_db_error(&err))?;
        Ok(value)
    }

    /// Runs a closure against one read connection.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or [`SqliteStoreError::Io`] when the
    /// read mutex is poisoned.
    pub(crate) fn with_read<T>(
        &self,
        operation: impl FnOnce(&Connection) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let index = self.read_cursor.fetch_add(1, Ordering::Relaxed) % self.read_connections.len();
        let guard = self.read_connections[index]
            .lock()
            .map_err(|_| SqliteStoreError::Io("read mutex poisoned".to_string()))?;
        operation(&guard)
    }

    /// Verifies the store can execute a trivial statement on both paths.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when either connection path fails.
    pub fn readiness(&self) -> Result<(), SqliteStoreError> {
        self.with_read(|connection| {
            connection
                .query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|err| classify_db_error(&err))
        })?;
        self.with_write(|tx| {
            tx.query_row("SELECT 1", [], |_| Ok(())).map_err(|err| classify_db_error(&err))
        })
    }

    /// Renews the instance lock held by this store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Contention`] when the lock is no longer
    /// held by this instance.
    pub fn heartbeat_instance(&self, now: Timestamp) -> Result<(), SqliteStoreError> {
        let ttl = self.config.instance_ttl_ms;
        let owner = self.instance_owner.clone();
        self.with_write(move |tx| {
            let updated = tx
                .execute(
                    "UPDATE instance_lock SET heartbeat_at = ?1, expires_at = ?2 \
                     WHERE lock_id = 1 AND owner_id = ?3",
                    params![
                        now.as_unix_millis(),
                        now.as_unix_millis().saturating_add(ttl),
                        owner.as_str()
                    ],
                )
                .map_err(|err| classify_db_error(&err))?;
            if updated == 0 {
                return Err(SqliteStoreError::Contention(
                    "instance lock lost to another process".to_string(),
                ));
            }
            Ok(())
        })
    }
}

/// Claims the single-instance lock or fails with contention.
fn claim_instance_lock(
    connection: &mut Connection,
    owner: &OwnerId,
    now: Timestamp,
    ttl_ms: i64,
) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| classify_db_error(&err))?;
    let now_ms = now.as_unix_millis();
    let expires = now_ms.saturating_add(ttl_ms);
    let existing: Option<(String, i64)> = tx
        .query_row(
            "SELECT owner_id, expires_at FROM instance_lock WHERE lock_id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map(Some)
        .or_else(|err| {
            if matches!(err, rusqlite::Error::QueryReturnedNoRows) {
                Ok(None)
            } else {
                Err(classify_db_error(&err))
            }
        })?;
    match existing {
        None => {
            tx.execute(
                "INSERT INTO instance_lock (lock_id, owner_id, acquired_at, expires_at, \
                 heartbeat_at) VALUES (1, ?1, ?2, ?3, ?2)",
                params![owner.as_str(), now_ms, expires],
            )
            .map_err(|err| classify_db_error(&err))?;
        }
        Some((holder, holder_expires)) if holder == owner.as_str() || holder_expires < now_ms => {
            tx.execute(
                "UPDATE instance_lock SET owner_id = ?1, acquired_at = ?2, expires_at = ?3, \
                 heartbeat_at = ?2 WHERE lock_id = 1",
                params![owner.as_str(), now_ms, expires],
            )
            .map_err(|err| classify_db_error(&err))?;
        }
        Some((holder, _)) => {
            return Err(SqliteStoreError::Contention(format!(
                "database is held by live instance {holder}"
            )));
        }
    }
    tx.commit().map_err(|err| classify_db_error(&err))?;
    Ok(())
}
