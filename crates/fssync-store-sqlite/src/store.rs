// crates/fssync-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Sync Store
// Description: Durable SyncStore backed by SQLite WAL.
// Purpose: Persist current-state rows and append-only history per entity.
// Dependencies: fssync-core, rusqlite, serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! This module implements a durable [`SyncStore`] using `SQLite`. Writes run in
//! `IMMEDIATE` transactions so the max-version read and the history insert
//! happen under the same write lock. Uniqueness violations surface as
//! [`StoreError::Conflict`] for the version writer to retry.
//!
//! Provisioned layouts are recorded in `fssync_layouts` so later runs and the
//! audit can address columns that a given page no longer carries.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use fssync_core::BoundValue;
use fssync_core::CurrentRow;
use fssync_core::EntityLayout;
use fssync_core::EntityType;
use fssync_core::HistoryRow;
use fssync_core::SnapshotMap;
use fssync_core::StoreError;
use fssync_core::SyncStore;
use fssync_core::TextRow;
use fssync_core::WriteRow;
use fssync_core::runtime::Dialect;
use fssync_core::runtime::StatementCache;
use fssync_core::runtime::statements::add_column;
use fssync_core::runtime::statements::projection_columns;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use tracing::info;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store bookkeeping tables.
const SCHEMA_VERSION: i64 = 1;
/// Busy timeout applied when the config omits one (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum serialized layout size accepted from the registry table.
pub const MAX_LAYOUT_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// Write-ahead log; readers never block the sync writer.
    #[default]
    Wal,
    /// Rollback journal deleted after each transaction.
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
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Fsync on every commit.
    #[default]
    Full,
    /// Fsync at checkpoints only.
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

/// Configuration for the `SQLite` sync store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
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
}

impl SqliteStoreConfig {
    /// Creates a config with default pragmas for a database path.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Serde default for `busy_timeout_ms`.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Uniqueness constraint violation.
    #[error("sqlite store constraint violation: {0}")]
    Conflict(String),
    /// Store corruption.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data or request.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Db(message),
            SqliteStoreError::Conflict(message) => Self::Conflict(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => {
                Self::Invalid(format!("schema version mismatch: {message}"))
            }
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Maps engine errors, classifying constraint violations as conflicts.
fn db_error(err: rusqlite::Error) -> SqliteStoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            SqliteStoreError::Conflict(err.to_string())
        }
        _ => SqliteStoreError::Db(err.to_string()),
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed sync store with WAL support.
#[derive(Debug, Clone)]
pub struct SqliteSyncStore {
    /// Single connection; page writes are serialized through it.
    connection: Arc<Mutex<Connection>>,
    /// Statement text per layout, shared across clones.
    statements: Arc<StatementCache>,
}

impl SqliteSyncStore {
    /// Opens an `SQLite`-backed sync store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        info!(path = %config.path.display(), "sqlite sync store opened");
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            statements: Arc::new(StatementCache::new(Dialect::Sqlite)),
        })
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))
    }

    /// Creates or widens both tables and records the layout.
    fn provision(&self, layout: &EntityLayout) -> Result<(), SqliteStoreError> {
        let statements = self.statements.statements(layout);
        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_error)?;
        tx.execute_batch(&format!("{};\n{};", statements.create_current, statements.create_history))
            .map_err(db_error)?;
        for table in [&layout.current_table, &layout.history_table] {
            let existing = table_columns(&tx, table)?;
            for column in layout.missing_from(&existing) {
                debug!(table = %table, column = %column.name, "adding column");
                tx.execute(&add_column(table, column, Dialect::Sqlite), params![])
                    .map_err(db_error)?;
            }
        }
        let recorded = match read_layout(&tx, &layout.entity)? {
            Some(stored) if stored.current_table == layout.current_table => {
                stored.merged_with(layout)
            }
            _ => layout.clone(),
        };
        let layout_json = serde_json::to_string(&recorded)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        tx.execute(
            "INSERT INTO fssync_layouts (entity, layout_json, updated) VALUES (?1, ?2, ?3) ON \
             CONFLICT(entity) DO UPDATE SET layout_json = excluded.layout_json, updated = \
             excluded.updated",
            params![layout.entity.as_str(), layout_json, unix_millis()],
        )
        .map_err(db_error)?;
        tx.commit().map_err(db_error)?;
        drop(guard);
        Ok(())
    }

    /// Reads the recorded layout for an entity.
    fn load_layout(&self, entity: &EntityType) -> Result<Option<EntityLayout>, SqliteStoreError> {
        let guard = self.lock()?;
        let layout = read_layout(&guard, entity)?;
        drop(guard);
        Ok(layout)
    }

    /// Bulk-reads snapshot rows for a set of identities.
    fn snapshots(
        &self,
        layout: &EntityLayout,
        object_ids: &[i64],
    ) -> Result<SnapshotMap, SqliteStoreError> {
        if object_ids.is_empty() {
            return Ok(SnapshotMap::new());
        }
        let names = projection_columns(layout);
        let identity = identity_index(layout, &names)?;
        let ids_json = serde_json::to_string(object_ids)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let statements = self.statements.statements(layout);
        let sql = &statements.select_snapshot;
        let guard = self.lock()?;
        let rows = query_values(&guard, sql, &[Value::Text(ids_json)], names.len())?;
        drop(guard);
        let mut snapshots = SnapshotMap::new();
        for values in rows {
            let object_id = integer_at(&values, identity, &layout.identity_column)?;
            snapshots.insert(object_id, text_row(&names, &values)?);
        }
        Ok(snapshots)
    }

    /// Inserts the first version of a record into both tables.
    fn insert_first(&self, layout: &EntityLayout, row: &WriteRow) -> Result<(), SqliteStoreError> {
        let statements = self.statements.statements(layout);
        let (gx, gy) = row.geometry_values();
        let mut current: Vec<Value> = row.values.iter().map(sql_value).collect();
        current.extend([sql_value(&gx), sql_value(&gy)]);
        let mut history = current.clone();
        current.push(Value::Integer(row.timestamp));
        history.extend([Value::Integer(row.timestamp), Value::Integer(1)]);

        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_error)?;
        tx.execute(&statements.insert_current, params_from_iter(current)).map_err(db_error)?;
        tx.execute(&statements.insert_history, params_from_iter(history)).map_err(db_error)?;
        tx.commit().map_err(db_error)?;
        drop(guard);
        Ok(())
    }

    /// Overwrites the current row and appends the next history version.
    fn append_next(&self, layout: &EntityLayout, row: &WriteRow) -> Result<i64, SqliteStoreError> {
        let statements = self.statements.statements(layout);
        let (gx, gy) = row.geometry_values();
        let mut update: Vec<Value> = row.non_identity_values(layout).map(sql_value).collect();
        update.extend([
            sql_value(&gx),
            sql_value(&gy),
            Value::Integer(row.timestamp),
            Value::Integer(row.object_id),
        ]);

        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_error)?;
        let max_version: Option<i64> = tx
            .query_row(&statements.select_max_version, params![row.object_id], |found| {
                found.get(0)
            })
            .map_err(db_error)?;
        let Some(max_version) = max_version else {
            return Err(SqliteStoreError::Corrupt(format!(
                "object {} has no history in {}",
                row.object_id, layout.history_table
            )));
        };
        let next = max_version.checked_add(1).ok_or_else(|| {
            SqliteStoreError::Corrupt(format!("version overflow for object {}", row.object_id))
        })?;
        let updated =
            tx.execute(&statements.update_current, params_from_iter(update)).map_err(db_error)?;
        if updated != 1 {
            return Err(SqliteStoreError::Invalid(format!(
                "object {} has no current row in {}",
                row.object_id, layout.current_table
            )));
        }
        let mut history: Vec<Value> = row.values.iter().map(sql_value).collect();
        history.extend([
            sql_value(&gx),
            sql_value(&gy),
            Value::Integer(row.timestamp),
            Value::Integer(next),
        ]);
        tx.execute(&statements.insert_history, params_from_iter(history)).map_err(db_error)?;
        tx.commit().map_err(db_error)?;
        drop(guard);
        Ok(next)
    }

    /// Reads every current-state row.
    fn all_current(&self, layout: &EntityLayout) -> Result<Vec<CurrentRow>, SqliteStoreError> {
        let names = projection_columns(layout);
        let identity = identity_index(layout, &names)?;
        let statements = self.statements.statements(layout);
        let sql = &statements.select_current_all;
        let guard = self.lock()?;
        let rows = query_values(&guard, sql, &[], names.len() + 1)?;
        drop(guard);
        rows.iter()
            .map(|values| {
                Ok(CurrentRow {
                    object_id: integer_at(values, identity, &layout.identity_column)?,
                    values: text_row(&names, values)?,
                    updated: integer_at(values, names.len(), "updated")?,
                })
            })
            .collect()
    }

    /// Reads every history row.
    fn all_history(&self, layout: &EntityLayout) -> Result<Vec<HistoryRow>, SqliteStoreError> {
        let names = projection_columns(layout);
        let identity = identity_index(layout, &names)?;
        let statements = self.statements.statements(layout);
        let sql = &statements.select_history_all;
        let guard = self.lock()?;
        let rows = query_values(&guard, sql, &[], names.len() + 2)?;
        drop(guard);
        rows.iter()
            .map(|values| {
                Ok(HistoryRow {
                    object_id: integer_at(values, identity, &layout.identity_column)?,
                    version: integer_at(values, names.len() + 1, "version")?,
                    created: integer_at(values, names.len(), "created")?,
                    values: text_row(&names, values)?,
                })
            })
            .collect()
    }
}

impl SyncStore for SqliteSyncStore {
    fn ensure_schema(&self, layout: &EntityLayout) -> Result<(), StoreError> {
        self.provision(layout).map_err(StoreError::from)
    }

    fn stored_layout(&self, entity: &EntityType) -> Result<Option<EntityLayout>, StoreError> {
        self.load_layout(entity).map_err(StoreError::from)
    }

    fn load_snapshots(
        &self,
        layout: &EntityLayout,
        object_ids: &[i64],
    ) -> Result<SnapshotMap, StoreError> {
        self.snapshots(layout, object_ids).map_err(StoreError::from)
    }

    fn insert_new(&self, layout: &EntityLayout, row: &WriteRow) -> Result<(), StoreError> {
        self.insert_first(layout, row).map_err(StoreError::from)
    }

    fn append_version(&self, layout: &EntityLayout, row: &WriteRow) -> Result<i64, StoreError> {
        self.append_next(layout, row).map_err(StoreError::from)
    }

    fn current_rows(&self, layout: &EntityLayout) -> Result<Vec<CurrentRow>, StoreError> {
        self.all_current(layout).map_err(StoreError::from)
    }

    fn history_rows(&self, layout: &EntityLayout) -> Result<Vec<HistoryRow>, StoreError> {
        self.all_history(layout).map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Row Helpers
// ============================================================================

/// Converts a bound value into an owned `SQLite` value.
fn sql_value(value: &BoundValue) -> Value {
    match value {
        BoundValue::Null => Value::Null,
        BoundValue::Integer(v) => Value::Integer(*v),
        BoundValue::Real(v) => Value::Real(*v),
        BoundValue::Text(text) => Value::Text(text.clone()),
    }
}

/// Renders a stored value as snapshot text.
fn render_value(value: &Value) -> Result<String, SqliteStoreError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Integer(v) => Ok(v.to_string()),
        Value::Real(v) => Ok(v.to_string()),
        Value::Text(text) => Ok(text.clone()),
        Value::Blob(_) => Err(SqliteStoreError::Corrupt("unexpected blob value".to_string())),
    }
}

/// Runs a query and collects the first `width` columns of every row.
fn query_values(
    connection: &Connection,
    sql: &str,
    params: &[Value],
    width: usize,
) -> Result<Vec<Vec<Value>>, SqliteStoreError> {
    let mut statement = connection.prepare(sql).map_err(db_error)?;
    let rows = statement
        .query_map(params_from_iter(params), |row| {
            (0..width).map(|index| row.get::<_, Value>(index)).collect::<Result<Vec<_>, _>>()
        })
        .map_err(db_error)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(db_error)
}

/// Zips projection names with row values into a text row.
fn text_row(names: &[String], values: &[Value]) -> Result<TextRow, SqliteStoreError> {
    names
        .iter()
        .zip(values)
        .map(|(name, value)| Ok((name.clone(), render_value(value)?)))
        .collect()
}

/// Reads an integer column from a row.
fn integer_at(values: &[Value], index: usize, column: &str) -> Result<i64, SqliteStoreError> {
    match values.get(index) {
        Some(Value::Integer(v)) => Ok(*v),
        _ => Err(SqliteStoreError::Corrupt(format!("non-integer {column} value"))),
    }
}

/// Returns the position of the identity column in a projection.
fn identity_index(layout: &EntityLayout, names: &[String]) -> Result<usize, SqliteStoreError> {
    names.iter().position(|name| *name == layout.identity_column).ok_or_else(|| {
        SqliteStoreError::Invalid(format!(
            "identity column {} missing from layout",
            layout.identity_column
        ))
    })
}

/// Lists the column names of a table.
fn table_columns(connection: &Connection, table: &str) -> Result<Vec<String>, SqliteStoreError> {
    let mut statement =
        connection.prepare("SELECT name FROM pragma_table_info(?1)").map_err(db_error)?;
    let names = statement.query_map(params![table], |row| row.get(0)).map_err(db_error)?;
    names.collect::<Result<Vec<String>, _>>().map_err(db_error)
}

/// Reads and decodes a recorded layout.
fn read_layout(
    connection: &Connection,
    entity: &EntityType,
) -> Result<Option<EntityLayout>, SqliteStoreError> {
    let stored: Option<String> = connection
        .query_row(
            "SELECT layout_json FROM fssync_layouts WHERE entity = ?1",
            params![entity.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_error)?;
    let Some(json) = stored else {
        return Ok(None);
    };
    if json.len() > MAX_LAYOUT_BYTES {
        return Err(SqliteStoreError::Invalid(format!(
            "layout for {entity} exceeds {MAX_LAYOUT_BYTES} bytes"
        )));
    }
    let layout: EntityLayout = serde_json::from_str(&json)
        .map_err(|err| SqliteStoreError::Corrupt(format!("layout for {entity}: {err}")))?;
    if layout.entity != *entity {
        return Err(SqliteStoreError::Corrupt(format!("layout entity mismatch for {entity}")));
    }
    Ok(Some(layout))
}

// ============================================================================
// SECTION: Connection Helpers
// ============================================================================

/// Creates the database file's parent directory.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Rejects database paths that exceed length limits or name a directory.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
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

/// Opens an `SQLite` connection and applies pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_error)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies the configured pragmas and busy timeout.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_error)?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms)).map_err(db_error)?;
    Ok(())
}

/// Initializes the bookkeeping tables or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(db_error)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db_error)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db_error)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db_error)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS fssync_layouts (
                    entity TEXT PRIMARY KEY,
                    layout_json TEXT NOT NULL,
                    updated INTEGER NOT NULL
                );",
            )
            .map_err(db_error)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(db_error)?;
    Ok(())
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
