//! Single-connection wrapper around the embedded `SQLite` engine.
//!
//! [`ConnectionHandle`] owns exactly one [`rusqlite::Connection`] for the
//! lifetime of a store. It applies the performance pragmas from
//! [`StoreConfig`], funnels every engine failure through the optional error
//! callback, and implements the nested transaction counter:
//!
//! - only the outermost `begin_transaction` issues `BEGIN`
//! - only the outermost `commit_transaction` issues `COMMIT`
//! - a rollback at any depth poisons the whole outer transaction; the
//!   outermost commit then issues `ROLLBACK` and reports
//!   [`StoreError::TransactionRolledBack`]
//!
//! Savepoints are available inside a transaction for callers that need a
//! real partial rollback.
//!
//! Page size and cache size are open-time knobs. Once the file has a schema,
//! changing them is a documented no-op that returns `false`.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{CachedStatement, Connection, ErrorCode, OptionalExtension, Params, Row};
use tracing::{debug, info, warn};

use crate::config::{LockingMode, StoreConfig, validate_page_size};
use crate::errors::{Result, StoreError};

/// Callback invoked for every engine-level failure.
pub type ErrorCallback = Arc<dyn Fn(&EngineError) + Send + Sync>;

/// Engine failure as reported to the error callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineError {
    /// Primary result code.
    pub code: ErrorCode,
    /// Extended result code.
    pub extended_code: i32,
    /// Engine message, if any.
    pub message: Option<String>,
    /// SQL text of the failing statement, if known.
    pub statement: Option<String>,
}

/// Counts of transaction statements actually sent to the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineTransactionStats {
    /// `BEGIN` statements issued.
    pub begins: u64,
    /// `COMMIT` statements issued.
    pub commits: u64,
    /// `ROLLBACK` statements issued.
    pub rollbacks: u64,
}

/// Sidecar file the engine keeps next to `path` (e.g. `-journal`, `-wal`).
pub fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Suffixes of every sidecar file the engine may create.
pub const SIDECAR_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

/// Treat misuse of the store as fatal in debug builds.
pub(crate) fn programmer_error(message: &str) -> StoreError {
    if cfg!(debug_assertions) {
        panic!("{message}");
    }
    StoreError::invalid_state(message)
}

/// Owner of the store's only engine connection.
pub struct ConnectionHandle {
    conn: Option<Connection>,
    path: Option<PathBuf>,
    config: StoreConfig,
    locking_mode: LockingMode,
    error_callback: Option<ErrorCallback>,
    last_error: Mutex<Option<EngineError>>,
    nesting: usize,
    needs_rollback: bool,
    savepoints: Vec<String>,
    stats: EngineTransactionStats,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("path", &self.path)
            .field("open", &self.conn.is_some())
            .field("locking_mode", &self.locking_mode)
            .field("nesting", &self.nesting)
            .field("needs_rollback", &self.needs_rollback)
            .finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    /// Create an unopened handle with the given configuration.
    pub fn new(config: StoreConfig) -> Self {
        let locking_mode = config.initial_locking_mode();
        Self {
            conn: None,
            path: None,
            config,
            locking_mode,
            error_callback: None,
            last_error: Mutex::new(None),
            nesting: 0,
            needs_rollback: false,
            savepoints: Vec::new(),
            stats: EngineTransactionStats::default(),
        }
    }

    /// Install the engine error callback. Must be called before [`open`].
    ///
    /// [`open`]: Self::open
    pub fn set_error_callback(&mut self, callback: ErrorCallback) -> Result<()> {
        if self.conn.is_some() {
            return Err(programmer_error(
                "error callback must be set before the connection is opened",
            ));
        }
        self.error_callback = Some(callback);
        Ok(())
    }

    /// Remove the engine error callback.
    pub fn reset_error_callback(&mut self) {
        self.error_callback = None;
    }

    // ── Open / close ────────────────────────────────────────────────────

    /// Open (creating if absent) the database file at `path`.
    pub fn open(&mut self, path: &Path) -> Result<()> {
        if self.conn.is_some() {
            return Err(programmer_error("connection is already open"));
        }
        self.config.validate()?;
        self.path = Some(path.to_owned());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(|e| self.report(e, None))?;
        self.configure(&conn)?;
        info!(path = %path.display(), locking_mode = ?self.locking_mode, "database opened");
        self.conn = Some(conn);
        Ok(())
    }

    /// Open a private in-memory database with the same configuration.
    pub fn open_in_memory(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Err(programmer_error("connection is already open"));
        }
        self.config.validate()?;
        self.path = None;
        let conn = Connection::open_in_memory().map_err(|e| self.report(e, None))?;
        self.configure(&conn)?;
        debug!("in-memory database opened");
        self.conn = Some(conn);
        Ok(())
    }

    fn configure(&self, conn: &Connection) -> Result<()> {
        // page_size has to go first; it is ignored once the file has content.
        let pragmas = format!(
            "PRAGMA page_size = {};\
             PRAGMA cache_size = {};\
             PRAGMA locking_mode = {};\
             PRAGMA journal_mode = {};\
             PRAGMA synchronous = {};",
            self.config.page_size,
            self.config.cache_size,
            self.locking_mode.pragma_value(),
            self.config.journal_mode.pragma_value(),
            self.config.synchronous.pragma_value(),
        );
        conn.busy_timeout(Duration::from_millis(u64::from(self.config.busy_timeout_ms)))
            .map_err(|e| self.report(e, None))?;
        conn.execute_batch(&pragmas)
            .map_err(|e| self.report(e, Some(&pragmas)))?;

        // Reading the schema surfaces "not a database" and lock conflicts now
        // instead of on the first query.
        let sql = "SELECT count(*) FROM sqlite_master";
        let _: i64 = conn
            .query_row(sql, [], |row| row.get(0))
            .map_err(|e| self.report(e, Some(sql)))?;
        Ok(())
    }

    /// Close the connection, rolling back any open transaction.
    pub fn close(&mut self) -> Result<()> {
        if self.nesting > 0 {
            warn!(nesting = self.nesting, "closing with an open transaction, rolling back");
            self.nesting = 0;
            self.savepoints.clear();
            self.raw_rollback()?;
        }
        self.needs_rollback = false;
        // Exclusive mode lasts one session; the next open starts from config.
        self.locking_mode = self.config.initial_locking_mode();
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| self.report(e, None))?;
            debug!(path = ?self.path, "database closed");
        }
        Ok(())
    }

    /// Whether the connection is open.
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Path of the database file; `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Configuration the handle applies at open.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| StoreError::invalid_state("connection is not open"))
    }

    // ── Open-time knobs ─────────────────────────────────────────────────

    /// Set the page size. Returns whether the new size takes effect.
    ///
    /// Before open the value is recorded and applied at open. After open it
    /// only applies while the file has no schema objects; otherwise the
    /// engine ignores it and this returns `false`.
    pub fn set_page_size(&mut self, bytes: u32) -> Result<bool> {
        validate_page_size(bytes)?;
        if self.conn.is_none() {
            self.config.page_size = bytes;
            return Ok(true);
        }
        if self.schema_object_count()? > 0 {
            warn!(bytes, "page size change ignored, tables already exist");
            return Ok(false);
        }
        self.execute_batch(&format!("PRAGMA page_size = {bytes}"))?;
        self.config.page_size = bytes;
        Ok(true)
    }

    /// Set the page cache size in pages. Returns whether it takes effect.
    ///
    /// Same rules as [`set_page_size`](Self::set_page_size): recorded before
    /// open, applied after open only while the file has no schema objects.
    pub fn set_cache_size(&mut self, pages: u32) -> Result<bool> {
        if pages == 0 {
            return Err(StoreError::InvalidConfig(
                "cache_size must be greater than zero".into(),
            ));
        }
        if self.conn.is_none() {
            self.config.cache_size = pages;
            return Ok(true);
        }
        if self.schema_object_count()? > 0 {
            warn!(pages, "cache size change ignored, tables already exist");
            return Ok(false);
        }
        self.execute_batch(&format!("PRAGMA cache_size = {pages}"))?;
        self.config.cache_size = pages;
        Ok(true)
    }

    /// Pull the start of the file into the OS cache. Advisory; never fails.
    pub fn preload(&self) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        if self.conn.is_none() {
            return;
        }
        let budget = u64::from(self.config.page_size) * u64::from(self.config.cache_size);
        let result = std::fs::File::open(path)
            .and_then(|file| std::io::copy(&mut file.take(budget), &mut std::io::sink()));
        match result {
            Ok(bytes) => debug!(bytes, "preloaded database pages"),
            Err(e) => debug!(error = %e, "preload failed"),
        }
    }

    /// Switch the connection's file locking mode.
    ///
    /// Switching to exclusive takes the write lock immediately when no
    /// transaction is open, so other processes are locked out from here on.
    pub fn set_locking_mode(&mut self, mode: LockingMode) -> Result<()> {
        let pragma = format!("PRAGMA locking_mode = {}", mode.pragma_value());
        self.execute_batch(&pragma)?;
        if mode == LockingMode::Exclusive && self.nesting == 0 {
            self.execute_batch("BEGIN EXCLUSIVE; COMMIT;")?;
        }
        self.locking_mode = mode;
        info!(?mode, "locking mode changed");
        Ok(())
    }

    /// Current locking mode.
    pub fn locking_mode(&self) -> LockingMode {
        self.locking_mode
    }

    // ── Statement execution ─────────────────────────────────────────────

    /// Execute a single statement with parameters. Returns changed rows.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        let mut stmt = self.prepare(sql)?;
        stmt.execute(params).map_err(|e| self.report(e, Some(sql)))
    }

    /// Execute one or more statements without parameters.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn()?
            .execute_batch(sql)
            .map_err(|e| self.report(e, Some(sql)))
    }

    /// Prepare (or fetch from the statement cache) a statement.
    pub fn prepare(&self, sql: &str) -> Result<CachedStatement<'_>> {
        self.conn()?
            .prepare_cached(sql)
            .map_err(|e| self.report(e, Some(sql)))
    }

    /// Run a query expected to return at most one row.
    pub fn query_row<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<Option<T>>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.prepare(sql)?;
        stmt.query_row(params, f)
            .optional()
            .map_err(|e| self.report(e, Some(sql)))
    }

    /// Run a query and collect every mapped row.
    pub fn query_rows<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.prepare(sql)?;
        let rows = stmt
            .query_map(params, f)
            .map_err(|e| self.report(e, Some(sql)))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| self.report(e, Some(sql)))
    }

    /// Rowid of the most recent successful insert.
    pub fn last_insert_rowid(&self) -> Result<i64> {
        Ok(self.conn()?.last_insert_rowid())
    }

    /// Rows changed by the most recent statement.
    pub fn changes(&self) -> Result<u64> {
        Ok(u64::try_from(self.conn()?.changes()).unwrap_or(u64::MAX))
    }

    /// Read an integer-valued pragma such as `page_count`.
    pub fn pragma_i64(&self, name: &str) -> Result<i64> {
        let sql = format!("PRAGMA {name}");
        self.conn()?
            .query_row(&sql, [], |row| row.get(0))
            .map_err(|e| self.report(e, Some(&sql)))
    }

    /// Whether a table with this name exists.
    pub fn does_table_exist(&self, name: &str) -> Result<bool> {
        self.does_schema_object_exist("table", name)
    }

    /// Whether an index with this name exists.
    pub fn does_index_exist(&self, name: &str) -> Result<bool> {
        self.does_schema_object_exist("index", name)
    }

    fn does_schema_object_exist(&self, kind: &str, name: &str) -> Result<bool> {
        let found = self.query_row(
            "SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2",
            [kind, name],
            |_| Ok(()),
        )?;
        Ok(found.is_some())
    }

    /// Whether `table` has a column named `column`.
    pub fn does_column_exist(&self, table: &str, column: &str) -> Result<bool> {
        let found = self.query_row(
            "SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2",
            [table, column],
            |_| Ok(()),
        )?;
        Ok(found.is_some())
    }

    /// Number of user-visible schema objects (tables, indices, views, triggers).
    pub fn schema_object_count(&self) -> Result<i64> {
        let count = self.query_row(
            "SELECT count(*) FROM sqlite_master WHERE name NOT LIKE 'sqlite\\_%' ESCAPE '\\'",
            [],
            |row| row.get(0),
        )?;
        Ok(count.unwrap_or(0))
    }

    // ── Transactions ────────────────────────────────────────────────────

    /// Current depth of unmatched `begin_transaction` calls.
    pub fn transaction_nesting(&self) -> usize {
        self.nesting
    }

    /// Whether an inner rollback has doomed the outer transaction.
    pub fn needs_rollback(&self) -> bool {
        self.needs_rollback
    }

    /// Transaction statements actually issued to the engine.
    pub fn engine_stats(&self) -> EngineTransactionStats {
        self.stats
    }

    /// Whether the engine itself has no transaction open.
    pub fn is_autocommit(&self) -> bool {
        self.conn.as_ref().is_none_or(Connection::is_autocommit)
    }

    /// Begin a (possibly nested) transaction.
    pub fn begin_transaction(&mut self) -> Result<()> {
        if self.nesting == 0 {
            debug_assert!(!self.needs_rollback);
            self.execute_batch("BEGIN")?;
            self.stats.begins += 1;
        }
        self.nesting += 1;
        Ok(())
    }

    /// Commit one nesting level; the outermost level commits to disk.
    pub fn commit_transaction(&mut self) -> Result<()> {
        match self.nesting {
            0 => Err(programmer_error("commit without an open transaction")),
            1 => {
                self.nesting = 0;
                self.savepoints.clear();
                if self.needs_rollback {
                    self.raw_rollback()?;
                    return Err(StoreError::TransactionRolledBack);
                }
                if let Err(e) = self.execute_batch("COMMIT") {
                    // A failed COMMIT can leave the engine transaction open.
                    if !self.is_autocommit() {
                        let _ = self.raw_rollback();
                    }
                    return Err(e);
                }
                self.stats.commits += 1;
                Ok(())
            }
            _ => {
                self.nesting -= 1;
                Ok(())
            }
        }
    }

    /// Roll back. Any depth rolls back the entire outer transaction.
    ///
    /// With no open transaction this is a no-op, so it is safe to call after
    /// a failed init.
    pub fn rollback_transaction(&mut self) -> Result<()> {
        match self.nesting {
            0 => Ok(()),
            1 => {
                self.nesting = 0;
                self.savepoints.clear();
                self.raw_rollback()
            }
            _ => {
                self.nesting -= 1;
                self.needs_rollback = true;
                Ok(())
            }
        }
    }

    fn raw_rollback(&mut self) -> Result<()> {
        self.needs_rollback = false;
        // The engine may already have aborted the transaction on its own
        // (e.g. SQLITE_FULL); ROLLBACK would then fail.
        if self.is_autocommit() {
            return Ok(());
        }
        self.execute_batch("ROLLBACK")?;
        self.stats.rollbacks += 1;
        Ok(())
    }

    // ── Savepoints ──────────────────────────────────────────────────────

    /// Open a named savepoint inside the current transaction.
    pub fn savepoint(&mut self, name: &str) -> Result<()> {
        if self.nesting == 0 {
            return Err(programmer_error("savepoint requires an open transaction"));
        }
        validate_savepoint_name(name)?;
        self.execute_batch(&format!("SAVEPOINT {name}"))?;
        self.savepoints.push(name.to_owned());
        Ok(())
    }

    /// Release a savepoint and every savepoint opened after it.
    pub fn release_savepoint(&mut self, name: &str) -> Result<()> {
        let pos = self.savepoint_position(name)?;
        self.execute_batch(&format!("RELEASE {name}"))?;
        self.savepoints.truncate(pos);
        Ok(())
    }

    /// Undo everything since the savepoint and close it.
    pub fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        let pos = self.savepoint_position(name)?;
        self.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name};"))?;
        self.savepoints.truncate(pos);
        Ok(())
    }

    /// Names of open savepoints, outermost first.
    pub fn savepoints(&self) -> &[String] {
        &self.savepoints
    }

    fn savepoint_position(&self, name: &str) -> Result<usize> {
        self.savepoints
            .iter()
            .rposition(|s| s == name)
            .ok_or_else(|| programmer_error(&format!("no open savepoint named {name}")))
    }

    // ── Maintenance ─────────────────────────────────────────────────────

    /// Rebuild the file to reclaim free pages. Can be very slow.
    pub fn vacuum(&self) -> Result<()> {
        if self.nesting != 0 {
            return Err(programmer_error("cannot vacuum inside a transaction"));
        }
        self.execute_batch("VACUUM")
    }

    /// Release page cache memory. Advisory; never fails.
    ///
    /// `aggressively` drops everything it can; otherwise the cache is
    /// squeezed to half its size. The configured cache size is restored.
    pub fn trim_memory(&self, aggressively: bool) {
        let Ok(conn) = self.conn() else {
            return;
        };
        let original: i64 = match conn.query_row("PRAGMA cache_size", [], |row| row.get(0)) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "could not read cache size");
                return;
            }
        };
        let shrink = if aggressively { 1 } else { original / 2 };
        if let Err(e) = conn.execute_batch(&format!("PRAGMA cache_size = {shrink}")) {
            warn!(error = %e, "could not shrink cache size");
        }
        if aggressively {
            if let Err(e) = conn.execute_batch("PRAGMA shrink_memory") {
                warn!(error = %e, "could not release cache memory");
            }
        }
        if let Err(e) = conn.execute_batch(&format!("PRAGMA cache_size = {original}")) {
            warn!(error = %e, "could not restore cache size");
        }
        debug!(aggressively, original, "trimmed cache memory");
    }

    /// Reset the database to an empty, valid file.
    ///
    /// Every table, index, view and trigger is dropped, including the meta
    /// table, so schema version metadata is reset too. If the file is too
    /// damaged for that, the connection is closed, the file and its sidecars
    /// are truncated/removed, and the handle reopens the now-empty file.
    /// A handle that never managed to open just has its file reset.
    ///
    /// Returns `false` when an in-memory database is damaged or was never
    /// opened, since there is no file to reset.
    pub fn raze(&mut self) -> Result<bool> {
        if self.nesting != 0 {
            return Err(programmer_error("cannot raze inside a transaction"));
        }
        if self.conn.is_none() {
            let Some(path) = self.path.clone() else {
                warn!("nothing to raze, in-memory database never opened");
                return Ok(false);
            };
            reset_files(&path)?;
            warn!(path = %path.display(), "razed unopened database file");
            return Ok(true);
        }

        match self.drop_all_schema_objects() {
            Ok(()) => {
                self.vacuum()?;
                warn!(path = ?self.path, "database razed");
                Ok(true)
            }
            Err(e) if e.is_corruption() => {
                let Some(path) = self.path.clone() else {
                    warn!(error = %e, "cannot raze damaged in-memory database");
                    return Ok(false);
                };
                warn!(error = %e, path = %path.display(), "database damaged, truncating file");
                if let Some(conn) = self.conn.take() {
                    // The file is about to be truncated; a close error is moot.
                    let _ = conn.close();
                }
                self.locking_mode = self.config.initial_locking_mode();
                reset_files(&path)?;
                self.open(&path)?;
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    fn drop_all_schema_objects(&mut self) -> Result<()> {
        let objects: Vec<(String, String, bool)> = self.query_rows(
            "SELECT type, name, coalesce(sql, '') LIKE 'CREATE VIRTUAL%' FROM sqlite_master
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'
             ORDER BY type = 'table', 3 DESC",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        self.begin_transaction()?;
        let result = (|| {
            for (kind, name, _) in &objects {
                let quoted = name.replace('"', "\"\"");
                let sql = if kind == "view" {
                    format!("DROP VIEW IF EXISTS \"{quoted}\"")
                } else {
                    format!("DROP TABLE IF EXISTS \"{quoted}\"")
                };
                self.execute_batch(&sql)?;
            }
            if self.does_table_exist("sqlite_sequence")? {
                self.execute_batch("DELETE FROM sqlite_sequence")?;
                debug!(sequences = self.changes()?, "reset autoincrement counters");
            }
            self.execute_batch("PRAGMA user_version = 0")
        })();
        match result {
            Ok(()) => self.commit_transaction(),
            Err(e) => {
                let _ = self.rollback_transaction();
                Err(e)
            }
        }
    }

    // ── Error reporting ─────────────────────────────────────────────────

    /// Most recent engine failure seen by this handle.
    pub fn last_error(&self) -> Option<EngineError> {
        self.last_error.lock().clone()
    }

    /// Record an engine failure, notify the callback, and wrap it.
    fn report(&self, err: rusqlite::Error, statement: Option<&str>) -> StoreError {
        if let rusqlite::Error::SqliteFailure(ffi_err, message) = &err {
            let engine_error = EngineError {
                code: ffi_err.code,
                extended_code: ffi_err.extended_code,
                message: message.clone(),
                statement: statement.map(str::to_owned),
            };
            debug!(
                code = ?engine_error.code,
                extended_code = engine_error.extended_code,
                statement = engine_error.statement.as_deref().unwrap_or(""),
                "engine error"
            );
            if let Some(callback) = &self.error_callback {
                callback(&engine_error);
            }
            *self.last_error.lock() = Some(engine_error);
        }
        StoreError::Sqlite(err)
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if self.nesting > 0 {
            // Dropping the connection discards the uncommitted transaction.
            debug!(nesting = self.nesting, "handle dropped with an open transaction");
        }
    }
}

/// Truncate the main file and delete its sidecars.
fn reset_files(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::OpenOptions::new()
            .write(true)
            .open(path)?
            .set_len(0)?;
    }
    for suffix in SIDECAR_SUFFIXES {
        let sidecar = sidecar_path(path, suffix);
        if sidecar.exists() {
            std::fs::remove_file(&sidecar)?;
        }
    }
    Ok(())
}

fn validate_savepoint_name(name: &str) -> Result<()> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::invalid_state(format!(
            "invalid savepoint name: {name:?}"
        )))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn memory() -> ConnectionHandle {
        let mut handle = ConnectionHandle::new(StoreConfig::default());
        handle.open_in_memory().unwrap();
        handle
    }

    fn count(handle: &ConnectionHandle, table: &str) -> i64 {
        handle
            .query_row(&format!("SELECT count(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn open_file_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.db");
        let mut handle = ConnectionHandle::new(StoreConfig::default());
        handle.open(&path).unwrap();
        assert!(handle.is_open());
        assert_eq!(handle.path(), Some(path.as_path()));
        handle.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn configured_pragmas_applied() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            page_size: 8192,
            cache_size: 321,
            ..Default::default()
        };
        let mut handle = ConnectionHandle::new(config);
        handle.open(&dir.path().join("p.db")).unwrap();
        handle.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        assert_eq!(handle.pragma_i64("page_size").unwrap(), 8192);
        assert_eq!(handle.pragma_i64("cache_size").unwrap(), 321);
    }

    #[test]
    fn open_garbage_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.db");
        std::fs::write(&path, vec![0x5a_u8; 8192]).unwrap();
        let mut handle = ConnectionHandle::new(StoreConfig::default());
        let err = handle.open(&path).unwrap_err();
        assert!(err.is_corruption(), "unexpected error: {err}");
        assert!(!handle.is_open());
    }

    #[test]
    fn error_callback_sees_failures() {
        let seen = Arc::new(AtomicUsize::new(0));
        let statements = Arc::new(Mutex::new(Vec::new()));
        let mut handle = ConnectionHandle::new(StoreConfig::default());
        {
            let seen = seen.clone();
            let statements = statements.clone();
            handle
                .set_error_callback(Arc::new(move |e: &EngineError| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    statements.lock().push(e.statement.clone());
                }))
                .unwrap();
        }
        handle.open_in_memory().unwrap();

        let err = handle.execute("INSERT INTO missing VALUES (1)", []).unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(
            statements.lock()[0].as_deref(),
            Some("INSERT INTO missing VALUES (1)")
        );
        let last = handle.last_error().unwrap();
        assert_eq!(last.code, ErrorCode::Unknown);
        assert!(last.message.unwrap().contains("no such table"));
    }

    #[test]
    fn non_engine_errors_skip_callback() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut handle = ConnectionHandle::new(StoreConfig::default());
        let counter = seen.clone();
        handle
            .set_error_callback(Arc::new(move |_: &EngineError| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        handle.open_in_memory().unwrap();
        handle.execute_batch("CREATE TABLE t (x TEXT)").unwrap();
        handle.execute("INSERT INTO t VALUES ('a')", []).unwrap();
        // Type mismatch is a rusqlite conversion error, not an engine failure.
        let err = handle
            .query_row("SELECT x FROM t", [], |row| row.get::<_, i64>(0))
            .unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)));
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert!(handle.last_error().is_none());
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "error callback must be set before")]
    fn error_callback_after_open_is_a_programmer_error() {
        let mut handle = memory();
        let _ = handle.set_error_callback(Arc::new(|_: &EngineError| {}));
    }

    #[test]
    fn page_size_before_open_is_applied() {
        let mut handle = ConnectionHandle::new(StoreConfig::default());
        assert!(handle.set_page_size(2048).unwrap());
        handle.open_in_memory().unwrap();
        handle.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        assert_eq!(handle.pragma_i64("page_size").unwrap(), 2048);
    }

    #[test]
    fn page_size_after_tables_is_a_noop() {
        let mut handle = memory();
        handle.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        assert!(!handle.set_page_size(1024).unwrap());
        assert_eq!(handle.pragma_i64("page_size").unwrap(), 4096);
    }

    #[test]
    fn page_size_after_open_without_tables_applies() {
        let mut handle = memory();
        assert!(handle.set_page_size(1024).unwrap());
        handle.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        assert_eq!(handle.pragma_i64("page_size").unwrap(), 1024);
    }

    #[test]
    fn invalid_page_size_rejected() {
        let mut handle = ConnectionHandle::new(StoreConfig::default());
        assert!(matches!(
            handle.set_page_size(1000),
            Err(StoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn cache_size_applies_until_first_table() {
        let mut handle = ConnectionHandle::new(StoreConfig::default());
        assert!(handle.set_cache_size(50).unwrap());
        handle.open_in_memory().unwrap();
        assert_eq!(handle.pragma_i64("cache_size").unwrap(), 50);

        assert!(handle.set_cache_size(80).unwrap());
        assert_eq!(handle.pragma_i64("cache_size").unwrap(), 80);
        assert_eq!(handle.config().cache_size, 80);

        handle.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        assert!(!handle.set_cache_size(10).unwrap());
        assert_eq!(handle.pragma_i64("cache_size").unwrap(), 80);
    }

    #[test]
    fn preload_never_fails() {
        let handle = memory();
        handle.preload();

        let dir = tempfile::tempdir().unwrap();
        let mut handle = ConnectionHandle::new(StoreConfig::default());
        handle.open(&dir.path().join("warm.db")).unwrap();
        handle.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        handle.preload();
    }

    #[test]
    fn nested_transactions_issue_one_begin_and_commit() {
        let mut handle = memory();
        handle.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();

        handle.begin_transaction().unwrap();
        handle.begin_transaction().unwrap();
        handle.begin_transaction().unwrap();
        assert_eq!(handle.transaction_nesting(), 3);
        handle.execute("INSERT INTO t VALUES (1)", []).unwrap();

        handle.commit_transaction().unwrap();
        handle.commit_transaction().unwrap();
        assert!(!handle.is_autocommit());
        assert_eq!(handle.engine_stats().commits, 0);

        handle.commit_transaction().unwrap();
        assert!(handle.is_autocommit());
        assert_eq!(
            handle.engine_stats(),
            EngineTransactionStats {
                begins: 1,
                commits: 1,
                rollbacks: 0
            }
        );
        assert_eq!(count(&handle, "t"), 1);
    }

    #[test]
    fn inner_rollback_dooms_outer_commit() {
        let mut handle = memory();
        handle.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();

        handle.begin_transaction().unwrap();
        handle.execute("INSERT INTO t VALUES (1)", []).unwrap();
        handle.begin_transaction().unwrap();
        handle.execute("INSERT INTO t VALUES (2)", []).unwrap();
        handle.rollback_transaction().unwrap();
        assert!(handle.needs_rollback());
        assert_eq!(handle.transaction_nesting(), 1);

        let err = handle.commit_transaction().unwrap_err();
        assert!(matches!(err, StoreError::TransactionRolledBack));
        assert_eq!(handle.transaction_nesting(), 0);
        assert!(!handle.needs_rollback());
        assert_eq!(handle.engine_stats().rollbacks, 1);
        assert_eq!(handle.engine_stats().commits, 0);
        assert_eq!(count(&handle, "t"), 0);
    }

    #[test]
    fn rollback_without_transaction_is_noop() {
        let mut handle = memory();
        handle.rollback_transaction().unwrap();
        assert_eq!(handle.transaction_nesting(), 0);
        assert_eq!(handle.engine_stats(), EngineTransactionStats::default());
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "commit without an open transaction")]
    fn commit_without_begin_is_a_programmer_error() {
        let mut handle = memory();
        let _ = handle.commit_transaction();
    }

    #[test]
    fn savepoint_partial_rollback() {
        let mut handle = memory();
        handle.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();

        handle.begin_transaction().unwrap();
        handle.execute("INSERT INTO t VALUES (1)", []).unwrap();
        handle.savepoint("batch").unwrap();
        handle.execute("INSERT INTO t VALUES (2)", []).unwrap();
        handle.rollback_to_savepoint("batch").unwrap();
        assert!(handle.savepoints().is_empty());
        handle.commit_transaction().unwrap();

        assert_eq!(count(&handle, "t"), 1);
    }

    #[test]
    fn release_savepoint_keeps_changes() {
        let mut handle = memory();
        handle.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();

        handle.begin_transaction().unwrap();
        handle.savepoint("outer").unwrap();
        handle.savepoint("inner").unwrap();
        handle.execute("INSERT INTO t VALUES (1)", []).unwrap();
        assert_eq!(handle.savepoints(), ["outer", "inner"]);
        handle.release_savepoint("outer").unwrap();
        assert!(handle.savepoints().is_empty());
        handle.commit_transaction().unwrap();

        assert_eq!(count(&handle, "t"), 1);
    }

    #[test]
    fn invalid_savepoint_name_rejected() {
        let mut handle = memory();
        handle.begin_transaction().unwrap();
        assert!(handle.savepoint("drop table; --").is_err());
        assert!(handle.savepoint("").is_err());
        handle.rollback_transaction().unwrap();
    }

    #[test]
    fn schema_introspection() {
        let handle = memory();
        handle
            .execute_batch("CREATE TABLE t (x INTEGER, y TEXT); CREATE INDEX t_x ON t(x);")
            .unwrap();
        assert!(handle.does_table_exist("t").unwrap());
        assert!(!handle.does_table_exist("u").unwrap());
        assert!(handle.does_index_exist("t_x").unwrap());
        assert!(handle.does_column_exist("t", "y").unwrap());
        assert!(!handle.does_column_exist("t", "z").unwrap());
        assert_eq!(handle.schema_object_count().unwrap(), 2);
    }

    #[test]
    fn trim_memory_restores_cache_size() {
        let handle = memory();
        handle.trim_memory(false);
        assert_eq!(handle.pragma_i64("cache_size").unwrap(), 1000);
        handle.trim_memory(true);
        assert_eq!(handle.pragma_i64("cache_size").unwrap(), 1000);
    }

    #[test]
    fn trim_memory_on_closed_handle_is_noop() {
        let handle = ConnectionHandle::new(StoreConfig::default());
        handle.trim_memory(true);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "cannot vacuum inside a transaction")]
    fn vacuum_inside_transaction_is_a_programmer_error() {
        let mut handle = memory();
        handle.begin_transaction().unwrap();
        let _ = handle.vacuum();
    }

    #[test]
    fn raze_drops_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = ConnectionHandle::new(StoreConfig::default());
        handle.open(&dir.path().join("raze.db")).unwrap();
        handle
            .execute_batch(
                "CREATE TABLE a (id INTEGER PRIMARY KEY AUTOINCREMENT, v TEXT);
                 CREATE INDEX a_v ON a(v);
                 CREATE VIEW a_view AS SELECT v FROM a;
                 INSERT INTO a (v) VALUES ('x');",
            )
            .unwrap();

        assert!(handle.raze().unwrap());
        assert!(handle.is_open());
        assert_eq!(handle.schema_object_count().unwrap(), 0);
        assert!(!handle.does_table_exist("a").unwrap());
    }

    #[test]
    fn raze_unopened_damaged_file_resets_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("damaged.db");
        std::fs::write(&path, vec![0x42_u8; 4096]).unwrap();
        std::fs::write(sidecar_path(&path, "-journal"), b"stale").unwrap();

        let mut handle = ConnectionHandle::new(StoreConfig::default());
        assert!(handle.open(&path).is_err());
        assert!(handle.raze().unwrap());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
        assert!(!sidecar_path(&path, "-journal").exists());

        handle.open(&path).unwrap();
        assert_eq!(handle.schema_object_count().unwrap(), 0);
    }

    #[test]
    fn exclusive_mode_locks_out_other_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locked.db");
        let config = StoreConfig {
            busy_timeout_ms: 10,
            ..Default::default()
        };
        let mut handle = ConnectionHandle::new(config);
        handle.open(&path).unwrap();
        handle.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        handle.set_locking_mode(LockingMode::Exclusive).unwrap();
        assert_eq!(handle.locking_mode(), LockingMode::Exclusive);

        let other = Connection::open(&path).unwrap();
        other.busy_timeout(Duration::from_millis(10)).unwrap();
        let result: rusqlite::Result<i64> =
            other.query_row("SELECT count(*) FROM t", [], |row| row.get(0));
        let err = StoreError::from(result.unwrap_err());
        assert!(err.is_busy(), "unexpected error: {err}");
    }

    #[test]
    fn close_restores_configured_locking_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relock.db");
        let mut handle = ConnectionHandle::new(StoreConfig::default());
        handle.open(&path).unwrap();
        handle.set_locking_mode(LockingMode::Exclusive).unwrap();
        handle.close().unwrap();
        assert_eq!(handle.locking_mode(), LockingMode::Normal);

        handle.open(&path).unwrap();
        let other = Connection::open(&path).unwrap();
        other.busy_timeout(Duration::from_millis(10)).unwrap();
        let objects: i64 = other
            .query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get(0))
            .unwrap();
        assert_eq!(objects, 0);
    }

    #[test]
    fn raze_of_never_opened_memory_handle_is_false() {
        let mut handle = ConnectionHandle::new(StoreConfig::default());
        assert!(!handle.raze().unwrap());
        assert!(!handle.is_open());
    }

    #[test]
    fn reset_error_callback_stops_notifications() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut handle = ConnectionHandle::new(StoreConfig::default());
        let counter = seen.clone();
        handle
            .set_error_callback(Arc::new(move |_: &EngineError| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        handle.open_in_memory().unwrap();
        handle.reset_error_callback();

        assert!(handle.execute("DELETE FROM missing", []).is_err());
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert!(handle.last_error().is_some());
    }

    #[test]
    fn changes_reports_batch_rows() {
        let mut handle = memory();
        handle
            .execute_batch(
                "CREATE TABLE t (x INTEGER);
                 INSERT INTO t VALUES (1), (2), (3);",
            )
            .unwrap();
        assert_eq!(handle.changes().unwrap(), 3);
        handle.execute_batch("DELETE FROM t WHERE x > 1").unwrap();
        assert_eq!(handle.changes().unwrap(), 2);
    }

    #[test]
    fn close_rolls_back_open_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("close.db");
        let mut handle = ConnectionHandle::new(StoreConfig::default());
        handle.open(&path).unwrap();
        handle.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        handle.begin_transaction().unwrap();
        handle.execute("INSERT INTO t VALUES (1)", []).unwrap();
        handle.close().unwrap();
        assert!(!handle.is_open());
        assert_eq!(handle.transaction_nesting(), 0);

        handle.open(&path).unwrap();
        assert_eq!(count(&handle, "t"), 0);
    }

    #[test]
    fn sidecar_names() {
        let path = Path::new("/tmp/contacts.db");
        assert_eq!(
            sidecar_path(path, "-journal"),
            PathBuf::from("/tmp/contacts.db-journal")
        );
        assert_eq!(sidecar_path(path, "-wal"), PathBuf::from("/tmp/contacts.db-wal"));
    }
}
