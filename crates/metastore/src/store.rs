//! The [`MetadataStore`] façade: one connection, many table modules.
//!
//! ```text
//! Uninitialized ──init──▶ Initializing ──▶ Ready ──close/raze──▶ Closed
//!                              │                                   │
//!                              └──────▶ Failed ◀──────init─────────┘
//! ```
//!
//! `init` opens the file, then runs the whole schema check, every module's
//! migration and table creation inside one outer transaction. Either all of
//! it commits or the file is left exactly as it was.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::config::{LockingMode, StoreConfig};
use crate::connection::{ConnectionHandle, ErrorCallback, programmer_error};
use crate::diagnostics::{DatabaseMetrics, compute_metrics, diagnostic_report};
use crate::errors::{InitStatus, Result, StoreError};
use crate::meta_table::MetaTable;
use crate::table::TableModule;

/// Lifecycle state of a [`MetadataStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreState {
    /// Constructed, never initialized.
    Uninitialized,
    /// `init` is running.
    Initializing,
    /// Usable.
    Ready,
    /// Closed or razed; `init` may be called again.
    Closed,
    /// `init` failed; only `raze`, `close` and diagnostics are available.
    Failed,
}

/// Schema versions a store is built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchemaSpec {
    /// Version this binary writes.
    pub current_version: u32,
    /// Oldest version that can still read what this binary writes.
    pub compatible_version: u32,
    /// Files older than this are not migrated; init reports `TooOld`.
    pub deprecated_version: u32,
}

impl SchemaSpec {
    /// Versions with no deprecation floor.
    pub const fn new(current_version: u32, compatible_version: u32) -> Self {
        Self {
            current_version,
            compatible_version,
            deprecated_version: 0,
        }
    }

    /// Refuse to migrate files older than `version`.
    #[must_use]
    pub const fn with_deprecated_version(mut self, version: u32) -> Self {
        self.deprecated_version = version;
        self
    }
}

enum InitTarget {
    File(PathBuf),
    Memory,
}

/// Transactional metadata store shared by a set of table modules.
pub struct MetadataStore {
    schema: SchemaSpec,
    modules: Vec<Box<dyn TableModule>>,
    conn: ConnectionHandle,
    state: StoreState,
    exclusive: bool,
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore")
            .field("schema", &self.schema)
            .field("modules", &self.module_names())
            .field("state", &self.state)
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}

impl MetadataStore {
    /// Create an uninitialized store.
    pub fn new(
        schema: SchemaSpec,
        modules: Vec<Box<dyn TableModule>>,
        config: StoreConfig,
    ) -> Self {
        debug_assert!(schema.compatible_version <= schema.current_version);
        Self {
            schema,
            modules,
            conn: ConnectionHandle::new(config),
            state: StoreState::Uninitialized,
            exclusive: false,
        }
    }

    /// Install the engine error callback. Must be called before `init`.
    pub fn set_error_callback(&mut self, callback: ErrorCallback) -> Result<()> {
        if self.conn.is_open() {
            return Err(programmer_error(
                "error callback must be set before the store is initialized",
            ));
        }
        self.conn.set_error_callback(callback)
    }

    /// Remove the engine error callback. Allowed in any state.
    pub fn reset_error_callback(&mut self) {
        self.conn.reset_error_callback();
    }

    /// Page size applied at the next `init`. See [`ConnectionHandle::set_page_size`].
    pub fn set_page_size(&mut self, bytes: u32) -> Result<bool> {
        self.conn.set_page_size(bytes)
    }

    /// Cache size applied at the next `init`. See [`ConnectionHandle::set_cache_size`].
    pub fn set_cache_size(&mut self, pages: u32) -> Result<bool> {
        self.conn.set_cache_size(pages)
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Open the file at `path` and bring its schema up to date.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn init(&mut self, path: &Path) -> InitStatus {
        self.init_target(&InitTarget::File(path.to_owned()))
    }

    /// Initialize against a private in-memory database.
    #[instrument(skip_all)]
    pub fn init_in_memory(&mut self) -> InitStatus {
        self.init_target(&InitTarget::Memory)
    }

    fn init_target(&mut self, target: &InitTarget) -> InitStatus {
        if !matches!(self.state, StoreState::Uninitialized | StoreState::Closed) {
            let err = programmer_error(&format!("init called in state {:?}", self.state));
            warn!(error = %err, "init rejected");
            return InitStatus::Failure;
        }
        self.state = StoreState::Initializing;

        let mut status = self.try_init(target);
        if status == InitStatus::TooOld && self.conn.config().raze_if_deprecated {
            warn!(
                deprecated_version = self.schema.deprecated_version,
                "razing database older than the oldest migratable schema"
            );
            status = match self.conn.raze() {
                Ok(true) => self.try_init(target),
                Ok(false) => InitStatus::Failure,
                Err(e) => {
                    warn!(error = %e, "raze of deprecated database failed");
                    InitStatus::Failure
                }
            };
        }

        if status.is_ok() {
            self.exclusive = self.conn.locking_mode() == LockingMode::Exclusive;
            self.state = StoreState::Ready;
            info!(
                version = self.schema.current_version,
                modules = self.modules.len(),
                "store ready"
            );
        } else {
            if let Err(e) = self.conn.close() {
                debug!(error = %e, "close after failed init");
            }
            self.state = StoreState::Failed;
            warn!(%status, "store init failed");
        }
        status
    }

    fn try_init(&mut self, target: &InitTarget) -> InitStatus {
        match self.run_init(target) {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "store init error");
                InitStatus::Failure
            }
        }
    }

    fn run_init(&mut self, target: &InitTarget) -> Result<InitStatus> {
        if !self.conn.is_open() {
            match target {
                InitTarget::File(path) => self.conn.open(path)?,
                InitTarget::Memory => self.conn.open_in_memory()?,
            }
        }

        self.conn.begin_transaction()?;
        if self.conn.config().preload {
            self.conn.preload();
        }

        match self.init_schema() {
            Ok(InitStatus::Ok) => {
                self.conn.commit_transaction()?;
                Ok(InitStatus::Ok)
            }
            Ok(status) => {
                self.conn.rollback_transaction()?;
                Ok(status)
            }
            Err(e) => {
                if let Err(rollback) = self.conn.rollback_transaction() {
                    warn!(error = %rollback, "rollback after failed init");
                }
                Err(e)
            }
        }
    }

    fn init_schema(&self) -> Result<InitStatus> {
        let schema = self.schema;
        let stored = MetaTable::read(&self.conn)?;

        let status = MetaTable::init(
            &self.conn,
            schema.current_version,
            schema.compatible_version,
        )?;
        if !status.is_ok() {
            return Ok(status);
        }

        if let Some(stored) = stored {
            if stored.current < schema.deprecated_version {
                warn!(
                    stored_version = stored.current,
                    deprecated_version = schema.deprecated_version,
                    "database too old to migrate"
                );
                return Ok(InitStatus::TooOld);
            }
            if stored.current < schema.current_version {
                info!(
                    from = stored.current,
                    to = schema.current_version,
                    "migrating schema"
                );
                for module in &self.modules {
                    module.migrate_to_version(&self.conn, stored.current, schema.current_version)?;
                }
                MetaTable::set_version(
                    &self.conn,
                    schema.current_version,
                    schema.compatible_version,
                )?;
            }
        }

        for module in &self.modules {
            module.create_table_if_needed(&self.conn)?;
            debug!(module = module.name(), "table ready");
        }
        Ok(InitStatus::Ok)
    }

    /// Lock the file against every other process for the rest of the
    /// connection's life. Allowed once, in `Ready`.
    #[instrument(skip_all)]
    pub fn begin_exclusive_mode(&mut self) -> Result<()> {
        self.require_ready()?;
        if self.exclusive {
            return Err(programmer_error("store is already in exclusive mode"));
        }
        self.conn.set_locking_mode(LockingMode::Exclusive)?;
        self.exclusive = true;
        Ok(())
    }

    /// Whether the connection holds the file in exclusive locking mode.
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Roll back any open transaction and close the connection.
    #[instrument(skip_all)]
    pub fn close(&mut self) -> Result<()> {
        let result = self.conn.close();
        self.state = StoreState::Closed;
        self.exclusive = false;
        result
    }

    // ── Transactions ────────────────────────────────────────────────────

    /// Begin a (possibly nested) transaction.
    pub fn begin_transaction(&mut self) -> Result<()> {
        self.require_ready()?;
        self.conn.begin_transaction()
    }

    /// Commit one nesting level. The outermost commit reports
    /// [`StoreError::TransactionRolledBack`] if an inner level rolled back.
    pub fn commit_transaction(&mut self) -> Result<()> {
        self.require_ready()?;
        self.conn.commit_transaction()
    }

    /// Roll back the whole outer transaction. A no-op with none open.
    pub fn rollback_transaction(&mut self) -> Result<()> {
        if self.state != StoreState::Ready {
            return Ok(());
        }
        self.conn.rollback_transaction()
    }

    /// Run `f` in a transaction: commit on `Ok`, roll back on `Err`.
    pub fn with_transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&ConnectionHandle) -> Result<T>,
    {
        self.begin_transaction()?;
        match f(&self.conn) {
            Ok(value) => {
                self.commit_transaction()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.rollback_transaction() {
                    warn!(error = %rollback, "rollback after failed transaction body");
                }
                Err(e)
            }
        }
    }

    /// Depth of unmatched `begin_transaction` calls.
    pub fn transaction_nesting(&self) -> usize {
        self.conn.transaction_nesting()
    }

    /// Open a savepoint inside the current transaction.
    pub fn begin_savepoint(&mut self, name: &str) -> Result<()> {
        self.require_ready()?;
        self.conn.savepoint(name)
    }

    /// Keep the changes made since the savepoint and close it.
    pub fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.require_ready()?;
        self.conn.release_savepoint(name)
    }

    /// Discard the changes made since the savepoint and close it.
    pub fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.require_ready()?;
        self.conn.rollback_to_savepoint(name)
    }

    // ── Maintenance ─────────────────────────────────────────────────────

    /// Reclaim free pages. Not allowed inside a transaction.
    #[instrument(skip_all)]
    pub fn vacuum(&mut self) -> Result<()> {
        self.require_ready()?;
        self.conn.vacuum()
    }

    /// Release cache memory. Does nothing unless the store is ready.
    pub fn trim_memory(&self, aggressively: bool) {
        if self.state == StoreState::Ready {
            self.conn.trim_memory(aggressively);
        }
    }

    /// Wipe the database back to an empty file and close the store.
    ///
    /// Version metadata is gone afterwards; the next `init` starts from a
    /// fresh file. Allowed in `Ready` (outside a transaction) and `Failed`.
    #[instrument(skip_all)]
    pub fn raze(&mut self) -> Result<bool> {
        if !matches!(self.state, StoreState::Ready | StoreState::Failed) {
            return Err(programmer_error(&format!(
                "raze called in state {:?}",
                self.state
            )));
        }
        let razed = self.conn.raze()?;
        self.conn.close()?;
        self.state = StoreState::Closed;
        self.exclusive = false;
        Ok(razed)
    }

    // ── Diagnostics ─────────────────────────────────────────────────────

    /// Plain-text report for an engine failure, for crash triage.
    ///
    /// Never fails. Corruption-class errors add a `quick_check` summary.
    pub fn get_diagnostic_info(&self, extended_error: i32, statement: Option<&str>) -> String {
        let header = [
            ("state", format!("{:?}", self.state)),
            (
                "path",
                self.conn
                    .path()
                    .map_or_else(|| ":memory:".to_owned(), |p| p.display().to_string()),
            ),
            (
                "schema",
                format!(
                    "current {} compatible {} deprecated {}",
                    self.schema.current_version,
                    self.schema.compatible_version,
                    self.schema.deprecated_version
                ),
            ),
            ("modules", self.module_names().join(", ")),
            ("transaction_nesting", self.conn.transaction_nesting().to_string()),
        ];
        diagnostic_report(&self.conn, &header, extended_error, statement)
    }

    /// File size, page counts and per-module row counts.
    pub fn compute_database_metrics(&self) -> Result<DatabaseMetrics> {
        self.require_ready()?;
        compute_metrics(&self.conn, self.modules.iter().map(|m| m.name()))
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// Current lifecycle state.
    pub fn state(&self) -> StoreState {
        self.state
    }

    /// Schema versions the store was built for.
    pub fn schema(&self) -> SchemaSpec {
        self.schema
    }

    /// Path of the database file, once `init` has been called with one.
    pub fn path(&self) -> Option<&Path> {
        self.conn.path()
    }

    /// The shared connection for table module CRUD. `Ready` only.
    pub fn connection(&self) -> Result<&ConnectionHandle> {
        self.require_ready()?;
        Ok(&self.conn)
    }

    fn module_names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    fn require_ready(&self) -> Result<()> {
        if self.state == StoreState::Ready {
            Ok(())
        } else {
            Err(StoreError::invalid_state(format!(
                "store is {:?}, not Ready",
                self.state
            )))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
