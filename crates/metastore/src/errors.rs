//! Error types for the metadata store.
//!
//! [`StoreError`] is returned by every fallible operation in this crate and by
//! the table modules built on top of it. Engine failures are passed through
//! untouched in [`StoreError::Sqlite`] so callers can inspect the `SQLite`
//! result code; everything else is a small set of store-level conditions.
//!
//! [`InitStatus`] is deliberately *not* an error: a store that refuses to open
//! a newer schema is a normal outcome the owning feature must branch on.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors that can occur during metadata store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` engine error (constraint violation, I/O, corruption, busy...).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem error outside the engine (directory creation, truncation).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A schema migration step failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which step failed and why.
        message: String,
    },

    /// A row addressed by key does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The store was used in a way its lifecycle does not allow.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A configuration value is out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The outermost commit found the transaction poisoned by an inner
    /// rollback and rolled everything back instead.
    #[error("transaction rolled back by a nested rollback")]
    TransactionRolledBack,
}

impl StoreError {
    /// The primary `SQLite` result code, if this is an engine error.
    pub fn engine_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Sqlite(e) => e.sqlite_error_code(),
            _ => None,
        }
    }

    /// The extended `SQLite` result code, if this is an engine failure.
    pub fn extended_code(&self) -> Option<i32> {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => Some(e.extended_code),
            _ => None,
        }
    }

    /// Whether the engine reported the database file as damaged.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self.engine_code(),
            Some(ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase)
        )
    }

    /// Whether the engine reported a lock held by another connection.
    pub fn is_busy(&self) -> bool {
        matches!(
            self.engine_code(),
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        )
    }

    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Outcome of initializing a store against a database file.
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitStatus {
    /// The store is ready for use.
    Ok,
    /// The file was written by a newer schema this binary cannot read.
    TooNew,
    /// The file predates the oldest schema this binary can migrate from.
    TooOld,
    /// I/O error, corruption, or a failed migration.
    Failure,
}

impl InitStatus {
    /// Whether initialization succeeded.
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// Short classification string for logging.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::TooNew => "too_new",
            Self::TooOld => "too_old",
            Self::Failure => "failure",
        }
    }
}

impl std::fmt::Display for InitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
