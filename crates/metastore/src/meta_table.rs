//! Schema version bookkeeping in the `meta` key/value table.
//!
//! The table layout is fixed so files stay readable across releases:
//!
//! ```sql
//! CREATE TABLE meta (key LONGVARCHAR NOT NULL UNIQUE PRIMARY KEY, value LONGVARCHAR)
//! ```
//!
//! Two keys are reserved: `version` is the schema version that last wrote the
//! file, `last_compatible_version` the oldest version that can still read it.
//! Other keys are free for table modules to use.

use tracing::{debug, info, warn};

use crate::connection::ConnectionHandle;
use crate::errors::{InitStatus, Result, StoreError};

/// Name of the key/value table.
pub const META_TABLE_NAME: &str = "meta";

const VERSION_KEY: &str = "version";
const COMPATIBLE_VERSION_KEY: &str = "last_compatible_version";

/// Schema version pair persisted in the meta table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchemaVersion {
    /// Version that last wrote the file.
    pub current: u32,
    /// Oldest version able to read the file.
    pub compatible: u32,
}

/// Stateless accessor for the meta table; every call takes the connection.
pub struct MetaTable;

impl MetaTable {
    /// Whether the meta table exists.
    pub fn does_exist(conn: &ConnectionHandle) -> Result<bool> {
        conn.does_table_exist(META_TABLE_NAME)
    }

    /// Create the meta table on first run, or check the stored versions.
    ///
    /// A fresh file gets `expected_current` / `compatible` written. An
    /// existing file whose compatible version is newer than
    /// `expected_current` yields [`InitStatus::TooNew`] and nothing is
    /// written. Older files are left alone; migrating them is the caller's
    /// job.
    pub fn init(
        conn: &ConnectionHandle,
        expected_current: u32,
        compatible: u32,
    ) -> Result<InitStatus> {
        if compatible > expected_current {
            return Err(StoreError::invalid_state(format!(
                "compatible version {compatible} is newer than current version {expected_current}"
            )));
        }

        if !Self::does_exist(conn)? {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS meta (
                    key LONGVARCHAR NOT NULL UNIQUE PRIMARY KEY,
                    value LONGVARCHAR
                )",
            )?;
            debug!("created meta table");
        }

        let Some(stored) = Self::read(conn)? else {
            Self::write_versions(conn, expected_current, compatible)?;
            info!(
                version = expected_current,
                compatible, "initialized schema version"
            );
            return Ok(InitStatus::Ok);
        };

        if stored.compatible > expected_current {
            warn!(
                stored_version = stored.current,
                stored_compatible = stored.compatible,
                expected_current,
                "database written by a newer, incompatible schema"
            );
            return Ok(InitStatus::TooNew);
        }
        Ok(InitStatus::Ok)
    }

    /// Stored version pair, or `None` if the version row is missing.
    pub fn read(conn: &ConnectionHandle) -> Result<Option<SchemaVersion>> {
        if !Self::does_exist(conn)? {
            return Ok(None);
        }
        let Some(current) = Self::get_integer(conn, VERSION_KEY)? else {
            return Ok(None);
        };
        let compatible = Self::get_integer(conn, COMPATIBLE_VERSION_KEY)?.unwrap_or(current);
        Ok(Some(SchemaVersion {
            current: to_version(current)?,
            compatible: to_version(compatible)?,
        }))
    }

    /// Stored schema version; 0 when none is recorded.
    pub fn version(conn: &ConnectionHandle) -> Result<u32> {
        Ok(Self::read(conn)?.map_or(0, |v| v.current))
    }

    /// Stored compatible version; 0 when none is recorded.
    pub fn compatible_version(conn: &ConnectionHandle) -> Result<u32> {
        Ok(Self::read(conn)?.map_or(0, |v| v.compatible))
    }

    /// Record a new version pair. Only allowed inside a transaction.
    pub fn set_version(conn: &ConnectionHandle, current: u32, compatible: u32) -> Result<()> {
        if conn.transaction_nesting() == 0 {
            return Err(StoreError::invalid_state(
                "schema version may only change inside a transaction",
            ));
        }
        if compatible > current {
            return Err(StoreError::invalid_state(format!(
                "compatible version {compatible} is newer than current version {current}"
            )));
        }
        Self::write_versions(conn, current, compatible)?;
        info!(version = current, compatible, "schema version updated");
        Ok(())
    }

    fn write_versions(conn: &ConnectionHandle, current: u32, compatible: u32) -> Result<()> {
        Self::set_integer(conn, VERSION_KEY, i64::from(current))?;
        Self::set_integer(conn, COMPATIBLE_VERSION_KEY, i64::from(compatible))
    }

    // ── General key/value access ────────────────────────────────────────

    /// Text value stored under `key`.
    pub fn get_value(conn: &ConnectionHandle, key: &str) -> Result<Option<String>> {
        let value = conn.query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
            row.get::<_, Option<String>>(0)
        })?;
        Ok(value.flatten())
    }

    /// Integer value stored under `key`.
    pub fn get_integer(conn: &ConnectionHandle, key: &str) -> Result<Option<i64>> {
        // The column has text affinity, so integers come back as text.
        let value = conn.query_row(
            "SELECT CAST(value AS INTEGER) FROM meta WHERE key = ?1",
            [key],
            |row| row.get::<_, Option<i64>>(0),
        )?;
        Ok(value.flatten())
    }

    /// Store a text value, replacing any previous one.
    pub fn set_value(conn: &ConnectionHandle, key: &str, value: &str) -> Result<()> {
        let _ = conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    /// Store an integer value, replacing any previous one.
    pub fn set_integer(conn: &ConnectionHandle, key: &str, value: i64) -> Result<()> {
        let _ = conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    /// Remove `key`. Returns whether a row was deleted.
    pub fn delete_key(conn: &ConnectionHandle, key: &str) -> Result<bool> {
        let changed = conn.execute("DELETE FROM meta WHERE key = ?1", [key])?;
        Ok(changed > 0)
    }
}

fn to_version(raw: i64) -> Result<u32> {
    u32::try_from(raw)
        .map_err(|_| StoreError::invalid_state(format!("stored schema version {raw} is out of range")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
