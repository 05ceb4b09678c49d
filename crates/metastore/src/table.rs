//! The contract every logical table of a store implements.
//!
//! A [`TableModule`] knows its own DDL and how to bring an older file up to
//! the current schema. Modules never own a connection or open transactions:
//! the store hands them its [`ConnectionHandle`] inside the init transaction.
//!
//! Migrations are described as an ordered list of [`MigrationStep`]s and run
//! with [`run_migration_steps`]. Every step must be safe to run twice, so a
//! step that adds a column goes through [`add_column_if_missing`].

use tracing::{debug, info};

use crate::connection::ConnectionHandle;
use crate::errors::{Result, StoreError};

/// One logical table sharing the store's connection.
pub trait TableModule: Send {
    /// Name of the module's primary table.
    fn name(&self) -> &'static str;

    /// Create the table and its indices if they are missing.
    fn create_table_if_needed(&self, conn: &ConnectionHandle) -> Result<()>;

    /// Bring the table from schema version `from` up to `to`.
    ///
    /// Runs before [`create_table_if_needed`](Self::create_table_if_needed),
    /// so a module whose table does not exist yet should do nothing.
    fn migrate_to_version(&self, conn: &ConnectionHandle, from: u32, to: u32) -> Result<()>;
}

/// A single migration step introduced by schema `version`.
pub struct MigrationStep {
    /// Schema version the step brings the table to.
    pub version: u32,
    /// Human-readable summary for logs.
    pub description: &'static str,
    /// Applies the step. Must be idempotent.
    pub apply: fn(&ConnectionHandle) -> Result<()>,
}

/// Apply every step with `from < version <= to`, in list order.
///
/// Returns the number of steps applied. A failing step is reported as
/// [`StoreError::Migration`] naming the module and version.
pub fn run_migration_steps(
    conn: &ConnectionHandle,
    module: &str,
    steps: &[MigrationStep],
    from: u32,
    to: u32,
) -> Result<u32> {
    let mut applied = 0;
    for step in steps {
        if step.version <= from || step.version > to {
            debug!(
                module,
                version = step.version,
                description = step.description,
                "migration step not in range, skipping"
            );
            continue;
        }

        info!(
            module,
            version = step.version,
            description = step.description,
            "applying migration step"
        );
        (step.apply)(conn).map_err(|e| StoreError::Migration {
            message: format!(
                "{module} v{} ({}) failed: {e}",
                step.version, step.description
            ),
        })?;
        applied += 1;
    }
    Ok(applied)
}

/// Add `column` to `table` unless it is already there.
///
/// `definition` is everything after the column name, e.g.
/// `"INTEGER NOT NULL DEFAULT 0"`. Returns whether the column was added.
pub fn add_column_if_missing(
    conn: &ConnectionHandle,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<bool> {
    if conn.does_column_exist(table, column)? {
        return Ok(false);
    }
    conn.execute_batch(&format!(
        "ALTER TABLE {table} ADD COLUMN {column} {definition}"
    ))?;
    debug!(table, column, "added column");
    Ok(true)
}

/// Number of rows in `table`.
pub fn row_count(conn: &ConnectionHandle, table: &str) -> Result<u64> {
    let count: Option<i64> = conn.query_row(
        &format!("SELECT count(*) FROM \"{}\"", table.replace('"', "\"\"")),
        [],
        |row| row.get(0),
    )?;
    Ok(count.map_or(0, |n| u64::try_from(n).unwrap_or(0)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    fn memory() -> ConnectionHandle {
        let mut handle = ConnectionHandle::new(StoreConfig::default());
        handle.open_in_memory().unwrap();
        handle
            .execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)")
            .unwrap();
        handle
    }

    fn add_pinned(conn: &ConnectionHandle) -> Result<()> {
        add_column_if_missing(conn, "notes", "pinned", "INTEGER NOT NULL DEFAULT 0")?;
        Ok(())
    }

    fn add_archived(conn: &ConnectionHandle) -> Result<()> {
        add_column_if_missing(conn, "notes", "archived", "INTEGER")?;
        conn.execute("UPDATE notes SET archived = 0 WHERE archived IS NULL", [])?;
        Ok(())
    }

    fn broken(conn: &ConnectionHandle) -> Result<()> {
        conn.execute_batch("ALTER TABLE missing ADD COLUMN x INTEGER")
    }

    const STEPS: &[MigrationStep] = &[
        MigrationStep {
            version: 2,
            description: "pinned flag",
            apply: add_pinned,
        },
        MigrationStep {
            version: 3,
            description: "archived flag",
            apply: add_archived,
        },
    ];

    #[test]
    fn add_column_is_idempotent() {
        let conn = memory();
        assert!(add_column_if_missing(&conn, "notes", "pinned", "INTEGER").unwrap());
        assert!(!add_column_if_missing(&conn, "notes", "pinned", "INTEGER").unwrap());
        assert!(conn.does_column_exist("notes", "pinned").unwrap());
    }

    #[test]
    fn steps_in_range_are_applied() {
        let conn = memory();
        assert_eq!(run_migration_steps(&conn, "notes", STEPS, 1, 3).unwrap(), 2);
        assert!(conn.does_column_exist("notes", "pinned").unwrap());
        assert!(conn.does_column_exist("notes", "archived").unwrap());
    }

    #[test]
    fn steps_outside_range_are_skipped() {
        let conn = memory();
        assert_eq!(run_migration_steps(&conn, "notes", STEPS, 1, 2).unwrap(), 1);
        assert!(!conn.does_column_exist("notes", "archived").unwrap());
        assert_eq!(run_migration_steps(&conn, "notes", STEPS, 3, 3).unwrap(), 0);
    }

    #[test]
    fn rerunning_steps_is_harmless() {
        let conn = memory();
        conn.execute("INSERT INTO notes (body) VALUES ('a')", []).unwrap();
        run_migration_steps(&conn, "notes", STEPS, 1, 3).unwrap();
        run_migration_steps(&conn, "notes", STEPS, 1, 3).unwrap();
        let archived: Option<i64> = conn
            .query_row("SELECT archived FROM notes", [], |row| row.get(0))
            .unwrap()
            .unwrap();
        assert_eq!(archived, Some(0));
    }

    #[test]
    fn failing_step_names_module_and_version() {
        let conn = memory();
        let steps = [MigrationStep {
            version: 2,
            description: "broken",
            apply: broken,
        }];
        let err = run_migration_steps(&conn, "notes", &steps, 1, 2).unwrap_err();
        let message = match err {
            StoreError::Migration { message } => message,
            other => panic!("expected a migration error, got {other}"),
        };
        assert!(message.starts_with("notes v2 (broken) failed"), "{message}");
    }

    #[test]
    fn row_count_counts_rows() {
        let conn = memory();
        assert_eq!(row_count(&conn, "notes").unwrap(), 0);
        conn.execute("INSERT INTO notes (body) VALUES ('a'), ('b')", []).unwrap();
        assert_eq!(row_count(&conn, "notes").unwrap(), 2);
    }
}
