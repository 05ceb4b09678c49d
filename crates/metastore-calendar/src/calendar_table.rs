//! `calendars` table.

use metastore::row_helpers::now_millis;
use metastore::{ConnectionHandle, Result, TableModule};
use rusqlite::params;

use crate::types::{CalendarId, CalendarRow};

/// Name given to the calendar created for events that had none.
pub const DEFAULT_CALENDAR_NAME: &str = "Default";

const SELECT_COLUMNS: &str = "SELECT id, name, description, color, hidden FROM calendars";

/// The `calendars` table module and its CRUD operations.
pub struct CalendarTable;

impl TableModule for CalendarTable {
    fn name(&self) -> &'static str {
        "calendars"
    }

    fn create_table_if_needed(&self, conn: &ConnectionHandle) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS calendars (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name LONGVARCHAR NOT NULL,
                description LONGVARCHAR,
                color LONGVARCHAR,
                hidden INTEGER DEFAULT 0,
                created INTEGER,
                last_modified INTEGER
            )",
        )
    }

    fn migrate_to_version(&self, _: &ConnectionHandle, _: u32, _: u32) -> Result<()> {
        Ok(())
    }
}

impl CalendarTable {
    /// Insert a calendar. Returns the new id.
    pub fn add(conn: &ConnectionHandle, row: &CalendarRow) -> Result<CalendarId> {
        let now = now_millis();
        let _ = conn.execute(
            "INSERT INTO calendars (name, description, color, hidden, created, last_modified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![row.name, row.description, row.color, row.hidden, now, now],
        )?;
        conn.last_insert_rowid()
    }

    /// Fetch one calendar.
    pub fn get(conn: &ConnectionHandle, id: CalendarId) -> Result<Option<CalendarRow>> {
        conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            [id],
            Self::map_row,
        )
    }

    /// Every calendar, ordered by id.
    pub fn list(conn: &ConnectionHandle) -> Result<Vec<CalendarRow>> {
        conn.query_rows(&format!("{SELECT_COLUMNS} ORDER BY id"), [], Self::map_row)
    }

    /// Rewrite a calendar. Returns whether it existed.
    pub fn update(conn: &ConnectionHandle, row: &CalendarRow) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE calendars
             SET name = ?1, description = ?2, color = ?3, hidden = ?4, last_modified = ?5
             WHERE id = ?6",
            params![
                row.name,
                row.description,
                row.color,
                row.hidden,
                now_millis(),
                row.id
            ],
        )?;
        Ok(changed > 0)
    }

    /// Delete the calendar row only. Returns whether it existed.
    pub fn delete(conn: &ConnectionHandle, id: CalendarId) -> Result<bool> {
        let changed = conn.execute("DELETE FROM calendars WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }

    /// Lowest calendar id, if any calendar exists.
    pub fn first_id(conn: &ConnectionHandle) -> Result<Option<CalendarId>> {
        let id = conn.query_row("SELECT MIN(id) FROM calendars", [], |row| {
            row.get::<_, Option<i64>>(0)
        })?;
        Ok(id.flatten())
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CalendarRow> {
        Ok(CalendarRow {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            color: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            hidden: row.get::<_, Option<bool>>(4)?.unwrap_or(false),
        })
    }
}
