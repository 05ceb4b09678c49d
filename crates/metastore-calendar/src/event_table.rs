//! `events` table.
//!
//! Times are Unix milliseconds. `end` is a keyword in SQL and is quoted
//! everywhere it appears.

use chrono::{DateTime, Utc};
use metastore::row_helpers::{from_millis, now_millis, to_millis};
use metastore::{
    ConnectionHandle, MigrationStep, Result, TableModule, add_column_if_missing,
    run_migration_steps,
};
use rusqlite::params;
use tracing::info;

use crate::calendar_table::{CalendarTable, DEFAULT_CALENDAR_NAME};
use crate::types::{CalendarId, CalendarRow, EventId, EventRow};

const SELECT_COLUMNS: &str =
    r#"SELECT id, calendar_id, title, description, start, "end", all_day FROM events"#;

/// Version 1 events belonged to no calendar. Give every orphan the oldest
/// calendar, creating one if the file has none.
fn assign_orphans_to_calendar(conn: &ConnectionHandle) -> Result<()> {
    let _ = add_column_if_missing(conn, "events", "calendar_id", "INTEGER")?;

    let orphans = conn
        .query_row(
            "SELECT COUNT(*) FROM events WHERE calendar_id IS NULL",
            [],
            |row| row.get::<_, i64>(0),
        )?
        .unwrap_or(0);
    if orphans == 0 {
        return Ok(());
    }

    CalendarTable.create_table_if_needed(conn)?;
    let calendar_id = match CalendarTable::first_id(conn)? {
        Some(id) => id,
        None => CalendarTable::add(conn, &CalendarRow::new(DEFAULT_CALENDAR_NAME))?,
    };
    let _ = conn.execute(
        "UPDATE events SET calendar_id = ?1 WHERE calendar_id IS NULL",
        [calendar_id],
    )?;
    info!(orphans, calendar_id, "assigned orphan events to calendar");
    Ok(())
}

const MIGRATIONS: &[MigrationStep] = &[MigrationStep {
    version: 2,
    description: "events belong to a calendar",
    apply: assign_orphans_to_calendar,
}];

/// The `events` table module and its CRUD operations.
pub struct EventTable;

impl TableModule for EventTable {
    fn name(&self) -> &'static str {
        "events"
    }

    fn create_table_if_needed(&self, conn: &ConnectionHandle) -> Result<()> {
        conn.execute_batch(
            r#"CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                calendar_id INTEGER,
                title LONGVARCHAR,
                description LONGVARCHAR,
                start INTEGER NOT NULL,
                "end" INTEGER NOT NULL,
                all_day INTEGER DEFAULT 0,
                created INTEGER,
                last_modified INTEGER
            );
            CREATE INDEX IF NOT EXISTS events_calendar_id_start
                ON events(calendar_id, start);"#,
        )
    }

    fn migrate_to_version(&self, conn: &ConnectionHandle, from: u32, to: u32) -> Result<()> {
        if !conn.does_table_exist("events")? {
            return Ok(());
        }
        let _ = run_migration_steps(conn, self.name(), MIGRATIONS, from, to)?;
        Ok(())
    }
}

impl EventTable {
    /// Insert an event. Returns the new id.
    pub fn add(conn: &ConnectionHandle, row: &EventRow) -> Result<EventId> {
        let now = now_millis();
        let _ = conn.execute(
            r#"INSERT INTO events
                 (calendar_id, title, description, start, "end", all_day, created, last_modified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                row.calendar_id,
                row.title,
                row.description,
                to_millis(row.start),
                to_millis(row.end),
                row.all_day,
                now,
                now
            ],
        )?;
        conn.last_insert_rowid()
    }

    /// Fetch one event.
    pub fn get(conn: &ConnectionHandle, id: EventId) -> Result<Option<EventRow>> {
        conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            [id],
            Self::map_row,
        )
    }

    /// Rewrite an event. Returns whether it existed.
    pub fn update(conn: &ConnectionHandle, row: &EventRow) -> Result<bool> {
        let changed = conn.execute(
            r#"UPDATE events
             SET calendar_id = ?1, title = ?2, description = ?3, start = ?4, "end" = ?5,
                 all_day = ?6, last_modified = ?7
             WHERE id = ?8"#,
            params![
                row.calendar_id,
                row.title,
                row.description,
                to_millis(row.start),
                to_millis(row.end),
                row.all_day,
                now_millis(),
                row.id
            ],
        )?;
        Ok(changed > 0)
    }

    /// Delete the event row only. Returns whether it existed.
    pub fn delete(conn: &ConnectionHandle, id: EventId) -> Result<bool> {
        let changed = conn.execute("DELETE FROM events WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }

    /// Events of one calendar, ordered by start.
    pub fn for_calendar(conn: &ConnectionHandle, calendar_id: CalendarId) -> Result<Vec<EventRow>> {
        conn.query_rows(
            &format!("{SELECT_COLUMNS} WHERE calendar_id = ?1 ORDER BY start, id"),
            [calendar_id],
            Self::map_row,
        )
    }

    /// Ids of the events of one calendar.
    pub fn ids_for_calendar(conn: &ConnectionHandle, calendar_id: CalendarId) -> Result<Vec<EventId>> {
        conn.query_rows(
            "SELECT id FROM events WHERE calendar_id = ?1",
            [calendar_id],
            |row| row.get(0),
        )
    }

    /// Events that start in `[start, end)`, across every calendar, ordered
    /// by start.
    pub fn in_range(
        conn: &ConnectionHandle,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EventRow>> {
        conn.query_rows(
            &format!("{SELECT_COLUMNS} WHERE start >= ?1 AND start < ?2 ORDER BY start, id"),
            params![to_millis(start), to_millis(end)],
            Self::map_row,
        )
    }

    /// Delete every event of one calendar. Returns the number removed.
    pub fn delete_for_calendar(conn: &ConnectionHandle, calendar_id: CalendarId) -> Result<usize> {
        conn.execute("DELETE FROM events WHERE calendar_id = ?1", [calendar_id])
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRow> {
        Ok(EventRow {
            id: row.get(0)?,
            calendar_id: row.get::<_, Option<i64>>(1)?.unwrap_or_default(),
            title: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            description: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            start: from_millis(4, row.get(4)?)?,
            end: from_millis(5, row.get(5)?)?,
            all_day: row.get::<_, Option<bool>>(6)?.unwrap_or(false),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
