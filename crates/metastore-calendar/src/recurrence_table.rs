//! `recurrences` table: at most one repeat rule per event.

use metastore::row_helpers::{from_millis, to_millis};
use metastore::{ConnectionHandle, Result, TableModule};
use rusqlite::params;
use rusqlite::types::Type;

use crate::types::{EventId, Frequency, RecurrenceId, RecurrenceRow};

const SELECT_COLUMNS: &str =
    "SELECT id, event_id, frequency, interval, count, until FROM recurrences";

/// The `recurrences` table module and its CRUD operations.
pub struct RecurrenceTable;

impl TableModule for RecurrenceTable {
    fn name(&self) -> &'static str {
        "recurrences"
    }

    fn create_table_if_needed(&self, conn: &ConnectionHandle) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS recurrences (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id INTEGER NOT NULL UNIQUE,
                frequency LONGVARCHAR NOT NULL,
                interval INTEGER NOT NULL DEFAULT 1,
                count INTEGER,
                until INTEGER
            )",
        )
    }

    fn migrate_to_version(&self, _: &ConnectionHandle, _: u32, _: u32) -> Result<()> {
        Ok(())
    }
}

impl RecurrenceTable {
    /// Insert a rule. Fails with a constraint error if the event already
    /// has one.
    pub fn add(conn: &ConnectionHandle, row: &RecurrenceRow) -> Result<RecurrenceId> {
        let _ = conn.execute(
            "INSERT INTO recurrences (event_id, frequency, interval, count, until)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.event_id,
                row.frequency.as_str(),
                row.interval.max(1),
                row.count,
                row.until.map(to_millis)
            ],
        )?;
        conn.last_insert_rowid()
    }

    /// The rule of one event.
    pub fn for_event(conn: &ConnectionHandle, event_id: EventId) -> Result<Option<RecurrenceRow>> {
        conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE event_id = ?1"),
            [event_id],
            Self::map_row,
        )
    }

    /// Rewrite a rule. Returns whether it existed.
    pub fn update(conn: &ConnectionHandle, row: &RecurrenceRow) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE recurrences
             SET event_id = ?1, frequency = ?2, interval = ?3, count = ?4, until = ?5
             WHERE id = ?6",
            params![
                row.event_id,
                row.frequency.as_str(),
                row.interval.max(1),
                row.count,
                row.until.map(to_millis),
                row.id
            ],
        )?;
        Ok(changed > 0)
    }

    /// Delete one rule by id.
    pub fn delete(conn: &ConnectionHandle, id: RecurrenceId) -> Result<bool> {
        let changed = conn.execute("DELETE FROM recurrences WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }

    /// Delete the rule of one event, if it has one.
    pub fn delete_for_event(conn: &ConnectionHandle, event_id: EventId) -> Result<bool> {
        let changed = conn.execute("DELETE FROM recurrences WHERE event_id = ?1", [event_id])?;
        Ok(changed > 0)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecurrenceRow> {
        let frequency: String = row.get(2)?;
        let frequency = frequency.parse::<Frequency>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
        })?;
        Ok(RecurrenceRow {
            id: row.get(0)?,
            event_id: row.get(1)?,
            frequency,
            interval: row.get(3)?,
            count: row.get(4)?,
            until: row
                .get::<_, Option<i64>>(5)?
                .map(|ms| from_millis(5, ms))
                .transpose()?,
        })
    }
}
