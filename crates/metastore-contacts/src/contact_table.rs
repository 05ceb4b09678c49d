//! `contacts` table: one row per person (or list separator).

use metastore::row_helpers::{format_date, now_millis, parse_date};
use metastore::{
    ConnectionHandle, MigrationStep, Result, TableModule, add_column_if_missing,
    run_migration_steps,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter};

use crate::types::{ContactFields, ContactId, ContactRow};

const SELECT_COLUMNS: &str = "SELECT contact_id, name, birthday, note, avatar_url, separator,
        generated_from_sent_mail
     FROM contacts";

fn add_generated_from_sent_mail(conn: &ConnectionHandle) -> Result<()> {
    let _ = add_column_if_missing(
        conn,
        "contacts",
        "generated_from_sent_mail",
        "INTEGER DEFAULT 0",
    )?;
    let _ = conn.execute(
        "UPDATE contacts SET generated_from_sent_mail = 0 WHERE generated_from_sent_mail IS NULL",
        [],
    )?;
    Ok(())
}

const MIGRATIONS: &[MigrationStep] = &[MigrationStep {
    version: 2,
    description: "generated_from_sent_mail flag",
    apply: add_generated_from_sent_mail,
}];

/// The `contacts` table module and its CRUD operations.
pub struct ContactTable;

impl TableModule for ContactTable {
    fn name(&self) -> &'static str {
        "contacts"
    }

    fn create_table_if_needed(&self, conn: &ConnectionHandle) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS contacts (
                contact_id INTEGER PRIMARY KEY AUTOINCREMENT,
                name LONGVARCHAR,
                birthday LONGVARCHAR,
                note LONGVARCHAR,
                avatar_url LONGVARCHAR,
                separator INTEGER DEFAULT 0,
                generated_from_sent_mail INTEGER DEFAULT 0,
                created INTEGER,
                last_modified INTEGER
            )",
        )
    }

    fn migrate_to_version(&self, conn: &ConnectionHandle, from: u32, to: u32) -> Result<()> {
        if !conn.does_table_exist("contacts")? {
            return Ok(());
        }
        let _ = run_migration_steps(conn, self.name(), MIGRATIONS, from, to)?;
        Ok(())
    }
}

impl ContactTable {
    /// Insert a contact. `row.contact_id` is ignored; returns the new id.
    pub fn add(conn: &ConnectionHandle, row: &ContactRow) -> Result<ContactId> {
        let now = now_millis();
        let _ = conn.execute(
            "INSERT INTO contacts (name, birthday, note, avatar_url, separator,
                 generated_from_sent_mail, created, last_modified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                row.name,
                format_date(row.birthday),
                row.note,
                row.avatar_url,
                row.separator,
                row.generated_from_sent_mail,
                now,
                now
            ],
        )?;
        conn.last_insert_rowid()
    }

    /// Fetch one contact.
    pub fn get(conn: &ConnectionHandle, contact_id: ContactId) -> Result<Option<ContactRow>> {
        conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE contact_id = ?1"),
            [contact_id],
            Self::map_row,
        )
    }

    /// Every contact, ordered by id.
    pub fn list(conn: &ConnectionHandle) -> Result<Vec<ContactRow>> {
        conn.query_rows(
            &format!("{SELECT_COLUMNS} ORDER BY contact_id"),
            [],
            Self::map_row,
        )
    }

    /// Write the fields selected by `fields` from `row` to the contact with
    /// `row.contact_id`. Returns whether a row was updated.
    pub fn update(conn: &ConnectionHandle, row: &ContactRow, fields: ContactFields) -> Result<bool> {
        if fields.is_empty() {
            return Ok(false);
        }

        let mut columns: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        let mut set = |column, value| {
            columns.push(column);
            values.push(value);
        };
        if fields.contains(ContactFields::NAME) {
            set("name", Value::Text(row.name.clone()));
        }
        if fields.contains(ContactFields::BIRTHDAY) {
            set(
                "birthday",
                format_date(row.birthday).map_or(Value::Null, Value::Text),
            );
        }
        if fields.contains(ContactFields::NOTE) {
            set("note", Value::Text(row.note.clone()));
        }
        if fields.contains(ContactFields::AVATAR_URL) {
            set("avatar_url", Value::Text(row.avatar_url.clone()));
        }
        if fields.contains(ContactFields::SEPARATOR) {
            set("separator", Value::Integer(i64::from(row.separator)));
        }
        if fields.contains(ContactFields::GENERATED_FROM_SENT_MAIL) {
            set(
                "generated_from_sent_mail",
                Value::Integer(i64::from(row.generated_from_sent_mail)),
            );
        }
        set("last_modified", Value::Integer(now_millis()));

        let assignments = columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{column} = ?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        values.push(Value::Integer(row.contact_id));
        let sql = format!(
            "UPDATE contacts SET {assignments} WHERE contact_id = ?{}",
            values.len()
        );
        let changed = conn.execute(&sql, params_from_iter(values))?;
        Ok(changed > 0)
    }

    /// Delete the contact row only. Returns whether it existed.
    pub fn delete(conn: &ConnectionHandle, contact_id: ContactId) -> Result<bool> {
        let changed = conn.execute("DELETE FROM contacts WHERE contact_id = ?1", [contact_id])?;
        Ok(changed > 0)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContactRow> {
        Ok(ContactRow {
            contact_id: row.get(0)?,
            name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            birthday: parse_date(2, row.get(2)?)?,
            note: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            avatar_url: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            separator: row.get::<_, Option<bool>>(5)?.unwrap_or(false),
            generated_from_sent_mail: row.get::<_, Option<bool>>(6)?.unwrap_or(false),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
