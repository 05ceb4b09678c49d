//! `email_addresses` table.

use metastore::row_helpers::now_millis;
use metastore::{ConnectionHandle, Result, TableModule};
use rusqlite::params;

use crate::types::{ContactId, EmailAddressId, EmailAddressRow};

const SELECT_COLUMNS: &str =
    "SELECT email_address_id, contact_id, email, type, trusted, is_default, obsolete
     FROM email_addresses";

/// The `email_addresses` table module and its CRUD operations.
pub struct EmailTable;

impl TableModule for EmailTable {
    fn name(&self) -> &'static str {
        "email_addresses"
    }

    fn create_table_if_needed(&self, conn: &ConnectionHandle) -> Result<()> {
        // AUTOINCREMENT: sync keys on the id, so ids of deleted rows must not come back.
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS email_addresses (
                email_address_id INTEGER PRIMARY KEY AUTOINCREMENT,
                contact_id INTEGER,
                email LONGVARCHAR,
                type LONGVARCHAR,
                trusted INTEGER,
                is_default INTEGER,
                obsolete INTEGER,
                created INTEGER,
                last_modified INTEGER
            );
            CREATE INDEX IF NOT EXISTS email_addresses_contact_id
                ON email_addresses(contact_id);",
        )
    }

    fn migrate_to_version(&self, _: &ConnectionHandle, _: u32, _: u32) -> Result<()> {
        Ok(())
    }
}

impl EmailTable {
    /// Insert an address. Returns the new id.
    pub fn add(conn: &ConnectionHandle, row: &EmailAddressRow) -> Result<EmailAddressId> {
        let now = now_millis();
        let _ = conn.execute(
            "INSERT INTO email_addresses
                 (contact_id, email, type, trusted, is_default, obsolete, created, last_modified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                row.contact_id,
                row.email,
                row.email_type,
                row.trusted,
                row.is_default,
                row.obsolete,
                now,
                now
            ],
        )?;
        conn.last_insert_rowid()
    }

    /// Rewrite an address, matched on both its id and its contact.
    pub fn update(conn: &ConnectionHandle, row: &EmailAddressRow) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE email_addresses
             SET email = ?1, type = ?2, trusted = ?3, is_default = ?4, obsolete = ?5,
                 last_modified = ?6
             WHERE email_address_id = ?7 AND contact_id = ?8",
            params![
                row.email,
                row.email_type,
                row.trusted,
                row.is_default,
                row.obsolete,
                now_millis(),
                row.email_address_id,
                row.contact_id
            ],
        )?;
        Ok(changed > 0)
    }

    /// Delete one address of a contact.
    pub fn delete(
        conn: &ConnectionHandle,
        email_address_id: EmailAddressId,
        contact_id: ContactId,
    ) -> Result<bool> {
        let changed = conn.execute(
            "DELETE FROM email_addresses WHERE email_address_id = ?1 AND contact_id = ?2",
            params![email_address_id, contact_id],
        )?;
        Ok(changed > 0)
    }

    /// Delete every address of a contact. Returns the number removed.
    pub fn delete_for_contact(conn: &ConnectionHandle, contact_id: ContactId) -> Result<usize> {
        conn.execute(
            "DELETE FROM email_addresses WHERE contact_id = ?1",
            [contact_id],
        )
    }

    /// Addresses of one contact, in insertion order.
    pub fn for_contact(
        conn: &ConnectionHandle,
        contact_id: ContactId,
    ) -> Result<Vec<EmailAddressRow>> {
        conn.query_rows(
            &format!("{SELECT_COLUMNS} WHERE contact_id = ?1 ORDER BY email_address_id"),
            [contact_id],
            Self::map_row,
        )
    }

    /// Every stored address.
    pub fn all(conn: &ConnectionHandle) -> Result<Vec<EmailAddressRow>> {
        conn.query_rows(
            &format!("{SELECT_COLUMNS} ORDER BY email_address_id"),
            [],
            Self::map_row,
        )
    }

    /// Whether the address id exists and belongs to the contact.
    pub fn does_exist(
        conn: &ConnectionHandle,
        email_address_id: EmailAddressId,
        contact_id: ContactId,
    ) -> Result<bool> {
        let found = conn.query_row(
            "SELECT 1 FROM email_addresses WHERE email_address_id = ?1 AND contact_id = ?2",
            params![email_address_id, contact_id],
            |_| Ok(()),
        )?;
        Ok(found.is_some())
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EmailAddressRow> {
        Ok(EmailAddressRow {
            email_address_id: row.get(0)?,
            contact_id: row.get::<_, Option<i64>>(1)?.unwrap_or_default(),
            email: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            email_type: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            trusted: row.get::<_, Option<bool>>(4)?.unwrap_or(false),
            is_default: row.get::<_, Option<bool>>(5)?.unwrap_or(false),
            obsolete: row.get::<_, Option<bool>>(6)?.unwrap_or(false),
        })
    }
}
