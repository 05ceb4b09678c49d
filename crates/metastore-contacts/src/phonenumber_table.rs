//! `phone_numbers` table.

use metastore::row_helpers::now_millis;
use metastore::{ConnectionHandle, Result, TableModule};
use rusqlite::params;

use crate::types::{ContactId, PhoneNumberId, PhoneNumberRow};

/// The `phone_numbers` table module and its CRUD operations.
pub struct PhoneNumberTable;

impl TableModule for PhoneNumberTable {
    fn name(&self) -> &'static str {
        "phone_numbers"
    }

    fn create_table_if_needed(&self, conn: &ConnectionHandle) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS phone_numbers (
                phonenumber_id INTEGER PRIMARY KEY AUTOINCREMENT,
                contact_id INTEGER,
                phonenumber LONGVARCHAR,
                type LONGVARCHAR,
                is_default INTEGER,
                created INTEGER,
                last_modified INTEGER
            );
            CREATE INDEX IF NOT EXISTS phone_numbers_contact_id
                ON phone_numbers(contact_id);",
        )
    }

    fn migrate_to_version(&self, _: &ConnectionHandle, _: u32, _: u32) -> Result<()> {
        Ok(())
    }
}

impl PhoneNumberTable {
    /// Insert a number. Returns the new id.
    pub fn add(conn: &ConnectionHandle, row: &PhoneNumberRow) -> Result<PhoneNumberId> {
        let now = now_millis();
        let _ = conn.execute(
            "INSERT INTO phone_numbers
                 (contact_id, phonenumber, type, is_default, created, last_modified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.contact_id,
                row.phonenumber,
                row.phone_type,
                row.is_default,
                now,
                now
            ],
        )?;
        conn.last_insert_rowid()
    }

    /// Rewrite a number, matched on both its id and its contact.
    pub fn update(conn: &ConnectionHandle, row: &PhoneNumberRow) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE phone_numbers
             SET phonenumber = ?1, type = ?2, is_default = ?3, last_modified = ?4
             WHERE phonenumber_id = ?5 AND contact_id = ?6",
            params![
                row.phonenumber,
                row.phone_type,
                row.is_default,
                now_millis(),
                row.phonenumber_id,
                row.contact_id
            ],
        )?;
        Ok(changed > 0)
    }

    /// Delete one number of a contact.
    pub fn delete(
        conn: &ConnectionHandle,
        phonenumber_id: PhoneNumberId,
        contact_id: ContactId,
    ) -> Result<bool> {
        let changed = conn.execute(
            "DELETE FROM phone_numbers WHERE phonenumber_id = ?1 AND contact_id = ?2",
            params![phonenumber_id, contact_id],
        )?;
        Ok(changed > 0)
    }

    /// Delete every number of a contact. Returns the number removed.
    pub fn delete_for_contact(conn: &ConnectionHandle, contact_id: ContactId) -> Result<usize> {
        conn.execute("DELETE FROM phone_numbers WHERE contact_id = ?1", [contact_id])
    }

    /// Numbers of one contact, in insertion order.
    pub fn for_contact(
        conn: &ConnectionHandle,
        contact_id: ContactId,
    ) -> Result<Vec<PhoneNumberRow>> {
        conn.query_rows(
            "SELECT phonenumber_id, contact_id, phonenumber, type, is_default
             FROM phone_numbers WHERE contact_id = ?1 ORDER BY phonenumber_id",
            [contact_id],
            |row| {
                Ok(PhoneNumberRow {
                    phonenumber_id: row.get(0)?,
                    contact_id: row.get::<_, Option<i64>>(1)?.unwrap_or_default(),
                    phonenumber: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    phone_type: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    is_default: row.get::<_, Option<bool>>(4)?.unwrap_or(false),
                })
            },
        )
    }
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use metastore::StoreConfig;

    use super::*;

    fn setup() -> ConnectionHandle {
        let mut conn = ConnectionHandle::new(StoreConfig::default());
        conn.open_in_memory().unwrap();
        PhoneNumberTable.create_table_if_needed(&conn).unwrap();
        conn
    }

    fn number(contact_id: ContactId, digits: &str) -> PhoneNumberRow {
        PhoneNumberRow {
            contact_id,
            phonenumber: digits.into(),
            phone_type: "mobile".into(),
            ..PhoneNumberRow::default()
        }
    }

    #[test]
    fn crud_cycle() {
        let conn = setup();
        let id = PhoneNumberTable::add(&conn, &number(3, "+47 555 0100")).unwrap();
        assert_eq!(
            PhoneNumberTable::for_contact(&conn, 3).unwrap(),
            vec![PhoneNumberRow {
                phonenumber_id: id,
                ..number(3, "+47 555 0100")
            }]
        );

        let changed = PhoneNumberRow {
            phonenumber_id: id,
            is_default: true,
            ..number(3, "+47 555 0199")
        };
        assert!(PhoneNumberTable::update(&conn, &changed).unwrap());
        assert_eq!(PhoneNumberTable::for_contact(&conn, 3).unwrap(), vec![changed]);

        assert!(!PhoneNumberTable::delete(&conn, id, 4).unwrap());
        assert!(PhoneNumberTable::delete(&conn, id, 3).unwrap());
        assert!(PhoneNumberTable::for_contact(&conn, 3).unwrap().is_empty());
    }

    #[test]
    fn delete_for_contact_leaves_others() {
        let conn = setup();
        PhoneNumberTable::add(&conn, &number(1, "1")).unwrap();
        PhoneNumberTable::add(&conn, &number(1, "2")).unwrap();
        PhoneNumberTable::add(&conn, &number(2, "3")).unwrap();
        assert_eq!(PhoneNumberTable::delete_for_contact(&conn, 1).unwrap(), 2);
        assert_eq!(PhoneNumberTable::for_contact(&conn, 2).unwrap().len(), 1);
    }
}
