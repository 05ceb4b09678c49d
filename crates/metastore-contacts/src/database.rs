//! [`ContactDatabase`]: the contact store and its cross-table operations.
//!
//! Lifecycle, transactions and maintenance come from the wrapped
//! [`MetadataStore`] (reachable through `Deref`). Single-table CRUD lives on
//! the table modules; this type adds the operations that span tables.

use std::ops::{Deref, DerefMut};

use metastore::{MetadataStore, Result, SchemaSpec, StoreConfig, StoreError};
use tracing::debug;

use crate::contact_table::ContactTable;
use crate::email_table::EmailTable;
use crate::phonenumber_table::PhoneNumberTable;
use crate::types::{ContactFields, ContactId, ContactRow, ContactWithProperties};

/// Schema version this crate writes.
pub const CURRENT_VERSION: u32 = 2;
/// Oldest schema version that can read files this crate writes.
pub const COMPATIBLE_VERSION: u32 = 1;

/// The contact database.
#[derive(Debug)]
pub struct ContactDatabase {
    store: MetadataStore,
}

impl ContactDatabase {
    /// Schema versions of the contact database.
    pub const fn schema() -> SchemaSpec {
        SchemaSpec::new(CURRENT_VERSION, COMPATIBLE_VERSION)
    }

    /// An uninitialized contact database; call `init` next.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            store: MetadataStore::new(
                Self::schema(),
                vec![
                    Box::new(ContactTable),
                    Box::new(EmailTable),
                    Box::new(PhoneNumberTable),
                ],
                config,
            ),
        }
    }

    /// A contact with its email addresses and phone numbers.
    pub fn get_contact_with_properties(
        &self,
        contact_id: ContactId,
    ) -> Result<Option<ContactWithProperties>> {
        let conn = self.store.connection()?;
        let Some(contact) = ContactTable::get(conn, contact_id)? else {
            return Ok(None);
        };
        Ok(Some(ContactWithProperties {
            contact,
            emails: EmailTable::for_contact(conn, contact_id)?,
            phones: PhoneNumberTable::for_contact(conn, contact_id)?,
        }))
    }

    /// Every contact with its properties, ordered by id.
    pub fn all_contacts_with_properties(&self) -> Result<Vec<ContactWithProperties>> {
        let conn = self.store.connection()?;
        ContactTable::list(conn)?
            .into_iter()
            .map(|contact| {
                let id = contact.contact_id;
                Ok(ContactWithProperties {
                    contact,
                    emails: EmailTable::for_contact(conn, id)?,
                    phones: PhoneNumberTable::for_contact(conn, id)?,
                })
            })
            .collect()
    }

    /// Write the masked fields of `row` in a transaction of its own.
    ///
    /// A contact that does not exist is [`StoreError::NotFound`].
    pub fn update_contact(&mut self, row: &ContactRow, fields: ContactFields) -> Result<()> {
        let contact_id = row.contact_id;
        let updated = self
            .store
            .with_transaction(|conn| ContactTable::update(conn, row, fields))?;
        if updated || (fields.is_empty() && self.contact_exists(contact_id)?) {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("contact {contact_id}")))
        }
    }

    fn contact_exists(&self, contact_id: ContactId) -> Result<bool> {
        Ok(ContactTable::get(self.store.connection()?, contact_id)?.is_some())
    }

    /// Delete a contact and every row that belongs to it.
    ///
    /// Runs in a transaction, nested inside the caller's if one is open.
    /// Returns whether the contact existed.
    pub fn delete_contact(&mut self, contact_id: ContactId) -> Result<bool> {
        self.store.with_transaction(|conn| {
            let emails = EmailTable::delete_for_contact(conn, contact_id)?;
            let phones = PhoneNumberTable::delete_for_contact(conn, contact_id)?;
            let existed = ContactTable::delete(conn, contact_id)?;
            debug!(contact_id, emails, phones, existed, "deleted contact");
            Ok(existed)
        })
    }

    /// The wrapped store.
    pub fn store(&self) -> &MetadataStore {
        &self.store
    }
}

impl Deref for ContactDatabase {
    type Target = MetadataStore;

    fn deref(&self) -> &MetadataStore {
        &self.store
    }
}

impl DerefMut for ContactDatabase {
    fn deref_mut(&mut self) -> &mut MetadataStore {
        &mut self.store
    }
}
