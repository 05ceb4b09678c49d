//! # metastore-contacts
//!
//! Contact database on top of the `metastore` transactional store.
//!
//! - **Tables**: `contacts`, `email_addresses`, `phone_numbers`, one module each
//! - **Schema**: version 2, readable back to version 1; v2 adds `generated_from_sent_mail`
//! - **Database**: `ContactDatabase` wires the modules into one store and adds cross-table operations

#![deny(unsafe_code)]

pub mod contact_table;
pub mod database;
pub mod email_table;
pub mod phonenumber_table;
pub mod types;

pub use contact_table::ContactTable;
pub use database::{COMPATIBLE_VERSION, CURRENT_VERSION, ContactDatabase};
pub use email_table::EmailTable;
pub use phonenumber_table::PhoneNumberTable;
pub use types::{
    ContactFields, ContactId, ContactRow, ContactWithProperties, EmailAddressId, EmailAddressRow,
    PhoneNumberId, PhoneNumberRow,
};
