//! Row types for the contact tables.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Primary key of a contact.
pub type ContactId = i64;
/// Primary key of an email address row.
pub type EmailAddressId = i64;
/// Primary key of a phone number row.
pub type PhoneNumberId = i64;

/// A contact as stored in the `contacts` table.
///
/// `contact_id` is 0 until the row has been inserted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRow {
    /// Primary key.
    pub contact_id: ContactId,
    /// Display name.
    pub name: String,
    /// Birthday, if known.
    pub birthday: Option<NaiveDate>,
    /// Free-form note.
    pub note: String,
    /// Avatar image URL.
    pub avatar_url: String,
    /// Whether the row is a list separator rather than a person.
    pub separator: bool,
    /// Whether the contact was harvested from sent mail.
    pub generated_from_sent_mail: bool,
}

impl ContactRow {
    /// A new, unsaved contact with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

bitflags::bitflags! {
    /// Which contact fields an update writes.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ContactFields: u32 {
        /// `name`.
        const NAME = 1 << 1;
        /// `birthday`.
        const BIRTHDAY = 1 << 2;
        /// `note`.
        const NOTE = 1 << 3;
        /// `avatar_url`.
        const AVATAR_URL = 1 << 4;
        /// `separator`.
        const SEPARATOR = 1 << 5;
        /// `generated_from_sent_mail`.
        const GENERATED_FROM_SENT_MAIL = 1 << 6;
    }
}

impl ContactFields {
    /// No fields.
    pub const NONE: Self = Self::empty();
    /// Every updatable field.
    pub const ALL: Self = Self::all();
}

/// A row of the `email_addresses` table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddressRow {
    /// Primary key; 0 until inserted.
    pub email_address_id: EmailAddressId,
    /// Owning contact.
    pub contact_id: ContactId,
    /// The address itself.
    pub email: String,
    /// Free-form label such as `"work"`.
    pub email_type: String,
    /// Whether the address has been confirmed by the user.
    pub trusted: bool,
    /// Whether this is the contact's preferred address.
    pub is_default: bool,
    /// Whether the address is known to be dead.
    pub obsolete: bool,
}

/// A row of the `phone_numbers` table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneNumberRow {
    /// Primary key; 0 until inserted.
    pub phonenumber_id: PhoneNumberId,
    /// Owning contact.
    pub contact_id: ContactId,
    /// The number as entered.
    pub phonenumber: String,
    /// Free-form label such as `"mobile"`.
    pub phone_type: String,
    /// Whether this is the contact's preferred number.
    pub is_default: bool,
}

/// A contact together with all of its properties.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactWithProperties {
    /// The contact row.
    pub contact: ContactRow,
    /// Email addresses, in insertion order.
    pub emails: Vec<EmailAddressRow>,
    /// Phone numbers, in insertion order.
    pub phones: Vec<PhoneNumberRow>,
}
