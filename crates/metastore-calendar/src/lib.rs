//! # metastore-calendar
//!
//! Calendar database on top of the `metastore` transactional store.
//!
//! - **Tables**: `calendars`, `events`, `recurrences`
//! - **Schema**: version 2, not readable by version 1; v2 moves every event
//!   into a calendar
//! - **Database**: `CalendarDatabase` adds the operations that span tables

#![deny(unsafe_code)]

pub mod calendar_table;
pub mod database;
pub mod event_table;
pub mod recurrence_table;
pub mod types;

pub use calendar_table::{CalendarTable, DEFAULT_CALENDAR_NAME};
pub use database::{COMPATIBLE_VERSION, CURRENT_VERSION, CalendarDatabase};
pub use event_table::EventTable;
pub use recurrence_table::RecurrenceTable;
pub use types::{
    CalendarId, CalendarRow, EventId, EventRow, EventWithRecurrence, Frequency,
    ParseFrequencyError, RecurrenceId, RecurrenceRow,
};
