//! [`CalendarDatabase`]: calendars, their events and recurrence rules in one
//! store.

use std::ops::{Deref, DerefMut};

use metastore::{MetadataStore, Result, SchemaSpec, StoreConfig, StoreError};
use tracing::debug;

use crate::calendar_table::CalendarTable;
use crate::event_table::EventTable;
use crate::recurrence_table::RecurrenceTable;
use crate::types::{CalendarId, EventId, EventRow, EventWithRecurrence, RecurrenceRow};

/// Schema version this crate writes.
pub const CURRENT_VERSION: u32 = 2;
/// Version 1 readers do not know events belong to calendars.
pub const COMPATIBLE_VERSION: u32 = 2;

/// The calendar database.
#[derive(Debug)]
pub struct CalendarDatabase {
    store: MetadataStore,
}

impl CalendarDatabase {
    /// Schema versions of the calendar database.
    pub const fn schema() -> SchemaSpec {
        SchemaSpec::new(CURRENT_VERSION, COMPATIBLE_VERSION)
    }

    /// An uninitialized calendar database; call `init` next.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            store: MetadataStore::new(
                Self::schema(),
                vec![
                    Box::new(CalendarTable),
                    Box::new(EventTable),
                    Box::new(RecurrenceTable),
                ],
                config,
            ),
        }
    }

    /// Insert an event and, if given, its recurrence rule, atomically.
    pub fn add_event(
        &mut self,
        event: &EventRow,
        recurrence: Option<&RecurrenceRow>,
    ) -> Result<EventId> {
        self.store.with_transaction(|conn| {
            let id = EventTable::add(conn, event)?;
            if let Some(rule) = recurrence {
                let rule = RecurrenceRow {
                    event_id: id,
                    ..rule.clone()
                };
                let _ = RecurrenceTable::add(conn, &rule)?;
            }
            Ok(id)
        })
    }

    /// An event with its recurrence rule.
    pub fn get_event_with_recurrence(&self, id: EventId) -> Result<Option<EventWithRecurrence>> {
        let conn = self.store.connection()?;
        let Some(event) = EventTable::get(conn, id)? else {
            return Ok(None);
        };
        Ok(Some(EventWithRecurrence {
            event,
            recurrence: RecurrenceTable::for_event(conn, id)?,
        }))
    }

    /// Move an event to another calendar.
    ///
    /// Both the event and the target calendar must exist; otherwise
    /// [`StoreError::NotFound`] and nothing changes.
    pub fn move_event(&mut self, id: EventId, calendar_id: CalendarId) -> Result<()> {
        self.store.with_transaction(|conn| {
            if CalendarTable::get(conn, calendar_id)?.is_none() {
                return Err(StoreError::NotFound(format!("calendar {calendar_id}")));
            }
            let Some(event) = EventTable::get(conn, id)? else {
                return Err(StoreError::NotFound(format!("event {id}")));
            };
            let _ = EventTable::update(conn, &EventRow { calendar_id, ..event })?;
            Ok(())
        })
    }

    /// Delete an event and its recurrence rule. Returns whether the event
    /// existed.
    pub fn delete_event(&mut self, id: EventId) -> Result<bool> {
        self.store.with_transaction(|conn| {
            let _ = RecurrenceTable::delete_for_event(conn, id)?;
            EventTable::delete(conn, id)
        })
    }

    /// Delete a calendar with all of its events and their rules. Returns
    /// whether the calendar existed.
    pub fn delete_calendar(&mut self, id: CalendarId) -> Result<bool> {
        self.store.with_transaction(|conn| {
            let events = EventTable::ids_for_calendar(conn, id)?;
            for event_id in &events {
                let _ = RecurrenceTable::delete_for_event(conn, *event_id)?;
            }
            let _ = EventTable::delete_for_calendar(conn, id)?;
            let existed = CalendarTable::delete(conn, id)?;
            debug!(calendar_id = id, events = events.len(), existed, "deleted calendar");
            Ok(existed)
        })
    }

    /// The wrapped store.
    pub fn store(&self) -> &MetadataStore {
        &self.store
    }
}

impl Deref for CalendarDatabase {
    type Target = MetadataStore;

    fn deref(&self) -> &MetadataStore {
        &self.store
    }
}

impl DerefMut for CalendarDatabase {
    fn deref_mut(&mut self) -> &mut MetadataStore {
        &mut self.store
    }
}
