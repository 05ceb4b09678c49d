#![allow(missing_docs, unused_results)]

use std::path::Path;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::Connection;

use assert_matches::assert_matches;
use metastore::{
    InitStatus, MetaTable, MetadataStore, SchemaSpec, StoreConfig, StoreError, StoreState,
};
use metastore_calendar::{
    CalendarDatabase, CalendarRow, CalendarTable, DEFAULT_CALENDAR_NAME, EventRow, EventTable,
    Frequency, RecurrenceRow, RecurrenceTable,
};

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, d, 9, 0, 0).unwrap()
}

fn open(path: &Path) -> CalendarDatabase {
    let mut db = CalendarDatabase::new(StoreConfig::default());
    assert_eq!(db.init(path), InitStatus::Ok);
    db
}

fn in_memory() -> CalendarDatabase {
    let mut db = CalendarDatabase::new(StoreConfig::default());
    assert_eq!(db.init_in_memory(), InitStatus::Ok);
    db
}

/// Version 1 files: events without a calendar, optionally some calendars.
fn write_v1_file(path: &Path, calendars: &[(i64, &str)]) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        r#"CREATE TABLE meta (key LONGVARCHAR NOT NULL UNIQUE PRIMARY KEY, value LONGVARCHAR);
         INSERT INTO meta VALUES ('version', 1), ('last_compatible_version', 1);
         CREATE TABLE events (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             title LONGVARCHAR, description LONGVARCHAR,
             start INTEGER NOT NULL, "end" INTEGER NOT NULL,
             all_day INTEGER DEFAULT 0, created INTEGER, last_modified INTEGER);
         INSERT INTO events (title, start, "end")
             VALUES ('standup', 1714550400000, 1714552200000),
                    ('retro', 1714636800000, 1714640400000);"#,
    )
    .unwrap();
    if !calendars.is_empty() {
        conn.execute_batch(
            "CREATE TABLE calendars (
                 id INTEGER PRIMARY KEY AUTOINCREMENT, name LONGVARCHAR NOT NULL,
                 description LONGVARCHAR, color LONGVARCHAR, hidden INTEGER DEFAULT 0,
                 created INTEGER, last_modified INTEGER);",
        )
        .unwrap();
        for (id, name) in calendars {
            conn.execute(
                "INSERT INTO calendars (id, name) VALUES (?1, ?2)",
                rusqlite::params![id, name],
            )
            .unwrap();
        }
    }
}

// ── Operations ──────────────────────────────────────────────────────────

#[test]
fn event_with_recurrence_round_trip() {
    let mut db = in_memory();
    let calendar = db
        .with_transaction(|conn| CalendarTable::add(conn, &CalendarRow::new("Work")))
        .unwrap();

    let event = EventRow::new(calendar, "standup", day(6), day(6) + Duration::minutes(15));
    let rule = RecurrenceRow {
        count: Some(20),
        ..RecurrenceRow::new(0, Frequency::Daily)
    };
    let id = db.add_event(&event, Some(&rule)).unwrap();

    let stored = db.get_event_with_recurrence(id).unwrap().unwrap();
    assert_eq!(stored.event, EventRow { id, ..event });
    let stored_rule = stored.recurrence.unwrap();
    assert_eq!(stored_rule.event_id, id);
    assert_eq!(stored_rule.count, Some(20));
    assert_eq!(stored_rule.frequency, Frequency::Daily);
}

#[test]
fn failed_recurrence_rolls_back_event() {
    let mut db = in_memory();
    let first = db
        .add_event(
            &EventRow::new(1, "a", day(1), day(2)),
            Some(&RecurrenceRow::new(0, Frequency::Weekly)),
        )
        .unwrap();
    // Points the UNIQUE event_id at an id that will collide.
    db.with_transaction(|conn| {
        conn.execute("UPDATE recurrences SET event_id = ?1", [first + 1])?;
        Ok(())
    })
    .unwrap();

    let err = db
        .add_event(
            &EventRow::new(1, "b", day(3), day(4)),
            Some(&RecurrenceRow::new(0, Frequency::Daily)),
        )
        .unwrap_err();
    assert!(err.engine_code().is_some());
    assert_eq!(db.transaction_nesting(), 0);

    let conn = db.connection().unwrap();
    assert_eq!(EventTable::for_calendar(conn, 1).unwrap().len(), 1);
}

#[test]
fn range_query_spans_calendars() {
    let mut db = in_memory();
    for (calendar, d) in [(1, 1), (2, 3), (1, 5), (2, 9)] {
        let event = EventRow::new(calendar, format!("day {d}"), day(d), day(d) + Duration::hours(1));
        db.add_event(&event, None).unwrap();
    }
    let conn = db.connection().unwrap();
    let titles: Vec<_> = EventTable::in_range(conn, day(3), day(9))
        .unwrap()
        .into_iter()
        .map(|e| e.title)
        .collect();
    assert_eq!(titles, vec!["day 3", "day 5"]);
}

#[test]
fn delete_calendar_cascades() {
    let mut db = in_memory();
    let (work, home) = db
        .with_transaction(|conn| {
            Ok((
                CalendarTable::add(conn, &CalendarRow::new("Work"))?,
                CalendarTable::add(conn, &CalendarRow::new("Home"))?,
            ))
        })
        .unwrap();
    let doomed = db
        .add_event(
            &EventRow::new(work, "1:1", day(2), day(2) + Duration::minutes(30)),
            Some(&RecurrenceRow::new(0, Frequency::Weekly)),
        )
        .unwrap();
    let kept = db
        .add_event(&EventRow::new(home, "dentist", day(4), day(4) + Duration::hours(1)), None)
        .unwrap();

    assert!(db.delete_calendar(work).unwrap());
    assert!(!db.delete_calendar(work).unwrap());

    let conn = db.connection().unwrap();
    assert!(EventTable::get(conn, doomed).unwrap().is_none());
    assert!(RecurrenceTable::for_event(conn, doomed).unwrap().is_none());
    assert!(EventTable::get(conn, kept).unwrap().is_some());
    assert_eq!(CalendarTable::list(conn).unwrap().len(), 1);
}

#[test]
fn delete_event_removes_rule() {
    let mut db = in_memory();
    let id = db
        .add_event(
            &EventRow::new(1, "gym", day(1), day(1) + Duration::hours(1)),
            Some(&RecurrenceRow::new(0, Frequency::Weekly)),
        )
        .unwrap();
    assert!(db.delete_event(id).unwrap());
    assert!(db.get_event_with_recurrence(id).unwrap().is_none());
    assert!(RecurrenceTable::for_event(db.connection().unwrap(), id).unwrap().is_none());
}

#[test]
fn move_event_checks_both_ends() {
    let mut db = in_memory();
    let (work, home) = db
        .with_transaction(|conn| {
            Ok((
                CalendarTable::add(conn, &CalendarRow::new("Work"))?,
                CalendarTable::add(conn, &CalendarRow::new("Home"))?,
            ))
        })
        .unwrap();
    let id = db
        .add_event(&EventRow::new(work, "review", day(7), day(7) + Duration::hours(2)), None)
        .unwrap();

    db.move_event(id, home).unwrap();
    assert_eq!(
        EventTable::get(db.connection().unwrap(), id).unwrap().unwrap().calendar_id,
        home
    );

    assert_matches!(
        db.move_event(id, home + 50),
        Err(StoreError::NotFound(msg)) if msg.starts_with("calendar")
    );
    assert_matches!(
        db.move_event(id + 50, work),
        Err(StoreError::NotFound(msg)) if msg.starts_with("event")
    );
    assert_eq!(db.transaction_nesting(), 0);
}

// ── Migration ───────────────────────────────────────────────────────────

#[test]
fn v1_file_without_calendars_gets_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calendar.db");
    write_v1_file(&path, &[]);

    let db = open(&path);
    let conn = db.connection().unwrap();
    assert_eq!(MetaTable::version(conn).unwrap(), 2);
    assert_eq!(MetaTable::compatible_version(conn).unwrap(), 2);
    assert!(conn.does_index_exist("events_calendar_id_start").unwrap());

    let calendars = CalendarTable::list(conn).unwrap();
    assert_eq!(calendars.len(), 1);
    assert_eq!(calendars[0].name, DEFAULT_CALENDAR_NAME);

    let events = EventTable::for_calendar(conn, calendars[0].id).unwrap();
    let titles: Vec<_> = events.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["standup", "retro"]);
    assert_eq!(events[0].end - events[0].start, Duration::minutes(30));
}

#[test]
fn v1_file_assigns_lowest_calendar() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calendar.db");
    write_v1_file(&path, &[(9, "Travel"), (4, "Personal")]);

    let db = open(&path);
    let conn = db.connection().unwrap();
    assert_eq!(EventTable::for_calendar(conn, 4).unwrap().len(), 2);
    assert!(EventTable::for_calendar(conn, 9).unwrap().is_empty());
    assert_eq!(CalendarTable::list(conn).unwrap().len(), 2);
}

#[test]
fn version_one_binary_refuses_migrated_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calendar.db");
    {
        let mut db = open(&path);
        db.close().unwrap();
    }

    let mut old = MetadataStore::new(SchemaSpec::new(1, 1), Vec::new(), StoreConfig::default());
    assert_eq!(old.init(&path), InitStatus::TooNew);
    assert_eq!(old.state(), StoreState::Failed);

    let db = open(&path);
    assert_eq!(MetaTable::version(db.connection().unwrap()).unwrap(), 2);
}
