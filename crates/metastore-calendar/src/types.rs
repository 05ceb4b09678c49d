//! Row types for the calendar tables.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Primary key of a calendar.
pub type CalendarId = i64;
/// Primary key of an event.
pub type EventId = i64;
/// Primary key of a recurrence rule.
pub type RecurrenceId = i64;

/// A calendar as stored in the `calendars` table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarRow {
    /// Primary key; 0 until inserted.
    pub id: CalendarId,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Display color, e.g. `#3366ff`.
    pub color: String,
    /// Hidden calendars keep their events but are not shown.
    pub hidden: bool,
}

impl CalendarRow {
    /// A new, unsaved calendar with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// An event as stored in the `events` table.
///
/// `end` is exclusive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRow {
    /// Primary key; 0 until inserted.
    pub id: EventId,
    /// Owning calendar.
    pub calendar_id: CalendarId,
    /// Title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// First instant of the event.
    pub start: DateTime<Utc>,
    /// First instant after the event.
    pub end: DateTime<Utc>,
    /// Whether the event covers whole days.
    pub all_day: bool,
}

impl EventRow {
    /// A new, unsaved event.
    pub fn new(
        calendar_id: CalendarId,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            calendar_id,
            title: title.into(),
            description: String::new(),
            start,
            end,
            all_day: false,
        }
    }
}

/// How often a recurring event repeats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Every `interval` days.
    Daily,
    /// Every `interval` weeks.
    Weekly,
    /// Every `interval` months.
    Monthly,
    /// Every `interval` years.
    Yearly,
}

impl Frequency {
    /// Stored text form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored frequency text that names no known frequency.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown recurrence frequency: {0:?}")]
pub struct ParseFrequencyError(pub String);

impl FromStr for Frequency {
    type Err = ParseFrequencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            other => Err(ParseFrequencyError(other.to_owned())),
        }
    }
}

/// A recurrence rule as stored in the `recurrences` table.
///
/// `count` and `until` both bound the series; when both are absent it
/// repeats forever.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRow {
    /// Primary key; 0 until inserted.
    pub id: RecurrenceId,
    /// The event the rule repeats.
    pub event_id: EventId,
    /// Repeat unit.
    pub frequency: Frequency,
    /// Units between occurrences, at least 1.
    pub interval: u32,
    /// Total number of occurrences.
    pub count: Option<u32>,
    /// No occurrence starts at or after this instant.
    pub until: Option<DateTime<Utc>>,
}

impl RecurrenceRow {
    /// A rule repeating `event_id` every unit of `frequency`, forever.
    pub fn new(event_id: EventId, frequency: Frequency) -> Self {
        Self {
            id: 0,
            event_id,
            frequency,
            interval: 1,
            count: None,
            until: None,
        }
    }
}

/// An event together with its recurrence rule, if any.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventWithRecurrence {
    /// The event row.
    pub event: EventRow,
    /// Its recurrence rule.
    pub recurrence: Option<RecurrenceRow>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn frequency_text_round_trip() {
        for f in [
            Frequency::Daily,
            Frequency::Weekly,
            Frequency::Monthly,
            Frequency::Yearly,
        ] {
            assert_eq!(f.as_str().parse::<Frequency>().unwrap(), f);
            assert_eq!(f.to_string(), f.as_str());
        }
    }

    #[test]
    fn unknown_frequency_is_rejected() {
        assert_matches!(
            "fortnightly".parse::<Frequency>(),
            Err(ParseFrequencyError(s)) if s == "fortnightly"
        );
    }

    #[test]
    fn frequency_serializes_lowercase() {
        let json = serde_json::to_value(Frequency::Monthly).unwrap();
        assert_eq!(json, "monthly");
    }

    #[test]
    fn new_recurrence_repeats_forever() {
        let rule = RecurrenceRow::new(4, Frequency::Weekly);
        assert_eq!(rule.interval, 1);
        assert!(rule.count.is_none());
        assert!(rule.until.is_none());
    }
}
