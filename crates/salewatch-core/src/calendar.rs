use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Every sale window is exported as a one hour block.
pub const EVENT_DURATION_MINUTES: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusyStatus {
    Busy,
    Free,
}

/// A calendar entry as exported to the ICS attachment and kept in backups.
///
/// `start` is a wall-clock reading in the club's home timezone with no
/// seconds component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub title: String,
    pub start: NaiveDateTime,
    pub duration_minutes: u32,
    pub busy_status: BusyStatus,
}

impl CalendarEvent {
    pub fn new(title: impl Into<String>, start: NaiveDateTime) -> Self {
        let start = start
            .with_second(0)
            .and_then(|s| s.with_nanosecond(0))
            .unwrap_or(start);
        Self {
            title: title.into(),
            start,
            duration_minutes: EVENT_DURATION_MINUTES,
            busy_status: BusyStatus::Busy,
        }
    }

    pub fn is_after(&self, now_local: NaiveDateTime) -> bool {
        self.start > now_local
    }
}
