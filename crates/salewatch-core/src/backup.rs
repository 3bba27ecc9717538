use chrono::NaiveDate;

use crate::calendar::CalendarEvent;

const KEY_FORMAT: &str = "%Y%m%d";

/// One day's batch of calendar events that could not be emailed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    date: NaiveDate,
    events: Vec<CalendarEvent>,
    attempts: u32,
}

impl Backup {
    pub fn new(date: NaiveDate, events: Vec<CalendarEvent>) -> Self {
        Self {
            date,
            events,
            attempts: 0,
        }
    }

    pub fn from_json(date: NaiveDate, json: &str) -> serde_json::Result<Self> {
        let events = serde_json::from_str(json)?;
        Ok(Self::new(date, events))
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn events(&self) -> &[CalendarEvent] {
        &self.events
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn key(&self) -> String {
        format_date(self.date)
    }

    pub fn is_today(&self, today: NaiveDate) -> bool {
        self.date == today
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Appends the other batch's events that are not already held.
    pub fn merge(&mut self, other: &Backup) {
        for event in &other.events {
            if !self.events.contains(event) {
                self.events.push(event.clone());
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.events)
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(KEY_FORMAT).to_string()
}

pub fn parse_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, KEY_FORMAT).ok()
}
