use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::calendar::CalendarEvent;
use crate::fingerprint::FingerprintSale;

/// Separates the fixture label ("Chelsea (H)") from the sale name in a description.
pub const LABEL_SEPARATOR: &str = " : ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleStatus {
    Pending,
    Available,
    Ended,
}

impl SaleStatus {
    /// Classify the free-text status keyword shown on a sale block.
    pub fn classify(keyword: &str) -> Self {
        let lower = keyword.to_ascii_lowercase();
        if lower.contains("ended") || lower.contains("sold out") {
            SaleStatus::Ended
        } else if lower.contains("available") || lower.contains("buy now") {
            SaleStatus::Available
        } else {
            SaleStatus::Pending
        }
    }
}

/// One sale or registration window for a fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sale {
    pub description: String,
    pub status: SaleStatus,
    pub date: Option<DateTime<Utc>>,
}

impl Sale {
    pub fn new(description: impl Into<String>, status: SaleStatus, date: Option<DateTime<Utc>>) -> Self {
        Self {
            description: description.into(),
            status,
            date,
        }
    }

    /// The sale name without the leading fixture label.
    pub fn name(&self) -> &str {
        self.description
            .split_once(LABEL_SEPARATOR)
            .map(|(_, name)| name)
            .unwrap_or(&self.description)
    }

    /// Calendar-worthy: still pending, dated, and not a local/seating-category sale.
    pub fn is_valid(&self) -> bool {
        self.status == SaleStatus::Pending
            && self.date.is_some()
            && !self.name().starts_with("Local")
            && !self.description.contains("ambulant")
            && !self.description.contains("Hospitality")
    }

    /// The event start is the club's wall-clock reading for the sale instant,
    /// so the entry shows venue time whatever zone the reader's machine is in.
    pub fn to_calendar_event(&self, home_tz: Tz) -> Option<CalendarEvent> {
        if !self.is_valid() {
            return None;
        }
        let date = self.date?;
        let local = date.with_timezone(&home_tz).naive_local();
        Some(CalendarEvent::new(self.description.clone(), local))
    }

    pub fn to_fingerprint(&self) -> Option<FingerprintSale> {
        if !self.is_valid() {
            return None;
        }
        Some(FingerprintSale {
            description: self.description.clone(),
            date: self.date?,
        })
    }
}

fn same_minute(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.timestamp().div_euclid(60) == b.timestamp().div_euclid(60),
        (None, None) => true,
        _ => false,
    }
}

impl PartialEq for Sale {
    fn eq(&self, other: &Self) -> bool {
        self.description == other.description
            && self.status == other.status
            && same_minute(self.date, other.date)
    }
}

impl Eq for Sale {}
