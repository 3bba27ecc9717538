use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::calendar::CalendarEvent;
use crate::fingerprint::Fingerprint;
use crate::sale::{Sale, LABEL_SEPARATOR};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Venue {
    Home,
    Away,
    Neutral,
    Unknown,
}

impl Venue {
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "H" => Venue::Home,
            "A" => Venue::Away,
            "N" => Venue::Neutral,
            _ => Venue::Unknown,
        }
    }

    pub fn code(self) -> char {
        match self {
            Venue::Home => 'H',
            Venue::Away => 'A',
            Venue::Neutral => 'N',
            Venue::Unknown => 'U',
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Outcome of comparing a fixture against persisted state for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeState {
    /// Persistence was not consulted. Treated as changed.
    #[default]
    Unknown,
    Changed,
    Unchanged,
}

impl ChangeState {
    pub fn counts_as_changed(self) -> bool {
        !matches!(self, ChangeState::Unchanged)
    }
}

/// A single match with the sales scraped from its detail page.
#[derive(Debug, Clone, PartialEq)]
pub struct Fixture {
    id: String,
    season: i32,
    url: String,
    opposition: String,
    venue: Venue,
    competition: String,
    kickoff: DateTime<Utc>,
    sales: Vec<Sale>,
}

impl Fixture {
    pub fn new(
        url: impl Into<String>,
        opposition: impl Into<String>,
        venue: Venue,
        competition: impl Into<String>,
        kickoff: DateTime<Tz>,
    ) -> Self {
        let opposition = opposition.into();
        let competition = competition.into();
        let season = season_for(&kickoff);
        let id = fixture_id(season, &opposition, venue, &competition);
        Self {
            id,
            season,
            url: url.into(),
            opposition,
            venue,
            competition,
            kickoff: kickoff.with_timezone(&Utc),
            sales: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn season(&self) -> i32 {
        self.season
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn opposition(&self) -> &str {
        &self.opposition
    }

    pub fn venue(&self) -> Venue {
        self.venue
    }

    pub fn competition(&self) -> &str {
        &self.competition
    }

    pub fn kickoff(&self) -> DateTime<Utc> {
        self.kickoff
    }

    pub fn sales(&self) -> &[Sale] {
        &self.sales
    }

    pub fn push_sale(&mut self, sale: Sale) {
        self.sales.push(sale);
    }

    pub fn clear_sales(&mut self) {
        self.sales.clear();
    }

    /// Prefix used on every sale description, e.g. "Chelsea (H)".
    pub fn label(&self) -> String {
        format!("{} ({})", self.opposition, self.venue)
    }

    /// Builds a sale description from a normalized sale name.
    pub fn describe_sale(&self, sale_name: &str) -> String {
        format!("{}{}{}", self.label(), LABEL_SEPARATOR, sale_name)
    }

    /// e.g. "Chelsea (H) : Premier League 2024/25".
    pub fn match_label(&self) -> String {
        format!(
            "{}{}{} {}/{:02}",
            self.label(),
            LABEL_SEPARATOR,
            self.competition,
            self.season,
            (self.season + 1).rem_euclid(100)
        )
    }

    pub fn active_sales(&self) -> impl Iterator<Item = &Sale> {
        self.sales.iter().filter(|s| s.is_valid())
    }

    pub fn active_sale_count(&self) -> usize {
        self.active_sales().count()
    }

    pub fn earliest_sale_date(&self) -> Option<DateTime<Utc>> {
        self.active_sales().filter_map(|s| s.date).min()
    }

    pub fn calendar_events(&self, home_tz: Tz) -> Vec<CalendarEvent> {
        self.sales
            .iter()
            .filter_map(|s| s.to_calendar_event(home_tz))
            .collect()
    }

    /// `None` when there is nothing worth persisting.
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        if self.active_sale_count() == 0 {
            return None;
        }
        Some(Fingerprint {
            id: self.id.clone(),
            match_label: self.match_label(),
            sales: self.sales.iter().filter_map(Sale::to_fingerprint).collect(),
        })
    }

    /// Expiry-tolerant comparison against a stored fingerprint.
    ///
    /// Every valid live sale must be known to storage. Every stored sale must
    /// still be live unless its date has already passed, since the source page
    /// drops sales once they are over.
    pub fn matches_stored(&self, stored: &Fingerprint, now: DateTime<Utc>) -> bool {
        let stored_sales: Vec<Sale> = stored.sales.iter().map(|s| s.to_sale()).collect();

        for live in self.active_sales() {
            if !stored_sales.iter().any(|s| s == live) {
                return false;
            }
        }

        for stored_sale in &stored_sales {
            if self.sales.iter().any(|live| live == stored_sale) {
                continue;
            }
            let expired = stored_sale.date.map(|d| d < now).unwrap_or(true);
            if !expired {
                return false;
            }
        }

        true
    }
}

/// Seasons run roughly August to May and are named after their starting year.
pub fn season_for<D: Datelike>(kickoff: &D) -> i32 {
    if kickoff.month0() < 5 {
        kickoff.year() - 1
    } else {
        kickoff.year()
    }
}

pub fn fixture_id(season: i32, opposition: &str, venue: Venue, competition: &str) -> String {
    format!("{season}-{opposition}-{venue}-{competition}")
        .replace("&amp;", " ")
        .replace('&', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}
