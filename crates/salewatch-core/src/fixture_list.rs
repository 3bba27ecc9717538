use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;

use crate::calendar::CalendarEvent;
use crate::fixture::{ChangeState, Fixture};

#[derive(Debug, Clone, PartialEq)]
pub struct FixtureEntry {
    pub fixture: Fixture,
    pub change: ChangeState,
}

impl FixtureEntry {
    /// Changed (or not yet compared) and carrying at least one valid sale.
    pub fn is_reportable(&self) -> bool {
        self.change.counts_as_changed() && self.fixture.active_sale_count() > 0
    }
}

/// Fixtures in index-page order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixtureList {
    entries: Vec<FixtureEntry>,
}

impl FixtureList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fixture: Fixture) {
        self.entries.push(FixtureEntry {
            fixture,
            change: ChangeState::Unknown,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FixtureEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [FixtureEntry] {
        &mut self.entries
    }

    /// Page order, or a stable sort by earliest valid sale with sale-less fixtures last.
    pub fn fixtures(&self, sort_by_sale_date: bool) -> Vec<&Fixture> {
        let mut fixtures: Vec<&Fixture> = self.entries.iter().map(|e| &e.fixture).collect();
        if sort_by_sale_date {
            fixtures.sort_by_key(|f| sale_date_weight(f.earliest_sale_date()));
        }
        fixtures
    }

    /// Reportable fixtures, sorted by earliest sale.
    pub fn changed_fixtures(&self) -> Vec<&Fixture> {
        let mut fixtures: Vec<&Fixture> = self
            .entries
            .iter()
            .filter(|e| e.is_reportable())
            .map(|e| &e.fixture)
            .collect();
        fixtures.sort_by_key(|f| sale_date_weight(f.earliest_sale_date()));
        fixtures
    }

    pub fn active_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.fixture.active_sale_count() > 0)
            .count()
    }

    pub fn has_changed(&self) -> bool {
        self.entries.iter().any(FixtureEntry::is_reportable)
    }

    /// One calendar event per valid sale of every changed, active fixture.
    pub fn changes(&self, home_tz: Tz) -> Vec<CalendarEvent> {
        self.entries
            .iter()
            .filter(|e| e.is_reportable())
            .flat_map(|e| e.fixture.calendar_events(home_tz))
            .collect()
    }
}

fn sale_date_weight(date: Option<DateTime<Utc>>) -> i64 {
    match date {
        Some(d) => {
            i64::from(d.year()) * 100_000_000
                + i64::from(d.month()) * 1_000_000
                + i64::from(d.day()) * 10_000
                + i64::from(d.hour()) * 100
                + i64::from(d.minute())
        }
        None => i64::MAX,
    }
}
