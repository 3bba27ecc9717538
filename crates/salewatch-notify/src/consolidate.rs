//! Collapses same-time calendar events into one human-readable entry each.

use chrono::NaiveDateTime;
use salewatch_core::{CalendarEvent, LABEL_SEPARATOR};

use crate::ics::{CalendarEncoder, CalendarError};

const GENERAL_CRITERION: &str = "General";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Sale,
    Registration,
}

/// The pieces of a "Chelsea (H) : Members Sale (13+)" title.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TitleParts {
    kind: EventKind,
    team: String,
    name: String,
    criterion: Option<String>,
}

impl TitleParts {
    fn parse(title: &str) -> Self {
        let kind = if title_name(title).to_lowercase().contains("registration") {
            EventKind::Registration
        } else {
            EventKind::Sale
        };
        Self::parse_as(title, kind)
    }

    /// Parse with the phrasing of `kind`: only sale phrasing defaults a missing tier to "General".
    fn parse_as(title: &str, kind: EventKind) -> Self {
        let (label, rest) = title.split_once(LABEL_SEPARATOR).unwrap_or((title, title));
        let team = strip_bracketed_suffix(label)
            .map(|(team, _)| team)
            .unwrap_or(label)
            .trim()
            .to_string();
        let (name, criterion) = match strip_bracketed_suffix(rest) {
            Some((name, inner)) if inner.ends_with('+') => (name, Some(inner.to_string())),
            _ => (rest, None),
        };
        let criterion = match (kind, criterion) {
            (EventKind::Sale, None) => Some(GENERAL_CRITERION.to_string()),
            (_, criterion) => criterion,
        };
        Self {
            kind,
            team,
            name: name.trim().to_string(),
            criterion,
        }
    }
}

fn title_name(title: &str) -> &str {
    title.split_once(LABEL_SEPARATOR).map(|(_, rest)| rest).unwrap_or(title)
}

/// Splits "Name (inner)" into ("Name", "inner").
fn strip_bracketed_suffix(text: &str) -> Option<(&str, &str)> {
    let trimmed = text.trim_end();
    let without_close = trimmed.strip_suffix(')')?;
    let open = without_close.rfind(" (")?;
    Some((&without_close[..open], &without_close[open + 2..]))
}

#[derive(Debug, Clone)]
struct MergedTitle {
    kind: EventKind,
    teams: Vec<String>,
    name: String,
    criteria: Vec<String>,
}

impl MergedTitle {
    fn seed(parts: TitleParts) -> Self {
        Self {
            kind: parts.kind,
            teams: vec![parts.team],
            name: parts.name,
            criteria: parts.criterion.into_iter().collect(),
        }
    }

    fn absorb(&mut self, parts: TitleParts) {
        self.kind = parts.kind;
        if !self.teams.contains(&parts.team) {
            self.teams.push(parts.team);
        }
        if let Some(criterion) = parts.criterion {
            if !self.criteria.contains(&criterion) {
                self.criteria.push(criterion);
            }
        }
    }

    fn render(&self) -> String {
        let teams = self.teams.join(", ");
        let prefix = match self.kind {
            EventKind::Sale => "Bulk Sale",
            EventKind::Registration => "Registration",
        };
        let mut title = format!("{prefix} ({teams}){LABEL_SEPARATOR}{}", self.name);
        if !self.criteria.is_empty() {
            title.push_str(&format!(" ({})", self.criteria.join(", ")));
        }
        title
    }
}

/// One accumulator entry: the emitted event plus every original it stands for.
#[derive(Debug)]
struct Slot {
    event: CalendarEvent,
    absorbed: Vec<CalendarEvent>,
    merged: Option<MergedTitle>,
}

impl Slot {
    fn new(event: CalendarEvent) -> Self {
        Self {
            absorbed: vec![event.clone()],
            event,
            merged: None,
        }
    }

    /// The candidate's kind picks the merged phrasing.
    fn absorb(&mut self, candidate: CalendarEvent) {
        let parts = TitleParts::parse(&candidate.title);
        let merged = self
            .merged
            .get_or_insert_with(|| MergedTitle::seed(TitleParts::parse_as(&self.absorbed[0].title, parts.kind)));
        merged.absorb(parts);
        self.event.title = merged.render();
        self.absorbed.push(candidate);
    }
}

/// Drop exact duplicates and merge events sharing a start time, keeping first-seen order.
pub fn merge_events<I>(events: I) -> Vec<CalendarEvent>
where
    I: IntoIterator<Item = CalendarEvent>,
{
    let mut slots: Vec<Slot> = Vec::new();
    for candidate in events {
        if slots.iter().any(|s| s.absorbed.contains(&candidate)) {
            continue;
        }
        match slots.iter_mut().find(|s| s.event.start == candidate.start) {
            Some(slot) => slot.absorb(candidate),
            None => slots.push(Slot::new(candidate)),
        }
    }
    slots.into_iter().map(|s| s.event).collect()
}

/// Merge, then keep only events that start strictly after `now_local`.
pub fn consolidate<I>(events: I, now_local: NaiveDateTime) -> Vec<CalendarEvent>
where
    I: IntoIterator<Item = CalendarEvent>,
{
    merge_events(events)
        .into_iter()
        .filter(|e| e.is_after(now_local))
        .collect()
}

/// An encoded calendar and the events it contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarFile {
    pub events: Vec<CalendarEvent>,
    pub content: String,
}

/// `None` when nothing is left to send; the encoder is never asked to encode an empty calendar.
pub fn build_calendar<E, I>(
    encoder: &E,
    events: I,
    now_local: NaiveDateTime,
) -> Result<Option<CalendarFile>, CalendarError>
where
    E: CalendarEncoder + ?Sized,
    I: IntoIterator<Item = CalendarEvent>,
{
    let events = consolidate(events, now_local);
    if events.is_empty() {
        return Ok(None);
    }
    let content = encoder.encode(&events)?;
    Ok(Some(CalendarFile { events, content }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use std::cell::Cell;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 10, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn now() -> NaiveDateTime {
        at(1, 12, 0)
    }

    fn titles(events: &[CalendarEvent]) -> Vec<&str> {
        events.iter().map(|e| e.title.as_str()).collect()
    }

    struct CountingEncoder {
        calls: Cell<usize>,
    }

    impl CalendarEncoder for CountingEncoder {
        fn encode(&self, events: &[CalendarEvent]) -> Result<String, CalendarError> {
            self.calls.set(self.calls.get() + 1);
            Ok(format!("{} events", events.len()))
        }
    }

    struct FailingEncoder;

    impl CalendarEncoder for FailingEncoder {
        fn encode(&self, _events: &[CalendarEvent]) -> Result<String, CalendarError> {
            Err(CalendarError::Empty)
        }
    }

    #[test]
    fn same_criteria_are_listed_once() {
        let merged = merge_events([
            CalendarEvent::new("Chelsea (H) : Members Sale (13+)", at(15, 8, 15)),
            CalendarEvent::new("Brighton (H) : Members Sale (13+)", at(15, 8, 15)),
        ]);
        assert_eq!(
            titles(&merged),
            ["Bulk Sale (Chelsea, Brighton) : Members Sale (13+)"]
        );
        assert_eq!(merged[0].start, at(15, 8, 15));
    }

    #[test]
    fn untiered_sale_contributes_general() {
        let merged = merge_events([
            CalendarEvent::new("Chelsea (H) : Members Sale (13+)", at(15, 8, 15)),
            CalendarEvent::new("Brighton (H) : Members Sale", at(15, 8, 15)),
        ]);
        assert_eq!(
            titles(&merged),
            ["Bulk Sale (Chelsea, Brighton) : Members Sale (13+, General)"]
        );
    }

    #[test]
    fn merged_entries_keep_absorbing() {
        let merged = merge_events([
            CalendarEvent::new("Chelsea (H) : Members Sale (13+)", at(15, 8, 15)),
            CalendarEvent::new("Brighton & Hove Albion (H) : Members Sale (13+)", at(15, 8, 15)),
            CalendarEvent::new("Everton (A) : Members Sale (10+)", at(15, 8, 15)),
            CalendarEvent::new("Fulham (H) : Members Sale (13+)", at(15, 8, 15)),
        ]);
        assert_eq!(
            titles(&merged),
            ["Bulk Sale (Chelsea, Brighton & Hove Albion, Everton, Fulham) : Members Sale (13+, 10+)"]
        );
    }

    #[test]
    fn registrations_merge_with_registration_phrasing() {
        let merged = merge_events([
            CalendarEvent::new("Chelsea (H) : Additional Members Registration", at(10, 11, 0)),
            CalendarEvent::new("Brighton (H) : Additional Members Registration (4+)", at(10, 11, 0)),
        ]);
        assert_eq!(
            titles(&merged),
            ["Registration (Chelsea, Brighton) : Additional Members Registration (4+)"]
        );

        let untiered = merge_events([
            CalendarEvent::new("Chelsea (H) : Additional Members Registration", at(10, 11, 0)),
            CalendarEvent::new("Brighton (H) : Additional Members Registration", at(10, 11, 0)),
        ]);
        assert_eq!(
            titles(&untiered),
            ["Registration (Chelsea, Brighton) : Additional Members Registration"]
        );
    }

    #[test]
    fn sale_and_registration_at_the_same_time_merge() {
        let merged = merge_events([
            CalendarEvent::new("Chelsea (H) : Members Sale (13+)", at(15, 8, 15)),
            CalendarEvent::new("Brighton (H) : Additional Members Registration", at(15, 8, 15)),
        ]);
        assert_eq!(
            titles(&merged),
            ["Registration (Chelsea, Brighton) : Members Sale (13+)"]
        );

        let merged = merge_events([
            CalendarEvent::new("Brighton (H) : Additional Members Registration", at(15, 8, 15)),
            CalendarEvent::new("Chelsea (H) : Members Sale (13+)", at(15, 8, 15)),
        ]);
        assert_eq!(
            titles(&merged),
            ["Bulk Sale (Brighton, Chelsea) : Additional Members Registration (General, 13+)"]
        );
    }

    #[test]
    fn criteria_match_whole_tiers_only() {
        let merged = merge_events([
            CalendarEvent::new("Chelsea (H) : Members Sale (13+)", at(15, 8, 15)),
            CalendarEvent::new("Brighton (H) : Members Sale (3+)", at(15, 8, 15)),
            CalendarEvent::new("Fulham (H) : Members Sale (13+)", at(15, 8, 15)),
        ]);
        assert_eq!(
            titles(&merged),
            ["Bulk Sale (Chelsea, Brighton, Fulham) : Members Sale (13+, 3+)"]
        );
    }

    #[test]
    fn exact_duplicates_collapse_even_after_a_merge() {
        let chelsea = CalendarEvent::new("Chelsea (H) : Members Sale (13+)", at(15, 8, 15));
        let brighton = CalendarEvent::new("Brighton (H) : Members Sale (13+)", at(15, 8, 15));
        let merged = merge_events([
            chelsea.clone(),
            chelsea.clone(),
            brighton.clone(),
            brighton,
            chelsea,
        ]);
        assert_eq!(
            titles(&merged),
            ["Bulk Sale (Chelsea, Brighton) : Members Sale (13+)"]
        );
    }

    #[test]
    fn different_times_stay_separate_in_first_seen_order() {
        let merged = merge_events([
            CalendarEvent::new("Chelsea (H) : Members Sale (13+)", at(15, 8, 15)),
            CalendarEvent::new("Brighton (H) : Members Sale", at(16, 8, 15)),
        ]);
        assert_eq!(
            titles(&merged),
            ["Chelsea (H) : Members Sale (13+)", "Brighton (H) : Members Sale"]
        );
    }

    #[test]
    fn expired_events_are_excluded() {
        let stale = CalendarEvent::new("Chelsea (H) : Members Sale (13+)", now() - Duration::days(2));
        let exactly_now = CalendarEvent::new("Brighton (H) : Members Sale", now());
        let fresh = CalendarEvent::new("Fulham (H) : Members Sale", at(15, 8, 15));
        let kept = consolidate([stale, exactly_now, fresh.clone()], now());
        assert_eq!(kept, [fresh]);
    }

    #[test]
    fn empty_input_never_reaches_the_encoder() {
        let encoder = CountingEncoder { calls: Cell::new(0) };
        assert_eq!(build_calendar(&encoder, Vec::new(), now()).unwrap(), None);

        let stale = CalendarEvent::new("Chelsea (H) : Members Sale", now() - Duration::days(2));
        assert_eq!(build_calendar(&encoder, [stale], now()).unwrap(), None);
        assert_eq!(encoder.calls.get(), 0);

        let fresh = CalendarEvent::new("Chelsea (H) : Members Sale", at(15, 8, 15));
        let file = build_calendar(&encoder, [fresh.clone(), fresh], now())
            .unwrap()
            .unwrap();
        assert_eq!(file.content, "1 events");
        assert_eq!(encoder.calls.get(), 1);
    }

    #[test]
    fn encoder_failure_is_propagated() {
        let fresh = CalendarEvent::new("Chelsea (H) : Members Sale", at(15, 8, 15));
        assert!(build_calendar(&FailingEncoder, [fresh], now()).is_err());
    }

    #[test]
    fn title_parts() {
        let parts = TitleParts::parse("Brighton & Hove Albion (H) : Members Sale (13+)");
        assert_eq!(parts.team, "Brighton & Hove Albion");
        assert_eq!(parts.name, "Members Sale");
        assert_eq!(parts.criterion.as_deref(), Some("13+"));
        assert_eq!(parts.kind, EventKind::Sale);

        let untiered = TitleParts::parse("Chelsea (H) : Additional Members Registration");
        assert_eq!(untiered.kind, EventKind::Registration);
        assert_eq!(untiered.criterion, None);
    }
}
