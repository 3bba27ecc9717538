//! RFC 5545 encoding of calendar events.

use chrono::{DateTime, NaiveDateTime, Utc};
use salewatch_core::{BusyStatus, CalendarEvent};
use sha2::{Digest, Sha256};
use thiserror::Error;

const CRLF: &str = "\r\n";
const MAX_LINE_OCTETS: usize = 75;
const PRODUCT_ID: &str = "-//salewatch//Ticket Sale Watch//EN";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CalendarError {
    #[error("refusing to encode a calendar with no events")]
    Empty,
    #[error("event at {start} has an empty title")]
    EmptyTitle { start: NaiveDateTime },
    #[error("event {title:?} has zero duration")]
    ZeroDuration { title: String },
}

/// Turns consolidated events into a calendar file body.
pub trait CalendarEncoder {
    fn encode(&self, events: &[CalendarEvent]) -> Result<String, CalendarError>;
}

/// Floating-time iCalendar output: starts are wall-clock readings in the
/// club's timezone and carry no TZID.
#[derive(Debug, Clone)]
pub struct IcsEncoder {
    stamp: DateTime<Utc>,
}

impl IcsEncoder {
    /// `stamp` becomes every event's DTSTAMP.
    pub fn new(stamp: DateTime<Utc>) -> Self {
        Self { stamp }
    }
}

impl CalendarEncoder for IcsEncoder {
    fn encode(&self, events: &[CalendarEvent]) -> Result<String, CalendarError> {
        if events.is_empty() {
            return Err(CalendarError::Empty);
        }

        let mut lines = vec![
            "BEGIN:VCALENDAR".to_string(),
            "VERSION:2.0".to_string(),
            format!("PRODID:{PRODUCT_ID}"),
            "CALSCALE:GREGORIAN".to_string(),
            "METHOD:PUBLISH".to_string(),
        ];
        let stamp = self.stamp.format("%Y%m%dT%H%M%SZ").to_string();

        for event in events {
            if event.title.trim().is_empty() {
                return Err(CalendarError::EmptyTitle { start: event.start });
            }
            if event.duration_minutes == 0 {
                return Err(CalendarError::ZeroDuration {
                    title: event.title.clone(),
                });
            }
            let (transp, busy) = match event.busy_status {
                BusyStatus::Busy => ("OPAQUE", "BUSY"),
                BusyStatus::Free => ("TRANSPARENT", "FREE"),
            };
            lines.push("BEGIN:VEVENT".to_string());
            lines.push(format!("UID:{}", event_uid(event)));
            lines.push(format!("DTSTAMP:{stamp}"));
            lines.push(format!("SUMMARY:{}", escape_text(&event.title)));
            lines.push(format!("DTSTART:{}", event.start.format("%Y%m%dT%H%M%S")));
            lines.push(format!("DURATION:PT{}M", event.duration_minutes));
            lines.push(format!("TRANSP:{transp}"));
            lines.push(format!("X-MICROSOFT-CDO-BUSYSTATUS:{busy}"));
            lines.push("END:VEVENT".to_string());
        }
        lines.push("END:VCALENDAR".to_string());

        let mut out = String::new();
        for line in &lines {
            out.push_str(&fold_line(line));
            out.push_str(CRLF);
        }
        Ok(out)
    }
}

/// Stable per title and start, so a resent event replaces the earlier copy.
fn event_uid(event: &CalendarEvent) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event.title.as_bytes());
    hasher.update(b"|");
    hasher.update(event.start.format("%Y%m%dT%H%M").to_string().as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{}@salewatch", &digest[..32])
}

pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out
}

/// Split a content line into physical lines of at most 75 octets, never
/// inside a UTF-8 sequence; continuations start with a single space.
pub fn fold_line(line: &str) -> String {
    if line.len() <= MAX_LINE_OCTETS {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + line.len() / MAX_LINE_OCTETS * 3);
    let mut used = 0;
    for c in line.chars() {
        let width = c.len_utf8();
        if used + width > MAX_LINE_OCTETS {
            out.push_str(CRLF);
            out.push(' ');
            used = 1;
        }
        out.push(c);
        used += width;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn encoder() -> IcsEncoder {
        IcsEncoder::new(Utc.with_ymd_and_hms(2024, 10, 1, 12, 0, 0).single().unwrap())
    }

    fn event(title: &str) -> CalendarEvent {
        CalendarEvent::new(
            title,
            NaiveDate::from_ymd_opt(2024, 10, 15)
                .unwrap()
                .and_hms_opt(8, 15, 0)
                .unwrap(),
        )
    }

    #[test]
    fn encodes_one_vevent_per_event() {
        let ics = encoder()
            .encode(&[event("Chelsea (H) : Members Sale (13+)")])
            .unwrap();
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 1);
        assert!(ics.contains("\r\nSUMMARY:Chelsea (H) : Members Sale (13+)\r\n"));
        assert!(ics.contains("\r\nDTSTART:20241015T081500\r\n"));
        assert!(ics.contains("\r\nDTSTAMP:20241001T120000Z\r\n"));
        assert!(ics.contains("\r\nDURATION:PT60M\r\n"));
        assert!(ics.contains("\r\nTRANSP:OPAQUE\r\n"));
        assert!(ics.contains("\r\nX-MICROSOFT-CDO-BUSYSTATUS:BUSY\r\n"));
        assert!(!ics.replace("\r\n", "").contains('\n'));
    }

    #[test]
    fn summaries_are_escaped() {
        let ics = encoder()
            .encode(&[event("Bulk Sale (Chelsea, Brighton) : Members Sale (13+; General)")])
            .unwrap();
        assert!(ics.contains("SUMMARY:Bulk Sale (Chelsea\\, Brighton) : Members Sale (13+\\; General)"));
    }

    #[test]
    fn uids_are_stable_and_distinct() {
        let a = event_uid(&event("Chelsea (H) : Members Sale"));
        assert_eq!(a, event_uid(&event("Chelsea (H) : Members Sale")));
        assert_ne!(a, event_uid(&event("Brighton (H) : Members Sale")));
        assert!(a.ends_with("@salewatch"));
    }

    #[test]
    fn long_lines_fold_at_75_octets() {
        let title = "Bulk Sale (Chelsea, Brighton & Hove Albion, Everton, Fulham, Nottingham Forest) : Members Sale (13+, 10+, General)";
        let ics = encoder().encode(&[event(title)]).unwrap();
        for physical in ics.split("\r\n") {
            assert!(physical.len() <= 75, "{physical:?} is {} octets", physical.len());
        }
        let unfolded = ics.replace("\r\n ", "");
        assert!(unfolded.contains(&format!("SUMMARY:{}", escape_text(title))));
    }

    #[test]
    fn folding_respects_multibyte_characters() {
        let line = format!("SUMMARY:{}", "é".repeat(60));
        let folded = fold_line(&line);
        for physical in folded.split("\r\n") {
            assert!(physical.len() <= 75);
        }
        assert_eq!(folded.replace("\r\n ", ""), line);
    }

    #[test]
    fn empty_calendars_and_blank_titles_are_errors() {
        assert_eq!(encoder().encode(&[]), Err(CalendarError::Empty));
        assert!(matches!(
            encoder().encode(&[event("  ")]),
            Err(CalendarError::EmptyTitle { .. })
        ));
    }
}
