//! Free-text helpers shared by the index and detail parsers.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};

use crate::ParseError;

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

const NUMBER_WORDS: [&str; 19] = [
    "one",
    "two",
    "three",
    "four",
    "five",
    "six",
    "seven",
    "eight",
    "nine",
    "ten",
    "eleven",
    "twelve",
    "thirteen",
    "fourteen",
    "fifteen",
    "sixteen",
    "seventeen",
    "eighteen",
    "nineteen",
];

const LARGE_NUMBER_WORDS: [&str; 9] = [
    "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety", "hundred",
];

/// Collapse runs of whitespace and trim.
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
}

pub fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.trim_end_matches('.').to_ascii_lowercase();
    if lower.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|m| *m == lower || (lower.len() == 3 && m.starts_with(&lower)) || (lower == "sept" && *m == "september"))
        .map(|i| i as u32 + 1)
}

fn day_number(token: &str) -> Option<u32> {
    let digits = token
        .trim_end_matches(|c: char| c.is_ascii_alphabetic())
        .trim_end_matches('.');
    if digits.is_empty() || digits.len() > 2 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|d| (1..=31).contains(d))
}

/// Day, month and optional year from text such as "Tuesday 15th October 2024, 08:15".
pub fn parse_day_month(text: &str) -> Option<(u32, u32, Option<i32>)> {
    let mut day = None;
    let mut month = None;
    let mut year = None;
    for token in tokens(text) {
        let lower = token.to_ascii_lowercase();
        if token.contains(':') || lower.ends_with("am") || lower.ends_with("pm") {
            continue;
        }
        if month.is_none() {
            if let Some(m) = month_from_name(token) {
                month = Some(m);
                continue;
            }
        }
        if day.is_none() {
            if let Some(d) = day_number(token) {
                day = Some(d);
                continue;
            }
        }
        if year.is_none() && token.len() == 4 && token.chars().all(|c| c.is_ascii_digit()) {
            year = token.parse().ok();
        }
    }
    Some((day?, month?, year))
}

/// First clock reading in the text, "08:15", "8:15pm" or "8.15am".
pub fn parse_clock(text: &str) -> Option<NaiveTime> {
    for token in tokens(text) {
        let lower = token.to_ascii_lowercase();
        let (digits, meridiem) = if let Some(rest) = lower.strip_suffix("am") {
            (rest, Some(false))
        } else if let Some(rest) = lower.strip_suffix("pm") {
            (rest, Some(true))
        } else {
            (lower.as_str(), None)
        };
        let (h, m) = if let Some(parts) = digits.split_once(':') {
            parts
        } else if meridiem.is_none() {
            continue;
        } else if let Some(parts) = digits.split_once('.') {
            parts
        } else {
            (digits, "0")
        };
        let (Ok(mut hour), Ok(minute)) = (h.parse::<u32>(), m.parse::<u32>()) else {
            continue;
        };
        match meridiem {
            Some(true) if hour < 12 => hour += 12,
            Some(false) if hour == 12 => hour = 0,
            _ => {}
        }
        if let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) {
            return Some(time);
        }
    }
    None
}

/// Full wall-clock reading from text that names its year.
pub fn parse_dated_clock(text: &str) -> Option<NaiveDateTime> {
    let (day, month, year) = parse_day_month(text)?;
    let date = NaiveDate::from_ymd_opt(year?, month, day)?;
    Some(date.and_time(parse_clock(text)?))
}

/// Wall-clock reading whose year may be missing; the latest year not after
/// `reference` is assumed, since sales open before the match they are for.
pub fn parse_clock_near(text: &str, reference: NaiveDateTime) -> Option<NaiveDateTime> {
    let (day, month, year) = parse_day_month(text)?;
    let time = parse_clock(text)?;
    if let Some(year) = year {
        return Some(NaiveDate::from_ymd_opt(year, month, day)?.and_time(time));
    }
    let this_year = NaiveDate::from_ymd_opt(reference.year(), month, day).map(|d| d.and_time(time));
    match this_year {
        Some(candidate) if candidate <= reference => Some(candidate),
        _ => NaiveDate::from_ymd_opt(reference.year() - 1, month, day).map(|d| d.and_time(time)),
    }
}

/// Credit threshold from a requirement line, as digits or a number word.
pub fn parse_credits(text: &str) -> Result<Option<u32>, ParseError> {
    for token in tokens(text) {
        let word = token
            .trim_matches(|c: char| !c.is_ascii_alphanumeric())
            .to_ascii_lowercase();
        if word.is_empty() {
            continue;
        }
        if word.chars().all(|c| c.is_ascii_digit()) {
            return Ok(word.parse().ok());
        }
        if let Some(i) = NUMBER_WORDS.iter().position(|w| *w == word) {
            return Ok(Some(i as u32 + 1));
        }
        if LARGE_NUMBER_WORDS.iter().any(|w| word.starts_with(w)) {
            return Err(ParseError::UnsupportedCredits(clean_text(text)));
        }
    }
    Ok(None)
}

/// "season ticket holders" becomes "ST Holders", "official members" becomes
/// "Members", words are capitalised except "and", and " Sale" is appended
/// unless the name already ends in sale or registration.
pub fn normalize_sale_name(raw: &str, credits: Option<u32>) -> String {
    let title_cased = raw
        .split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            if lower == "and" {
                return lower;
            }
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    let mut name = title_cased
        .replace("Season Ticket Holders", "ST Holders")
        .replace("Official Members", "Members");

    let lower = name.to_lowercase();
    if !lower.ends_with("sale") && !lower.ends_with("registration") {
        name.push_str(" Sale");
    }
    if let Some(n) = credits {
        name.push_str(&format!(" ({n}+)"));
    }
    name
}
