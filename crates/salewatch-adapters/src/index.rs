use chrono::TimeZone;
use salewatch_core::{Fixture, FixtureList, Tz, Venue};
use scraper::{ElementRef, Html};
use tracing::debug;

use crate::text::{clean_text, parse_dated_clock};
use crate::{first_attr, first_text, is_home_team, selector, ParseError};

/// Opposition names containing these are women's fixtures, which are not tracked.
const SKIPPED_OPPOSITION: [&str; 2] = ["women", "ladies"];

pub fn is_skipped_opposition(opposition: &str) -> bool {
    let lower = opposition.to_lowercase();
    SKIPPED_OPPOSITION.iter().any(|word| lower.contains(word))
}

/// Parse the ticket availability index into `list`, returning how many fixtures were added.
pub fn parse_index_page(
    list: &mut FixtureList,
    html: &str,
    home_club: &str,
    home_tz: Tz,
) -> Result<usize, ParseError> {
    if html.trim().is_empty() {
        return Err(ParseError::EmptyPage);
    }
    let document = Html::parse_document(html);
    let fixture_sel = selector("a.fixture")?;

    let blocks: Vec<ElementRef<'_>> = document.select(&fixture_sel).collect();
    if blocks.is_empty() {
        return Err(ParseError::PageStructure(
            "no fixture blocks on index page".to_string(),
        ));
    }

    let mut added = 0;
    for block in blocks {
        if let Some(fixture) = parse_fixture_block(block, home_club, home_tz)? {
            debug!(fixture_id = fixture.id(), "parsed fixture");
            list.push(fixture);
            added += 1;
        }
    }
    Ok(added)
}

fn parse_fixture_block(
    block: ElementRef<'_>,
    home_club: &str,
    home_tz: Tz,
) -> Result<Option<Fixture>, ParseError> {
    let team_sel = selector(".team")?;
    let teams: Vec<String> = block
        .select(&team_sel)
        .map(|t| clean_text(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .collect();
    if teams.len() < 2 {
        return Err(ParseError::PageStructure(format!(
            "fixture block has {} team names",
            teams.len()
        )));
    }
    let opposition = teams
        .iter()
        .find(|t| !is_home_team(t, home_club))
        .ok_or_else(|| {
            ParseError::PageStructure(format!("no opposition in {} v {}", teams[0], teams[1]))
        })?;

    if is_skipped_opposition(opposition) {
        debug!(opposition = %opposition, "skipping women's fixture");
        return Ok(None);
    }

    let url = block
        .value()
        .attr("href")
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .ok_or_else(|| ParseError::PageStructure(format!("fixture {opposition} has no link")))?;

    let kickoff_text = first_text(block, &selector(".kickoff")?)
        .ok_or_else(|| ParseError::PageStructure(format!("fixture {opposition} has no kickoff")))?;
    let kickoff_local = parse_dated_clock(&kickoff_text).ok_or_else(|| {
        ParseError::PageStructure(format!("unreadable kickoff {kickoff_text:?}"))
    })?;
    let kickoff = home_tz
        .from_local_datetime(&kickoff_local)
        .earliest()
        .ok_or_else(|| {
            ParseError::PageStructure(format!("kickoff {kickoff_local} does not exist in {home_tz}"))
        })?;

    let venue = first_text(block, &selector(".venue")?)
        .map(|code| Venue::from_code(&code))
        .unwrap_or(Venue::Unknown);

    let logo_sel = selector("img.competition-logo")?;
    let competition = first_text(block, &selector(".competition")?)
        .or_else(|| first_attr(block, &logo_sel, "alt"))
        .unwrap_or_else(|| "Unknown".to_string());

    Ok(Some(Fixture::new(url, opposition.as_str(), venue, competition, kickoff)))
}
