//! Parsers for the club's ticket availability pages and the sequential detail download loop.

use salewatch_core::{Fixture, FixtureList, Tz};
use salewatch_storage::PageFetch;
use scraper::{ElementRef, Selector};
use thiserror::Error;
use tracing::{error, info, warn};

pub mod detail;
pub mod index;
pub mod text;

pub use detail::parse_detail_page;
pub use index::{is_skipped_opposition, parse_index_page};

pub const CRATE_NAME: &str = "salewatch-adapters";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("page is empty")]
    EmptyPage,
    #[error("page structure changed: {0}")]
    PageStructure(String),
    #[error("page is not for {expected}, its title reads {found:?}")]
    WrongFixture { expected: String, found: String },
    #[error("credit requirement {0:?} is above nineteen")]
    UnsupportedCredits(String),
    #[error("invalid selector {0}")]
    Selector(String),
}

pub(crate) fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::Selector(format!("{css}: {e}")))
}

pub(crate) fn first_text(scope: ElementRef<'_>, sel: &Selector) -> Option<String> {
    scope
        .select(sel)
        .next()
        .map(|n| text::clean_text(&n.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

pub(crate) fn first_attr(scope: ElementRef<'_>, sel: &Selector, attr: &str) -> Option<String> {
    scope
        .select(sel)
        .next()
        .and_then(|n| n.value().attr(attr))
        .map(text::clean_text)
        .filter(|t| !t.is_empty())
}

/// Lowercased club name without a trailing "FC"/"AFC", as it appears in page titles.
pub fn home_key(home_club: &str) -> String {
    let lower = home_club.trim().to_lowercase();
    for suffix in [" afc", " fc"] {
        if let Some(stripped) = lower.strip_suffix(suffix) {
            return stripped.trim_end().to_string();
        }
    }
    lower
}

/// "Liverpool" and "Liverpool Women" both count as the home side of "Liverpool FC".
pub fn is_home_team(team: &str, home_club: &str) -> bool {
    let key = home_key(home_club);
    let team = team.trim().to_lowercase();
    team == key || team == home_club.trim().to_lowercase() || team.starts_with(&format!("{key} "))
}

/// Absolute URL for a page path on the configured site.
pub fn page_url(domain: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        domain.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Fetch a fixture's detail page. `None` on transport failure or when no site is configured.
pub async fn download_detail<F>(fetcher: &F, domain: Option<&str>, fixture: &Fixture) -> Option<String>
where
    F: PageFetch + ?Sized,
{
    let Some(domain) = domain else {
        warn!(fixture_id = fixture.id(), "no site domain configured, skipping download");
        return None;
    };
    let url = page_url(domain, fixture.url());
    match fetcher.fetch_text(&url).await {
        Ok(html) => Some(html),
        Err(err) => {
            warn!(fixture_id = fixture.id(), %url, error = %err, "detail download failed");
            None
        }
    }
}

/// Download and parse every fixture's detail page, one at a time in page order.
///
/// Failures are logged and the loop carries on; the result is false when any
/// fixture could not be downloaded or parsed.
pub async fn download_all<F>(
    list: &mut FixtureList,
    fetcher: &F,
    domain: Option<&str>,
    home_club: &str,
    home_tz: Tz,
) -> bool
where
    F: PageFetch + ?Sized,
{
    let mut all_ok = true;
    for entry in list.entries_mut() {
        let fixture = &mut entry.fixture;
        let Some(html) = download_detail(fetcher, domain, fixture).await else {
            all_ok = false;
            continue;
        };
        match parse_detail_page(fixture, &html, home_club, home_tz) {
            Ok(count) => info!(
                fixture_id = fixture.id(),
                sales = count,
                active = fixture.active_sale_count(),
                "parsed detail page"
            ),
            Err(err) => {
                error!(fixture_id = fixture.id(), error = %err, "detail page parse failed");
                all_ok = false;
            }
        }
    }
    all_ok
}
