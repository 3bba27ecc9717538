use chrono::{TimeZone, Utc};
use salewatch_core::{Fixture, Sale, SaleStatus, Tz};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::text::{normalize_sale_name, parse_clock, parse_clock_near, parse_credits};
use crate::{first_text, home_key, selector, ParseError};

struct SaleSelectors {
    block: Selector,
    name: Selector,
    requirement: Selector,
    status: Selector,
    when: Selector,
    buy_from: Selector,
    date: Selector,
}

impl SaleSelectors {
    fn new() -> Result<Self, ParseError> {
        Ok(Self {
            block: selector("div.sale")?,
            name: selector(".sale-name")?,
            requirement: selector(".sale-requirement")?,
            status: selector(".sale-status")?,
            when: selector(".sale-when")?,
            buy_from: selector(".sale-buy-from")?,
            date: selector(".sale-date")?,
        })
    }
}

/// Replace the fixture's sales with those listed on its detail page.
///
/// The page title must name both the opposition and the home club, so a
/// stale link that now points at another match is rejected instead of
/// attaching its sales to the wrong fixture.
pub fn parse_detail_page(
    fixture: &mut Fixture,
    html: &str,
    home_club: &str,
    home_tz: Tz,
) -> Result<usize, ParseError> {
    if html.trim().is_empty() {
        return Err(ParseError::EmptyPage);
    }
    let document = Html::parse_document(html);
    let root = document.root_element();

    let title = first_text(root, &selector("h1.fixture-title")?)
        .ok_or_else(|| ParseError::PageStructure("detail page has no fixture title".to_string()))?;
    let lower_title = title.to_lowercase();
    if !lower_title.contains(&fixture.opposition().to_lowercase())
        || !lower_title.contains(&home_key(home_club))
    {
        return Err(ParseError::WrongFixture {
            expected: format!("{} v {}", home_club, fixture.opposition()),
            found: title,
        });
    }

    let selectors = SaleSelectors::new()?;
    let kickoff_local = fixture.kickoff().with_timezone(&home_tz).naive_local();

    let mut sales = Vec::new();
    for block in root.select(&selectors.block) {
        sales.push(parse_sale_block(fixture, block, &selectors, kickoff_local, home_tz)?);
    }

    fixture.clear_sales();
    let count = sales.len();
    for sale in sales {
        debug!(fixture_id = fixture.id(), sale = %sale.description, status = ?sale.status, "parsed sale");
        fixture.push_sale(sale);
    }
    Ok(count)
}

fn parse_sale_block(
    fixture: &Fixture,
    block: ElementRef<'_>,
    selectors: &SaleSelectors,
    kickoff_local: chrono::NaiveDateTime,
    home_tz: Tz,
) -> Result<Sale, ParseError> {
    let raw_name = first_text(block, &selectors.name)
        .ok_or_else(|| ParseError::PageStructure(format!("sale block on {} has no name", fixture.label())))?;
    let credits = match first_text(block, &selectors.requirement) {
        Some(requirement) => parse_credits(&requirement)?,
        None => None,
    };
    let status = first_text(block, &selectors.status)
        .map(|keyword| SaleStatus::classify(&keyword))
        .unwrap_or(SaleStatus::Pending);

    let local = if let Some(when) = first_text(block, &selectors.when) {
        parse_clock_near(&when, kickoff_local)
    } else if let Some(buy_from) = first_text(block, &selectors.buy_from) {
        let day = first_text(block, &selectors.date).unwrap_or_default();
        parse_clock(&buy_from)
            .and_then(|time| parse_clock_near(&format!("{day} {}", time.format("%H:%M")), kickoff_local))
    } else {
        None
    };

    let date = local.and_then(|local| {
        let resolved = home_tz
            .from_local_datetime(&local)
            .earliest()
            .map(|d| d.with_timezone(&Utc));
        if resolved.is_none() {
            warn!(%local, "sale time does not exist in the home timezone");
        }
        resolved
    });

    let description = fixture.describe_sale(&normalize_sale_name(&raw_name, credits));
    Ok(Sale::new(description, status, date))
}
