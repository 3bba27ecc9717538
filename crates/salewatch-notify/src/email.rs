use std::fmt::Write as _;

use maud::{html, Markup};
use salewatch_core::{CalendarEvent, Fixture, Sale, Tz};

use crate::consolidate::CalendarFile;
use crate::mailer::{Attachment, MailMessage};

pub const UPDATE_SUBJECT: &str = "Ticket sales update";
pub const FAILURE_SUBJECT: &str = "salewatch run failed";
pub const ATTACHMENT_NAME: &str = "sales.ics";

fn event_when(event: &CalendarEvent) -> String {
    event.start.format("%a %-d %b %H:%M").to_string()
}

fn sale_when(sale: &Sale, home_tz: Tz) -> String {
    sale.date
        .map(|d| d.with_timezone(&home_tz).format("%a %-d %b %Y %H:%M").to_string())
        .unwrap_or_else(|| "date to be confirmed".to_string())
}

fn text_body(fixtures: &[&Fixture], calendar: &CalendarFile, home_tz: Tz) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "{} upcoming ticket sale windows:", calendar.events.len());
    body.push('\n');
    for event in &calendar.events {
        let _ = writeln!(body, "  {}  {}", event_when(event), event.title);
    }
    if !fixtures.is_empty() {
        body.push_str("\nChanged fixtures:\n");
        for fixture in fixtures {
            let _ = writeln!(body, "\n{}", fixture.match_label());
            for sale in fixture.active_sales() {
                let _ = writeln!(body, "  - {}: {}", sale.name(), sale_when(sale, home_tz));
            }
        }
    }
    body.push_str("\nThe attached calendar holds every window above.\n");
    body
}

fn html_body(fixtures: &[&Fixture], calendar: &CalendarFile, home_tz: Tz) -> Markup {
    html! {
        h2 { "Upcoming ticket sales" }
        ul {
            @for event in &calendar.events {
                li { strong { (event_when(event)) } " " (event.title) }
            }
        }
        @if !fixtures.is_empty() {
            h2 { "Changed fixtures" }
            @for fixture in fixtures {
                h3 { (fixture.match_label()) }
                ul {
                    @for sale in fixture.active_sales() {
                        li { (sale.name()) ": " (sale_when(sale, home_tz)) }
                    }
                }
            }
        }
        p { "The attached calendar holds every window above." }
    }
}

/// Update mail for the changed fixtures with the consolidated calendar attached.
pub fn compose_update(fixtures: &[&Fixture], calendar: &CalendarFile, home_tz: Tz) -> MailMessage {
    MailMessage {
        subject: format!("{UPDATE_SUBJECT} ({} pending)", calendar.events.len()),
        text: text_body(fixtures, calendar, home_tz),
        html: Some(html_body(fixtures, calendar, home_tz).into_string()),
        attachment: Some(Attachment {
            name: ATTACHMENT_NAME.to_string(),
            content: calendar.content.clone().into_bytes(),
        }),
    }
}

pub fn compose_failure(report: &str) -> MailMessage {
    MailMessage {
        subject: FAILURE_SUBJECT.to_string(),
        text: format!("The last salewatch run failed:\n\n{report}\n"),
        html: None,
        attachment: None,
    }
}
