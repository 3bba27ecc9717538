//! Event consolidation, iCalendar encoding and mail delivery for salewatch.

pub mod consolidate;
pub mod email;
pub mod ics;
pub mod mailer;

pub use consolidate::{build_calendar, consolidate, merge_events, CalendarFile};
pub use email::{compose_failure, compose_update, ATTACHMENT_NAME};
pub use ics::{CalendarEncoder, CalendarError, IcsEncoder};
pub use mailer::{Attachment, BrevoConfig, BrevoMailer, Delivery, MailMessage, Mailer, MailerError};

pub const CRATE_NAME: &str = "salewatch-notify";
