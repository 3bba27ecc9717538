//! Core domain model for salewatch: sales, fixtures, fingerprints and the retry ledger.

pub mod backup;
pub mod calendar;
pub mod fingerprint;
pub mod fixture;
pub mod fixture_list;
pub mod sale;

pub use backup::{format_date, parse_key, Backup};
pub use calendar::{BusyStatus, CalendarEvent, EVENT_DURATION_MINUTES};
pub use fingerprint::{Fingerprint, FingerprintSale};
pub use fixture::{fixture_id, season_for, ChangeState, Fixture, Venue};
pub use fixture_list::{FixtureEntry, FixtureList};
pub use sale::{Sale, SaleStatus, LABEL_SEPARATOR};

pub use chrono_tz::Tz;

pub const CRATE_NAME: &str = "salewatch-core";

/// Timezone the club publishes its sale times in.
pub const DEFAULT_HOME_TZ: Tz = chrono_tz::Europe::London;
