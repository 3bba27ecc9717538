use chrono::{DateTime, Utc};
use salewatch_core::{ChangeState, Fixture, FixtureList};
use salewatch_storage::{FixtureStore, StoreError};
use thiserror::Error;
use tracing::{debug, warn};

/// A store call that failed while syncing one fixture. The fixture is
/// treated as changed whichever call failed.
#[derive(Debug, Error)]
pub enum SyncFailure {
    #[error("reading stored fingerprint for {fixture_id}: {source}")]
    Read {
        fixture_id: String,
        #[source]
        source: StoreError,
    },
    #[error("writing fingerprint for {fixture_id}: {source}")]
    Write {
        fixture_id: String,
        #[source]
        source: StoreError,
    },
}

impl SyncFailure {
    pub fn fixture_id(&self) -> &str {
        match self {
            SyncFailure::Read { fixture_id, .. } | SyncFailure::Write { fixture_id, .. } => fixture_id,
        }
    }
}

/// Compare one fixture with its stored fingerprint and record what changed.
///
/// `Err` always means the fixture should be reported as changed.
pub async fn sync_fixture<S>(store: &S, fixture: &Fixture, now: DateTime<Utc>) -> Result<ChangeState, SyncFailure>
where
    S: FixtureStore + ?Sized,
{
    let fixture_id = fixture.id();
    let stored = store
        .get_fingerprint(fixture_id)
        .await
        .map_err(|source| SyncFailure::Read {
            fixture_id: fixture_id.to_string(),
            source,
        })?;
    let current = fixture.fingerprint();

    let write_failure = |source| SyncFailure::Write {
        fixture_id: fixture_id.to_string(),
        source,
    };

    match (stored, current) {
        // Fixtures without active sales are never persisted or reported.
        (_, None) => Ok(ChangeState::Unchanged),
        (None, Some(current)) => {
            store.put_fingerprint(&current).await.map_err(write_failure)?;
            debug!(fixture_id, "new fixture stored");
            Ok(ChangeState::Changed)
        }
        (Some(stored), Some(current)) => {
            if fixture.matches_stored(&stored, now) {
                return Ok(ChangeState::Unchanged);
            }
            store.update_fingerprint(&current).await.map_err(write_failure)?;
            debug!(fixture_id, "fixture changed");
            Ok(ChangeState::Changed)
        }
    }
}

/// Sync every fixture in page order. Without a store every fixture stays
/// `Unknown`, which reports as changed.
pub async fn sync_all<S>(store: Option<&S>, list: &mut FixtureList, now: DateTime<Utc>) -> Vec<SyncFailure>
where
    S: FixtureStore + ?Sized,
{
    let Some(store) = store else {
        warn!("no fixture store configured, every active fixture counts as changed");
        return Vec::new();
    };

    let mut failures = Vec::new();
    for entry in list.entries_mut() {
        match sync_fixture(store, &entry.fixture, now).await {
            Ok(state) => entry.change = state,
            Err(failure) => {
                warn!(error = %failure, "fixture sync failed, treating as changed");
                entry.change = ChangeState::Changed;
                failures.push(failure);
            }
        }
    }
    failures
}
