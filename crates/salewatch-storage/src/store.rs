use std::collections::BTreeMap;

use async_trait::async_trait;
use salewatch_core::{parse_key, Backup, Fingerprint};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored record {key} is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("serializing record {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("fixture {0} already exists")]
    AlreadyExists(String),
    #[error("fixture {0} does not exist")]
    Missing(String),
}

/// Which persistence backend a run uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
    Sqlite { database_url: String },
    Memory,
    Disabled,
}

impl StoreKind {
    /// `SALEWATCH_STORE` picks the backend explicitly; otherwise sqlite is used when a
    /// database URL is configured.
    pub fn select(explicit: Option<&str>, database_url: Option<&str>) -> Self {
        match (explicit.map(str::to_ascii_lowercase).as_deref(), database_url) {
            (Some("memory"), _) => StoreKind::Memory,
            (Some("none") | Some("disabled"), _) => StoreKind::Disabled,
            (Some("sqlite") | None, Some(url)) if !url.trim().is_empty() => StoreKind::Sqlite {
                database_url: url.to_string(),
            },
            _ => StoreKind::Disabled,
        }
    }
}

/// Key-value persistence for fixture fingerprints and unsent-event backups.
#[async_trait]
pub trait FixtureStore: Send + Sync {
    async fn create_tables_if_absent(&self) -> Result<(), StoreError>;
    async fn drop_tables(&self) -> Result<(), StoreError>;

    async fn get_fingerprint(&self, fixture_id: &str) -> Result<Option<Fingerprint>, StoreError>;
    async fn put_fingerprint(&self, fingerprint: &Fingerprint) -> Result<(), StoreError>;
    async fn update_fingerprint(&self, fingerprint: &Fingerprint) -> Result<(), StoreError>;

    /// Insert or replace the backup stored under the backup's date key.
    async fn save_backup(&self, backup: &Backup) -> Result<(), StoreError>;
    /// Every stored backup, oldest first. Each scan bumps the attempt counters.
    async fn scan_backups(&self) -> Result<Vec<Backup>, StoreError>;
    async fn delete_backup(&self, key: &str) -> Result<(), StoreError>;

    /// Forget every fingerprint and backup.
    async fn reset(&self) -> Result<(), StoreError>;
}

pub(crate) fn backup_from_record(key: &str, events_json: &str, attempts: i64) -> Result<Backup, StoreError> {
    let date = parse_key(key).ok_or_else(|| StoreError::Corrupt {
        key: key.to_string(),
        reason: "backup key is not YYYYMMDD".to_string(),
    })?;
    let backup = Backup::from_json(date, events_json).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    Ok(backup.with_attempts(u32::try_from(attempts).unwrap_or(u32::MAX)))
}

#[derive(Debug, Default)]
struct MemoryState {
    fingerprints: BTreeMap<String, Fingerprint>,
    backups: BTreeMap<String, Backup>,
}

/// In-process store; state lives as long as the value does.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FixtureStore for MemoryStore {
    async fn create_tables_if_absent(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn drop_tables(&self) -> Result<(), StoreError> {
        self.reset().await
    }

    async fn get_fingerprint(&self, fixture_id: &str) -> Result<Option<Fingerprint>, StoreError> {
        Ok(self.state.lock().await.fingerprints.get(fixture_id).cloned())
    }

    async fn put_fingerprint(&self, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.fingerprints.contains_key(&fingerprint.id) {
            return Err(StoreError::AlreadyExists(fingerprint.id.clone()));
        }
        state
            .fingerprints
            .insert(fingerprint.id.clone(), fingerprint.clone());
        Ok(())
    }

    async fn update_fingerprint(&self, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        match state.fingerprints.get_mut(&fingerprint.id) {
            Some(slot) => {
                *slot = fingerprint.clone();
                Ok(())
            }
            None => Err(StoreError::Missing(fingerprint.id.clone())),
        }
    }

    async fn save_backup(&self, backup: &Backup) -> Result<(), StoreError> {
        self.state
            .lock()
            .await
            .backups
            .insert(backup.key(), backup.clone());
        Ok(())
    }

    async fn scan_backups(&self) -> Result<Vec<Backup>, StoreError> {
        let mut state = self.state.lock().await;
        let mut out = Vec::with_capacity(state.backups.len());
        for backup in state.backups.values_mut() {
            *backup = backup.clone().with_attempts(backup.attempts().saturating_add(1));
            out.push(backup.clone());
        }
        Ok(out)
    }

    async fn delete_backup(&self, key: &str) -> Result<(), StoreError> {
        self.state.lock().await.backups.remove(key);
        Ok(())
    }

    async fn reset(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.fingerprints.clear();
        state.backups.clear();
        Ok(())
    }
}
