use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use salewatch_core::{Backup, Fingerprint};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::info;

use crate::store::{backup_from_record, FixtureStore, StoreError};

/// sqlx-backed store. One connection, so `sqlite::memory:` databases behave like files.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(30));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        info!(database_url, "connected to sqlite store");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn fingerprint_json(fingerprint: &Fingerprint) -> Result<String, StoreError> {
    fingerprint.to_json().map_err(|source| StoreError::Serialize {
        key: fingerprint.id.clone(),
        source,
    })
}

#[async_trait]
impl FixtureStore for SqliteStore {
    async fn create_tables_if_absent(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fixtures (
                id TEXT PRIMARY KEY,
                fingerprint TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS backups (
                date_key TEXT PRIMARY KEY,
                events TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn drop_tables(&self) -> Result<(), StoreError> {
        sqlx::query("DROP TABLE IF EXISTS fixtures")
            .execute(&self.pool)
            .await?;
        sqlx::query("DROP TABLE IF EXISTS backups")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_fingerprint(&self, fixture_id: &str) -> Result<Option<Fingerprint>, StoreError> {
        let row = sqlx::query("SELECT fingerprint FROM fixtures WHERE id = ?")
            .bind(fixture_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let json: String = row.try_get("fingerprint")?;
        Fingerprint::from_json(&json)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                key: fixture_id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn put_fingerprint(&self, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        let json = fingerprint_json(fingerprint)?;
        let result = sqlx::query(
            "INSERT INTO fixtures (id, fingerprint, updated_at) VALUES (?, ?, ?) ON CONFLICT(id) DO NOTHING",
        )
        .bind(&fingerprint.id)
        .bind(&json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(fingerprint.id.clone()));
        }
        Ok(())
    }

    async fn update_fingerprint(&self, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        let json = fingerprint_json(fingerprint)?;
        let result = sqlx::query("UPDATE fixtures SET fingerprint = ?, updated_at = ? WHERE id = ?")
            .bind(&json)
            .bind(Utc::now().to_rfc3339())
            .bind(&fingerprint.id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(fingerprint.id.clone()));
        }
        Ok(())
    }

    async fn save_backup(&self, backup: &Backup) -> Result<(), StoreError> {
        let key = backup.key();
        let events = backup.to_json().map_err(|source| StoreError::Serialize {
            key: key.clone(),
            source,
        })?;
        sqlx::query(
            r#"
            INSERT INTO backups (date_key, events, attempts) VALUES (?, ?, ?)
            ON CONFLICT(date_key) DO UPDATE SET events = excluded.events, attempts = excluded.attempts
            "#,
        )
        .bind(&key)
        .bind(&events)
        .bind(i64::from(backup.attempts()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn scan_backups(&self) -> Result<Vec<Backup>, StoreError> {
        sqlx::query("UPDATE backups SET attempts = attempts + 1")
            .execute(&self.pool)
            .await?;
        let rows = sqlx::query("SELECT date_key, events, attempts FROM backups ORDER BY date_key")
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let key: String = row.try_get("date_key")?;
            let events: String = row.try_get("events")?;
            let attempts: i64 = row.try_get("attempts")?;
            out.push(backup_from_record(&key, &events, attempts)?);
        }
        Ok(out)
    }

    async fn delete_backup(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM backups WHERE date_key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reset(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM fixtures").execute(&self.pool).await?;
        sqlx::query("DELETE FROM backups").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use salewatch_core::{CalendarEvent, FingerprintSale};

    async fn store() -> SqliteStore {
        let store = SqliteStore::connect("sqlite::memory:").await.expect("connect");
        store.create_tables_if_absent().await.expect("tables");
        store
    }

    fn fingerprint() -> Fingerprint {
        Fingerprint {
            id: "2024-chelsea-h-premier-league".into(),
            match_label: "Chelsea (H) : Premier League 2024/25".into(),
            sales: vec![FingerprintSale {
                description: "Chelsea (H) : Members Sale (13+)".into(),
                date: Utc.with_ymd_and_hms(2024, 10, 15, 7, 15, 0).single().unwrap(),
            }],
        }
    }

    #[tokio::test]
    async fn fingerprints_round_trip_through_sqlite() {
        let store = store().await;
        let fp = fingerprint();
        assert!(store.get_fingerprint(&fp.id).await.unwrap().is_none());
        store.put_fingerprint(&fp).await.unwrap();
        assert_eq!(store.get_fingerprint(&fp.id).await.unwrap(), Some(fp.clone()));
        assert!(matches!(
            store.put_fingerprint(&fp).await,
            Err(StoreError::AlreadyExists(_))
        ));

        let mut updated = fp.clone();
        updated.sales.clear();
        store.update_fingerprint(&updated).await.unwrap();
        assert_eq!(store.get_fingerprint(&fp.id).await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn update_of_unknown_fixture_fails() {
        let store = store().await;
        assert!(matches!(
            store.update_fingerprint(&fingerprint()).await,
            Err(StoreError::Missing(_))
        ));
    }

    #[tokio::test]
    async fn backups_are_scanned_with_attempt_counts_and_deleted() {
        let store = store().await;
        let date = NaiveDate::from_ymd_opt(2024, 10, 3).unwrap();
        let backup = Backup::new(
            date,
            vec![CalendarEvent::new("Chelsea (H) : Members Sale (13+)", date.and_hms_opt(8, 15, 0).unwrap())],
        );
        store.save_backup(&backup).await.unwrap();

        let scanned = store.scan_backups().await.unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].events(), backup.events());
        assert_eq!(scanned[0].attempts(), 1);
        assert_eq!(store.scan_backups().await.unwrap()[0].attempts(), 2);

        store.delete_backup(&backup.key()).await.unwrap();
        assert!(store.scan_backups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn drop_and_recreate_tables_is_idempotent() {
        let store = store().await;
        store.put_fingerprint(&fingerprint()).await.unwrap();
        store.create_tables_if_absent().await.unwrap();
        store.drop_tables().await.unwrap();
        store.drop_tables().await.unwrap();
        store.create_tables_if_absent().await.unwrap();
        assert!(store.get_fingerprint(&fingerprint().id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_database_survives_reconnect() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("salewatch.db").display());

        let first = SqliteStore::connect(&url).await.expect("connect");
        first.create_tables_if_absent().await.unwrap();
        first.put_fingerprint(&fingerprint()).await.unwrap();
        first.pool.close().await;

        let second = SqliteStore::connect(&url).await.expect("reconnect");
        assert_eq!(
            second.get_fingerprint(&fingerprint().id).await.unwrap(),
            Some(fingerprint())
        );
    }
}
