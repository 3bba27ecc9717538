//! Run orchestration: fetch, parse, sync against the store, consolidate and mail.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use salewatch_adapters::{download_all, page_url, parse_index_page};
use salewatch_core::{Backup, CalendarEvent, FixtureList, Tz, DEFAULT_HOME_TZ};
use salewatch_notify::{
    build_calendar, compose_failure, compose_update, BrevoConfig, BrevoMailer, CalendarEncoder, Delivery, IcsEncoder,
    Mailer,
};
use salewatch_storage::{
    FixtureStore, HttpClientConfig, HttpFetcher, MemoryStore, PageFetch, SqliteStore, StoreKind,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

mod protocol;

pub use protocol::{sync_all, sync_fixture, SyncFailure};

pub const CRATE_NAME: &str = "salewatch-sync";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub domain: Option<String>,
    pub index_path: String,
    pub home_club: String,
    pub home_tz: Tz,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub store: StoreKind,
    pub mail: Option<BrevoConfig>,
    pub scheduler_enabled: bool,
    pub sync_cron: String,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let home_tz = match get("SALEWATCH_HOME_TZ") {
            Some(name) => name.parse::<Tz>().unwrap_or_else(|_| {
                warn!(%name, "unknown SALEWATCH_HOME_TZ, using Europe/London");
                DEFAULT_HOME_TZ
            }),
            None => DEFAULT_HOME_TZ,
        };

        Self {
            domain: get("SALEWATCH_DOMAIN"),
            index_path: get("SALEWATCH_INDEX_PATH")
                .unwrap_or_else(|| "/tickets/tickets-availability".to_string()),
            home_club: get("SALEWATCH_HOME_CLUB").unwrap_or_else(|| "Liverpool FC".to_string()),
            home_tz,
            user_agent: get("SALEWATCH_USER_AGENT").unwrap_or_else(|| "salewatch-bot/0.1".to_string()),
            http_timeout_secs: get("SALEWATCH_HTTP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            store: StoreKind::select(
                get("SALEWATCH_STORE").as_deref(),
                get("DATABASE_URL").as_deref(),
            ),
            mail: BrevoConfig::from_parts(
                get("BREVO_API_KEY"),
                get("MAIL_FROM"),
                get("MAIL_FROM_NAME"),
                get("MAIL_TO"),
            ),
            scheduler_enabled: get("SALEWATCH_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            sync_cron: get("SYNC_CRON").unwrap_or_else(|| "0 0 8,12,18 * * *".to_string()),
        }
    }
}

pub async fn open_store(kind: &StoreKind) -> Result<Option<Arc<dyn FixtureStore>>> {
    let store: Arc<dyn FixtureStore> = match kind {
        StoreKind::Sqlite { database_url } => Arc::new(
            SqliteStore::connect(database_url)
                .await
                .with_context(|| format!("opening sqlite store {database_url}"))?,
        ),
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::Disabled => return Ok(None),
    };
    Ok(Some(store))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// No site domain configured; nothing was fetched.
    NotConfigured,
    /// Another run held the run lock.
    AlreadyRunning,
    /// No pending events survived consolidation.
    NothingToSend,
    Sent,
    /// Mail transport not configured; backups were left alone.
    MailSkipped,
    /// Mail transport failed; today's events were backed up for the next run.
    MailFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fixtures: usize,
    pub active_fixtures: usize,
    pub changed_fixtures: usize,
    pub detail_failures: bool,
    pub sync_failures: usize,
    pub restored_backups: usize,
    pub pending_events: usize,
    pub outcome: RunOutcome,
}

impl RunSummary {
    fn empty(run_id: Uuid, started_at: DateTime<Utc>, outcome: RunOutcome) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: started_at,
            fixtures: 0,
            active_fixtures: 0,
            changed_fixtures: 0,
            detail_failures: false,
            sync_failures: 0,
            restored_backups: 0,
            pending_events: 0,
            outcome,
        }
    }

    /// False when any part of the run degraded.
    pub fn is_clean(&self) -> bool {
        !self.detail_failures && self.sync_failures == 0 && self.outcome != RunOutcome::MailFailed
    }
}

pub type SharedEncoder = Arc<dyn CalendarEncoder + Send + Sync>;

pub struct SyncPipeline {
    config: SyncConfig,
    fetcher: Arc<dyn PageFetch>,
    store: Option<Arc<dyn FixtureStore>>,
    mailer: Arc<dyn Mailer>,
    encoder: Option<SharedEncoder>,
    run_lock: Mutex<()>,
}

impl SyncPipeline {
    pub fn new(
        config: SyncConfig,
        fetcher: Arc<dyn PageFetch>,
        store: Option<Arc<dyn FixtureStore>>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            config,
            fetcher,
            store,
            mailer,
            encoder: None,
            run_lock: Mutex::new(()),
        }
    }

    /// Replace the default `IcsEncoder`, which is stamped with each run's time.
    pub fn with_encoder(mut self, encoder: SharedEncoder) -> Self {
        self.encoder = Some(encoder);
        self
    }

    fn encoder(&self, now: DateTime<Utc>) -> SharedEncoder {
        match &self.encoder {
            Some(encoder) => Arc::clone(encoder),
            None => Arc::new(IcsEncoder::new(now)),
        }
    }

    /// Real collaborators as described by `config`.
    pub async fn from_config(config: SyncConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
        })?;
        let store = open_store(&config.store).await?;
        let mailer = BrevoMailer::new(config.mail.clone());
        Ok(Self::new(config, Arc::new(fetcher), store, Arc::new(mailer)))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> Option<&dyn FixtureStore> {
        self.store.as_deref()
    }

    /// Fetch and parse the index and every detail page without touching the store.
    pub async fn fetch_fixtures(&self) -> Result<(FixtureList, bool)> {
        let domain = self
            .config
            .domain
            .as_deref()
            .context("SALEWATCH_DOMAIN is not set")?;
        let index_url = page_url(domain, &self.config.index_path);
        let index_html = self
            .fetcher
            .fetch_text(&index_url)
            .await
            .with_context(|| format!("fetching index page {index_url}"))?;

        let mut list = FixtureList::new();
        let count = parse_index_page(&mut list, &index_html, &self.config.home_club, self.config.home_tz)
            .context("parsing index page")?;
        info!(fixtures = count, "parsed index page");

        let details_ok = download_all(
            &mut list,
            self.fetcher.as_ref(),
            Some(domain),
            &self.config.home_club,
            self.config.home_tz,
        )
        .await;
        Ok((list, details_ok))
    }

    pub async fn run_once(&self) -> Result<RunSummary> {
        self.run_once_at(Utc::now()).await
    }

    pub async fn run_once_at(&self, now: DateTime<Utc>) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        self.run_inner(run_id, now)
            .instrument(info_span!("sync_run", %run_id))
            .await
    }

    async fn run_inner(&self, run_id: Uuid, now: DateTime<Utc>) -> Result<RunSummary> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            warn!("a run is already in progress, skipping");
            return Ok(RunSummary::empty(run_id, now, RunOutcome::AlreadyRunning));
        };
        if self.config.domain.is_none() {
            warn!("SALEWATCH_DOMAIN is not set, nothing to fetch");
            return Ok(RunSummary::empty(run_id, now, RunOutcome::NotConfigured));
        }
        let tz = self.config.home_tz;
        let store = self.store.as_deref();

        if let Some(store) = store {
            if let Err(err) = store.create_tables_if_absent().await {
                warn!(error = %err, "could not ensure store tables");
            }
        }

        let (mut list, details_ok) = self.fetch_fixtures().await?;
        if !details_ok {
            warn!("one or more detail pages failed; continuing with what parsed");
        }

        let restored = match store {
            Some(store) => store.scan_backups().await.unwrap_or_else(|err| {
                warn!(error = %err, "could not read backups");
                Vec::new()
            }),
            None => Vec::new(),
        };
        for backup in &restored {
            info!(key = %backup.key(), attempts = backup.attempts(), events = backup.events().len(), "restored backup");
        }

        let failures = sync_all(store, &mut list, now).await;

        let fresh = list.changes(tz);
        let pending: Vec<CalendarEvent> = fresh
            .iter()
            .cloned()
            .chain(restored.iter().flat_map(|b| b.events().iter().cloned()))
            .collect();

        let now_local = now.with_timezone(&tz).naive_local();
        let encoder = self.encoder(now);
        let calendar = match build_calendar(&*encoder, pending, now_local) {
            Ok(calendar) => calendar,
            Err(err) => {
                // Fingerprints are already stored, so unsent changes only survive in a backup.
                self.back_up(now_local.date(), fresh, &restored).await;
                return Err(err).context("encoding calendar");
            }
        };

        let mut summary = RunSummary {
            run_id,
            started_at: now,
            finished_at: now,
            fixtures: list.len(),
            active_fixtures: list.active_count(),
            changed_fixtures: list.changed_fixtures().len(),
            detail_failures: !details_ok,
            sync_failures: failures.len(),
            restored_backups: restored.len(),
            pending_events: calendar.as_ref().map(|c| c.events.len()).unwrap_or(0),
            outcome: RunOutcome::NothingToSend,
        };

        let Some(calendar) = calendar else {
            info!("no pending sales to send");
            self.delete_backups(&restored).await;
            summary.finished_at = Utc::now();
            return Ok(summary);
        };

        let message = compose_update(&list.changed_fixtures(), &calendar, tz);
        summary.outcome = match self.mailer.send(&message).await {
            Ok(Delivery::Sent) => {
                info!(events = calendar.events.len(), "update sent");
                self.delete_backups(&restored).await;
                RunOutcome::Sent
            }
            Ok(Delivery::Skipped) => RunOutcome::MailSkipped,
            Err(err) => {
                error!(error = %err, "update mail failed, backing up today's changes");
                self.back_up(now_local.date(), fresh, &restored).await;
                RunOutcome::MailFailed
            }
        };
        summary.finished_at = Utc::now();
        Ok(summary)
    }

    async fn delete_backups(&self, restored: &[Backup]) {
        let Some(store) = self.store.as_deref() else {
            return;
        };
        for backup in restored {
            if let Err(err) = store.delete_backup(&backup.key()).await {
                warn!(key = %backup.key(), error = %err, "could not delete backup");
            }
        }
    }

    async fn back_up(&self, today: chrono::NaiveDate, fresh: Vec<CalendarEvent>, restored: &[Backup]) {
        let Some(store) = self.store.as_deref() else {
            warn!("no fixture store configured, unsent changes are lost");
            return;
        };
        let mut backup = Backup::new(today, fresh);
        if let Some(existing) = restored.iter().find(|b| b.is_today(today)) {
            let mut merged = existing.clone();
            merged.merge(&backup);
            backup = merged;
        }
        if backup.is_empty() {
            return;
        }
        match store.save_backup(&backup).await {
            Ok(()) => info!(key = %backup.key(), events = backup.events().len(), "saved backup"),
            Err(err) => error!(key = %backup.key(), error = %err, "could not save backup"),
        }
    }

    /// Run once; on error send a best-effort failure notification and return the error.
    pub async fn run_and_report(&self) -> Result<RunSummary> {
        self.run_and_report_at(Utc::now()).await
    }

    pub async fn run_and_report_at(&self, now: DateTime<Utc>) -> Result<RunSummary> {
        match self.run_once_at(now).await {
            Ok(summary) => Ok(summary),
            Err(err) => {
                error!(error = %format!("{err:#}"), "run failed");
                if let Err(mail_err) = self.mailer.send(&compose_failure(&format!("{err:#}"))).await {
                    warn!(error = %mail_err, "could not send failure notification");
                }
                Err(err)
            }
        }
    }

    /// A scheduler running `run_and_report` on every `SYNC_CRON` tick, when enabled.
    pub async fn maybe_build_scheduler(self: &Arc<Self>) -> Result<Option<JobScheduler>> {
        if !self.config.scheduler_enabled {
            return Ok(None);
        }

        let sched = JobScheduler::new().await.context("creating scheduler")?;
        let pipeline = Arc::clone(self);
        let cron = self.config.sync_cron.clone();
        let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
            let pipeline = Arc::clone(&pipeline);
            Box::pin(async move {
                match pipeline.run_and_report().await {
                    Ok(summary) => info!(outcome = ?summary.outcome, "scheduled run finished"),
                    Err(err) => error!(error = %format!("{err:#}"), "scheduled run failed"),
                }
            })
        })
        .with_context(|| format!("creating scheduler job for cron {cron}"))?;
        sched.add(job).await.context("adding scheduler job")?;
        Ok(Some(sched))
    }
}
