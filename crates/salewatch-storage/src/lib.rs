//! Page fetching and fingerprint/backup persistence for salewatch.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info_span, Instrument};

mod sqlite;
mod store;

pub use sqlite::SqliteStore;
pub use store::{FixtureStore, MemoryStore, StoreError, StoreKind};

pub const CRATE_NAME: &str = "salewatch-storage";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Fetch a page as text. One attempt, no caching.
#[async_trait]
pub trait PageFetch: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: resp.url().to_string(),
            });
        }
        let body = resp.text().await?;
        debug!(bytes = body.len(), "fetched page");
        Ok(body)
    }
}

#[async_trait]
impl PageFetch for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        self.get_text(url)
            .instrument(info_span!("http_fetch", url))
            .await
    }
}
