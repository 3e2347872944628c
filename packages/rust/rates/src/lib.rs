//! Exchange-rate lookups with run-scoped caching, retry, and stale fallback.
//!
//! Rate-accuracy rules compare student entries against the current USD rate
//! table. The table is fetched at most once per run; transient failures are
//! retried with exponential backoff, and when every attempt fails a
//! previously fetched table is served instead. A cold cache surfaces a
//! `Lookup` error and the affected rules score zero; the batch never aborts
//! because the rate service is down.

mod countries;

pub use countries::{country_entry, currency_for_country, is_valid_code};

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use sheetgrader_shared::{RatesConfig, Result, SheetGraderError};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// User-Agent string for lookup requests.
const USER_AGENT: &str = concat!("SheetGrader/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// RateTable
// ---------------------------------------------------------------------------

/// Exchange-rate table for one base currency.
#[derive(Debug, Clone)]
pub struct RateTable {
    /// Base currency code (normally `USD`).
    pub base: String,
    /// Units of each currency per one unit of the base.
    pub rates: HashMap<String, f64>,
}

impl RateTable {
    /// Rate for `code`, case-insensitive.
    pub fn rate(&self, code: &str) -> Option<f64> {
        self.rates.get(code.trim().to_uppercase().as_str()).copied()
    }
}

/// Response shape of the `latest` rates endpoint (open.er-api.com).
#[derive(Debug, Deserialize)]
struct LatestResponse {
    result: String,
    #[serde(default)]
    base_code: String,
    #[serde(default)]
    rates: HashMap<String, f64>,
}

// ---------------------------------------------------------------------------
// RateClient
// ---------------------------------------------------------------------------

/// One cached fetch. A stale entry is kept for fallback until replaced.
#[derive(Debug, Clone)]
struct CacheEntry {
    table: RateTable,
    fetched_at: DateTime<Utc>,
    stale: bool,
}

/// HTTP client for the rate endpoint with a run-scoped cache.
///
/// Build one per run. The cache lock is held across the fetch, so concurrent
/// callers on a cold cache wait for a single fetch instead of issuing their
/// own; every individual attempt is bounded by the configured timeout.
#[derive(Debug)]
pub struct RateClient {
    client: Client,
    config: RatesConfig,
    cache: Mutex<Option<CacheEntry>>,
}

impl RateClient {
    pub fn new(config: &RatesConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SheetGraderError::Lookup(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: config.clone(),
            cache: Mutex::new(None),
        })
    }

    /// Current rate table, fetched at most once per run.
    ///
    /// On fetch failure after retries, a stale table from an earlier fetch is
    /// served when one exists; with a cold cache the error propagates.
    #[instrument(skip_all)]
    pub async fn table(&self) -> Result<RateTable> {
        let mut cache = self.cache.lock().await;

        if let Some(entry) = cache.as_ref() {
            if !entry.stale {
                debug!(base = %entry.table.base, "rate table served from cache");
                return Ok(entry.table.clone());
            }
        }

        match self.fetch_with_retry().await {
            Ok(table) => {
                info!(base = %table.base, codes = table.rates.len(), "rate table fetched");
                *cache = Some(CacheEntry {
                    table: table.clone(),
                    fetched_at: Utc::now(),
                    stale: false,
                });
                Ok(table)
            }
            Err(e) => {
                if let Some(entry) = cache.as_ref() {
                    let age_secs = (Utc::now() - entry.fetched_at).num_seconds();
                    warn!(error = %e, age_secs, "rate fetch failed, serving stale table");
                    return Ok(entry.table.clone());
                }
                Err(e)
            }
        }
    }

    /// Units of `code` per one base-currency unit.
    ///
    /// `Lookup` when the table cannot be fetched or the code is not in it.
    pub async fn resolve(&self, code: &str) -> Result<f64> {
        let table = self.table().await?;
        table
            .rate(code)
            .ok_or_else(|| SheetGraderError::Lookup(format!("no rate for currency code {code:?}")))
    }

    /// Mark the cached table stale. It stays available for fallback; the
    /// next call fetches a fresh one.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.lock().await;
        if let Some(entry) = cache.as_mut() {
            entry.stale = true;
        }
    }

    async fn fetch_with_retry(&self) -> Result<RateTable> {
        let mut last_err = SheetGraderError::Lookup("rate lookup disabled: max_retries = 0".into());

        for attempt in 0..self.config.max_retries {
            if attempt > 0 {
                let delay = self.config.backoff_base_ms * (1u64 << (attempt - 1));
                debug!(attempt, delay_ms = delay, "backing off before retry");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self.fetch_once().await {
                Ok(table) => return Ok(table),
                Err(e) => {
                    warn!(attempt, error = %e, "rate fetch attempt failed");
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }

    async fn fetch_once(&self) -> Result<RateTable> {
        let response = self
            .client
            .get(&self.config.base_url)
            .send()
            .await
            .map_err(|e| SheetGraderError::Lookup(format!("{}: {e}", self.config.base_url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SheetGraderError::Lookup(format!(
                "{}: HTTP {status}",
                self.config.base_url
            )));
        }

        let body: LatestResponse = response
            .json()
            .await
            .map_err(|e| SheetGraderError::Lookup(format!("malformed rate response: {e}")))?;

        if body.result != "success" {
            return Err(SheetGraderError::Lookup(format!(
                "rate endpoint returned result {:?}",
                body.result
            )));
        }

        let base = if body.base_code.is_empty() {
            "USD".to_string()
        } else {
            body.base_code
        };

        Ok(RateTable {
            base,
            rates: body.rates,
        })
    }
}
