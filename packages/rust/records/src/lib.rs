//! Airtable records-store export.
//!
//! [`RecordsClient`] writes each search result as one record, optionally
//! skipping links that already exist in the table. Every request, duplicate
//! checks included, passes through a per-client rate limiter.

mod fields;

use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{NaiveDate, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use greylit_shared::{GreylitError, RecordsConfig, Result, ResultSet};

pub use fields::{INITIAL_STATUS, RecordFields, extract_domain};

/// Counters for one save batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaveStats {
    pub processed: usize,
    pub created: usize,
    pub duplicates: usize,
    pub errors: usize,
}

/// Progress callback for a save batch, called once per processed record.
pub trait SaveProgress: Send + Sync {
    fn record_processed(&self, _total: usize, _stats: &SaveStats) {}
}

/// No-op save progress.
pub struct SilentSaveProgress;

impl SaveProgress for SilentSaveProgress {}

#[derive(Serialize)]
struct CreateRequest<'a> {
    fields: &'a RecordFields,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    records: Vec<serde_json::Value>,
}

/// Client for one Airtable table.
pub struct RecordsClient {
    table_url: String,
    token: String,
    check_duplicates: bool,
    client: Client,
    limiter: DefaultDirectRateLimiter,
    interrupt: Option<Arc<AtomicBool>>,
}

impl RecordsClient {
    pub fn new(config: RecordsConfig) -> Result<Self> {
        let mut url = url::Url::parse(&config.endpoint).map_err(|e| {
            GreylitError::config(format!("invalid records endpoint {}: {e}", config.endpoint))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                GreylitError::config(format!("records endpoint {} cannot take a path", config.endpoint))
            })?
            .pop_if_empty()
            .push(&config.base_id)
            .push(&config.table_name);

        let per_second = NonZeroU32::new(config.writes_per_second)
            .ok_or_else(|| GreylitError::config("records writes_per_second must be at least 1"))?;

        let client = Client::builder()
            .user_agent(concat!("Greylit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GreylitError::Network(format!("failed to build HTTP client: {e}")))?;

        // Burst of one: requests are spaced evenly, never front-loaded.
        let quota = Quota::per_second(per_second).allow_burst(NonZeroU32::MIN);

        Ok(Self {
            table_url: url.to_string(),
            token: config.token,
            check_duplicates: config.check_duplicates,
            client,
            limiter: RateLimiter::direct(quota),
            interrupt: None,
        })
    }

    /// Stop between records once `flag` is set.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Save every result of every set. Per-record failures are counted, never fatal.
    #[instrument(skip_all, fields(sets = sets.len()))]
    pub async fn save_results(&self, sets: &[ResultSet], progress: &dyn SaveProgress) -> SaveStats {
        self.save_results_on(sets, Utc::now().date_naive(), progress)
            .await
    }

    /// [`save_results`](Self::save_results) with an explicit `scraped_at` date.
    pub async fn save_results_on(
        &self,
        sets: &[ResultSet],
        scraped_at: NaiveDate,
        progress: &dyn SaveProgress,
    ) -> SaveStats {
        let total: usize = sets.iter().map(ResultSet::len).sum();
        let mut stats = SaveStats::default();

        'sets: for set in sets {
            let search_query = set.search_query();
            for result in &set.results {
                if self.interrupted() {
                    warn!(remaining = total - stats.processed, "records export interrupted");
                    break 'sets;
                }
                let fields = RecordFields::from_result(result, &search_query, scraped_at);
                match self.save_one(&fields).await {
                    Ok(true) => stats.created += 1,
                    Ok(false) => stats.duplicates += 1,
                    Err(e) => {
                        stats.errors += 1;
                        let message = e.to_string();
                        match error_hint(&message) {
                            Some(hint) => warn!(link = %fields.link, error = %message, hint, "record not saved"),
                            None => warn!(link = %fields.link, error = %message, "record not saved"),
                        }
                    }
                }
                stats.processed += 1;
                progress.record_processed(total, &stats);
            }
        }

        info!(
            processed = stats.processed,
            created = stats.created,
            duplicates = stats.duplicates,
            errors = stats.errors,
            "records export complete"
        );
        stats
    }

    /// Create one record. `Ok(false)` means the link already exists.
    async fn save_one(&self, fields: &RecordFields) -> Result<bool> {
        if fields.link.is_empty() {
            return Err(GreylitError::Records("result has no link".into()));
        }

        if self.check_duplicates {
            match self.find_by_link(&fields.link).await {
                Ok(true) => {
                    debug!(link = %fields.link, "duplicate, skipped");
                    return Ok(false);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(link = %fields.link, error = %e, "duplicate check failed, creating anyway");
                }
            }
        }

        self.create(fields).await?;
        Ok(true)
    }

    /// Whether a record with this link already exists.
    pub async fn find_by_link(&self, link: &str) -> Result<bool> {
        self.limiter.until_ready().await;
        let response = self
            .client
            .get(&self.table_url)
            .bearer_auth(&self.token)
            .query(&[
                ("filterByFormula", fields::link_formula(link)),
                ("maxRecords", "1".to_string()),
            ])
            .send()
            .await
            .map_err(|e| GreylitError::Records(e.to_string()))?;

        let response = check_status(response).await?;
        let body: ListResponse = response
            .json()
            .await
            .map_err(|e| GreylitError::Records(format!("invalid list response: {e}")))?;
        Ok(!body.records.is_empty())
    }

    /// Create a record from `fields`.
    pub async fn create(&self, fields: &RecordFields) -> Result<()> {
        self.limiter.until_ready().await;
        let response = self
            .client
            .post(&self.table_url)
            .bearer_auth(&self.token)
            .json(&CreateRequest { fields })
            .send()
            .await
            .map_err(|e| GreylitError::Records(e.to_string()))?;

        check_status(response).await?;
        debug!(link = %fields.link, "record created");
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(GreylitError::Records(format!(
        "HTTP {status}: {}",
        error_detail(status, &text)
    )))
}

/// Airtable reports errors as `{"error": "TYPE"}` or `{"error": {"type", "message"}}`.
fn error_detail(status: StatusCode, body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return status.canonical_reason().unwrap_or("unknown error").to_string();
    };
    match &value["error"] {
        serde_json::Value::String(kind) => kind.clone(),
        serde_json::Value::Object(obj) => {
            let kind = obj.get("type").and_then(|v| v.as_str()).unwrap_or_default();
            let message = obj.get("message").and_then(|v| v.as_str()).unwrap_or_default();
            match (kind.is_empty(), message.is_empty()) {
                (false, false) => format!("{kind}: {message}"),
                (false, true) => kind.to_string(),
                _ => message.to_string(),
            }
        }
        _ => body.to_string(),
    }
}

/// Operator hint for common setup mistakes.
fn error_hint(message: &str) -> Option<&'static str> {
    if message.contains("403") || message.contains("INVALID_PERMISSIONS") {
        Some("check the token has data.records:write scope and access to this base and table")
    } else if message.contains("404") || message.contains("NOT_FOUND") {
        Some("check the table name and that field names match the table schema")
    } else {
        None
    }
}
