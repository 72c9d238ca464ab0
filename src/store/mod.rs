//! Record store seam.
//!
//! The engines only ever fetch whole tables, fetch one row by id, or upsert
//! one row, so that is the entire trait surface. Rows cross the seam as raw
//! JSON; each domain deserializes them into its own record type.


use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::SupabaseConfig;
use crate::{RagError, Result};

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch every row of a table, unfiltered.
    async fn fetch_all(&self, table: &str) -> Result<Vec<Value>>;

    /// Fetch a single row by its `id` column.
    async fn fetch_by_id(&self, table: &str, id: &str) -> Result<Option<Value>>;

    /// Insert the row, or update the existing one sharing `conflict_key`.
    async fn upsert(&self, table: &str, row: Value, conflict_key: &str) -> Result<()>;
}

/// Supabase PostgREST client backing the production record store.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    base_url: Url,
    service_role_key: String,
    agent: ureq::Agent,
    retry_attempts: u32,
}

impl SupabaseClient {
    #[inline]
    pub fn new(config: &SupabaseConfig) -> Result<Self> {
        let base_url = config
            .rest_url()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            base_url,
            service_role_key: config.service_role_key.clone(),
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    fn table_url(&self, table: &str) -> Result<Url> {
        self.base_url
            .join(&format!("/rest/v1/{}", table))
            .map_err(|e| RagError::Store(format!("Failed to build table URL: {}", e)))
    }

    fn request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            match request_fn() {
                Ok(body) => return Ok(body),
                Err(ureq::Error::StatusCode(status)) if status < 500 => {
                    return Err(RagError::Store(format!(
                        "Record store rejected request: HTTP {}",
                        status
                    )));
                }
                Err(error) => {
                    warn!(
                        "Record store request failed: {}, attempt {}/{}",
                        error, attempt, self.retry_attempts
                    );
                    last_error = Some(RagError::Store(format!("Request error: {}", error)));

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        std::thread::sleep(Duration::from_millis(delay_ms));
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error
            .unwrap_or_else(|| RagError::Store("Request failed after retries".to_string())))
    }
}

#[async_trait]
impl RecordStore for SupabaseClient {
    async fn fetch_all(&self, table: &str) -> Result<Vec<Value>> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut().append_pair("select", "*");

        debug!("Fetching all rows from table {}", table);

        let body = self.request_with_retry(|| {
            self.agent
                .get(url.as_str())
                .header("apikey", &self.service_role_key)
                .header("Authorization", &format!("Bearer {}", self.service_role_key))
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let rows: Vec<Value> = serde_json::from_str(&body)
            .map_err(|e| RagError::Store(format!("Failed to parse rows: {}", e)))?;

        debug!("Fetched {} rows from table {}", rows.len(), table);
        Ok(rows)
    }

    async fn fetch_by_id(&self, table: &str, id: &str) -> Result<Option<Value>> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("id", &format!("eq.{}", id))
            .append_pair("limit", "1");

        let body = self.request_with_retry(|| {
            self.agent
                .get(url.as_str())
                .header("apikey", &self.service_role_key)
                .header("Authorization", &format!("Bearer {}", self.service_role_key))
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let mut rows: Vec<Value> = serde_json::from_str(&body)
            .map_err(|e| RagError::Store(format!("Failed to parse row: {}", e)))?;

        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows.remove(0)))
        }
    }

    async fn upsert(&self, table: &str, row: Value, conflict_key: &str) -> Result<()> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut()
            .append_pair("on_conflict", conflict_key);

        let payload = serde_json::to_string(&row)
            .map_err(|e| RagError::Store(format!("Failed to serialize row: {}", e)))?;

        debug!("Upserting row into table {}", table);

        self.request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("apikey", &self.service_role_key)
                .header("Authorization", &format!("Bearer {}", self.service_role_key))
                .header("Content-Type", "application/json")
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .send(&payload)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        Ok(())
    }
}
