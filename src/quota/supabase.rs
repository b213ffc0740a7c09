//! Supabase (PostgREST) quota store
//!
//! Reads and writes the subscription table over the REST interface:
//!
//! - fetch: `GET /rest/v1/<table>?select=turns,updated_at&<column>=eq.<identity>&limit=1`
//! - write: `PATCH /rest/v1/<table>?<column>=eq.<identity>[&turns=eq.<expected>]`
//!   with `Prefer: return=representation`; an empty returned array means no
//!   row matched the filter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::store::{QuotaRecord, QuotaStore, StoreError, WriteOutcome};
use crate::config::QuotaStoreConfig;

/// Row shape returned by PostgREST
#[derive(Debug, Deserialize)]
struct TurnsRow {
    turns: i64,
    #[serde(default)]
    updated_at: Option<String>,
}

impl From<TurnsRow> for QuotaRecord {
    fn from(row: TurnsRow) -> Self {
        let updated_at = row
            .updated_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        Self {
            turns: row.turns,
            updated_at,
        }
    }
}

/// Quota store backed by a Supabase table
pub struct SupabaseQuotaStore {
    /// Reqwest HTTP client
    client: reqwest::Client,

    /// `<project>/rest/v1/<table>`
    table_url: String,

    /// Service key, sent as `apikey` and bearer token
    api_key: String,

    /// Column holding the account email
    identity_column: String,
}

impl SupabaseQuotaStore {
    /// Create a store from configuration
    pub fn new(config: &QuotaStoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        let table_url = format!(
            "{}/rest/v1/{}",
            config.url.trim_end_matches('/'),
            config.table
        );

        Ok(Self {
            client,
            table_url,
            api_key: config.api_key.clone(),
            identity_column: config.identity_column.clone(),
        })
    }

    /// Table endpoint URL
    pub fn table_url(&self) -> &str {
        &self.table_url
    }

    fn url_with(&self, params: &[(String, String)]) -> Result<Url, StoreError> {
        Url::parse_with_params(&self.table_url, params)
            .map_err(|e| StoreError::Unavailable(format!("invalid quota store URL: {}", e)))
    }

    fn identity_filter(&self, identity: &str) -> (String, String) {
        (self.identity_column.clone(), format!("eq.{}", identity))
    }

    async fn read_rows(response: reqwest::Response) -> Result<Vec<TurnsRow>, StoreError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

#[async_trait]
impl QuotaStore for SupabaseQuotaStore {
    async fn fetch_turns(&self, identity: &str) -> Result<Option<QuotaRecord>, StoreError> {
        let url = self.url_with(&[
            ("select".to_string(), "turns,updated_at".to_string()),
            self.identity_filter(identity),
            ("limit".to_string(), "1".to_string()),
        ])?;

        tracing::debug!("Fetching quota row for {}", identity);

        let response = self
            .client
            .get(url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .send()
            .await?;

        let rows = Self::read_rows(response).await?;
        Ok(rows.into_iter().next().map(QuotaRecord::from))
    }

    async fn write_turns(
        &self,
        identity: &str,
        turns: i64,
        updated_at: DateTime<Utc>,
        expected: Option<i64>,
    ) -> Result<WriteOutcome, StoreError> {
        let mut params = vec![self.identity_filter(identity)];
        if let Some(expected) = expected {
            params.push(("turns".to_string(), format!("eq.{}", expected)));
        }
        let url = self.url_with(&params)?;

        tracing::debug!("Writing turns={} for {} (expected {:?})", turns, identity, expected);

        let response = self
            .client
            .patch(url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=representation")
            .json(&json!({
                "turns": turns,
                "updated_at": updated_at.to_rfc3339(),
            }))
            .send()
            .await?;

        let rows = Self::read_rows(response).await?;
        if rows.is_empty() {
            Ok(WriteOutcome::NotApplied)
        } else {
            Ok(WriteOutcome::Applied)
        }
    }

    fn name(&self) -> &str {
        "supabase"
    }
}
