//! Quota Store Seam
//!
//! The remote row store that owns each account's prepaid turns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One account's quota row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    /// Remaining paid uses
    pub turns: i64,

    /// Last time the row was written
    pub updated_at: Option<DateTime<Utc>>,
}

impl QuotaRecord {
    pub fn new(turns: i64) -> Self {
        Self {
            turns,
            updated_at: None,
        }
    }
}

/// Whether a conditional write reached the row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The row held the expected value and was updated
    Applied,
    /// No row matched (missing, or changed since it was read)
    NotApplied,
}

/// Errors talking to the quota store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("quota store request failed: {0}")]
    Transport(String),

    #[error("quota store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("quota store response could not be decoded: {0}")]
    Decode(String),

    #[error("quota store unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::Decode(err.to_string())
        } else {
            StoreError::Transport(err.to_string())
        }
    }
}

/// Remote quota store
///
/// `write_turns` with `expected: Some(n)` must only update a row that still
/// holds `n` turns. That precondition is what keeps a decrement from
/// overwriting a concurrent one made by another process.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Read the account row, `None` if the identity is unknown
    async fn fetch_turns(&self, identity: &str) -> Result<Option<QuotaRecord>, StoreError>;

    /// Write a new turns value
    async fn write_turns(
        &self,
        identity: &str,
        turns: i64,
        updated_at: DateTime<Utc>,
        expected: Option<i64>,
    ) -> Result<WriteOutcome, StoreError>;

    /// Short backend name for logs
    fn name(&self) -> &str;
}
