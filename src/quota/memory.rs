//! In-memory quota store
//!
//! Used when no Supabase project is configured and by the tests. Honours the
//! same conditional-write contract as the remote store. A store built with
//! `recording()` also logs every call so tests can assert what the pipeline
//! touched.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::store::{QuotaRecord, QuotaStore, StoreError, WriteOutcome};

/// A call made against the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Fetch { identity: String },
    Write { identity: String, turns: i64 },
}

/// Quota rows held in process memory
#[derive(Debug, Default)]
pub struct InMemoryQuotaStore {
    records: Mutex<HashMap<String, QuotaRecord>>,
    calls: Mutex<Vec<StoreCall>>,
    record_calls: bool,
    fail_fetches: AtomicBool,
    fail_writes: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryQuotaStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that keeps a log of every call
    pub fn recording() -> Self {
        Self {
            record_calls: true,
            ..Self::default()
        }
    }

    /// Builder-style seed of one account
    pub fn with_turns(self, identity: &str, turns: i64) -> Self {
        self.set_turns(identity, turns);
        self
    }

    /// Set an account's turns
    pub fn set_turns(&self, identity: &str, turns: i64) {
        lock(&self.records).insert(identity.to_string(), QuotaRecord::new(turns));
    }

    /// Drop an account's row
    pub fn remove(&self, identity: &str) {
        lock(&self.records).remove(identity);
    }

    /// Current turns for an account
    pub fn turns(&self, identity: &str) -> Option<i64> {
        lock(&self.records).get(identity).map(|r| r.turns)
    }

    /// Full row for an account
    pub fn record(&self, identity: &str) -> Option<QuotaRecord> {
        lock(&self.records).get(identity).cloned()
    }

    fn log_call(&self, call: StoreCall) {
        if self.record_calls {
            lock(&self.calls).push(call);
        }
    }

    /// Every call made so far; always empty unless built with `recording()`
    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.calls).clone()
    }

    /// Calls that touched `identity`
    pub fn calls_for(&self, identity: &str) -> Vec<StoreCall> {
        self.calls()
            .into_iter()
            .filter(|call| match call {
                StoreCall::Fetch { identity: id } | StoreCall::Write { identity: id, .. } => {
                    id == identity
                }
            })
            .collect()
    }

    /// Make fetches fail with `Unavailable`
    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    /// Make writes fail with `Unavailable`
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Delay every call, to simulate a stalled backend
    pub fn set_delay(&self, delay: Option<Duration>) {
        *lock(&self.delay) = delay;
    }

    async fn pause(&self) {
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn fetch_turns(&self, identity: &str) -> Result<Option<QuotaRecord>, StoreError> {
        self.log_call(StoreCall::Fetch {
            identity: identity.to_string(),
        });
        self.pause().await;

        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("fetch disabled".to_string()));
        }
        Ok(lock(&self.records).get(identity).cloned())
    }

    async fn write_turns(
        &self,
        identity: &str,
        turns: i64,
        updated_at: DateTime<Utc>,
        expected: Option<i64>,
    ) -> Result<WriteOutcome, StoreError> {
        self.log_call(StoreCall::Write {
            identity: identity.to_string(),
            turns,
        });
        self.pause().await;

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write disabled".to_string()));
        }

        let mut records = lock(&self.records);
        match records.get_mut(identity) {
            Some(record) if expected.map_or(true, |e| e == record.turns) => {
                record.turns = turns;
                record.updated_at = Some(updated_at);
                Ok(WriteOutcome::Applied)
            }
            _ => Ok(WriteOutcome::NotApplied),
        }
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_unknown_identity() {
        let store = InMemoryQuotaStore::new();
        assert_eq!(store.fetch_turns("nobody@x.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_conditional_write() {
        let store = InMemoryQuotaStore::new().with_turns("a@x.com", 3);

        let stale = store
            .write_turns("a@x.com", 1, Utc::now(), Some(2))
            .await
            .unwrap();
        assert_eq!(stale, WriteOutcome::NotApplied);
        assert_eq!(store.turns("a@x.com"), Some(3));

        let fresh = store
            .write_turns("a@x.com", 2, Utc::now(), Some(3))
            .await
            .unwrap();
        assert_eq!(fresh, WriteOutcome::Applied);
        assert_eq!(store.turns("a@x.com"), Some(2));
        assert!(store.record("a@x.com").unwrap().updated_at.is_some());
    }

    #[tokio::test]
    async fn test_write_to_missing_row_not_applied() {
        let store = InMemoryQuotaStore::new();
        let outcome = store
            .write_turns("ghost@x.com", 1, Utc::now(), None)
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::NotApplied);
    }

    #[tokio::test]
    async fn test_calls_recorded() {
        let store = InMemoryQuotaStore::recording().with_turns("a@x.com", 1);
        store.fetch_turns("a@x.com").await.unwrap();
        store.fetch_turns("b@x.com").await.unwrap();

        assert_eq!(store.calls().len(), 2);
        assert_eq!(
            store.calls_for("a@x.com"),
            vec![StoreCall::Fetch {
                identity: "a@x.com".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_plain_store_keeps_no_call_log() {
        let store = InMemoryQuotaStore::new().with_turns("a@x.com", 1);
        for _ in 0..1_000 {
            store.fetch_turns("a@x.com").await.unwrap();
        }
        store
            .write_turns("a@x.com", 0, Utc::now(), Some(1))
            .await
            .unwrap();

        assert!(store.calls().is_empty());
        assert_eq!(store.turns("a@x.com"), Some(0));
    }

    #[tokio::test]
    async fn test_failure_switches() {
        let store = InMemoryQuotaStore::new().with_turns("a@x.com", 1);
        store.fail_fetches(true);
        assert!(store.fetch_turns("a@x.com").await.is_err());

        store.fail_writes(true);
        assert!(store
            .write_turns("a@x.com", 0, Utc::now(), Some(1))
            .await
            .is_err());
        assert_eq!(store.turns("a@x.com"), Some(1));
    }
}
