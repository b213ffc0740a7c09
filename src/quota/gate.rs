//! Quota Gate
//!
//! Subscription check before generation and the single debit after it.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::store::{QuotaStore, WriteOutcome};
use crate::error::PipelineError;

/// Per-identity debit locks; an entry lives only while someone holds or waits on it
#[derive(Debug, Default)]
struct IdentityLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl IdentityLocks {
    async fn acquire(&self, identity: &str) -> IdentityGuard<'_> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            map.entry(identity.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = lock.clone().lock_owned().await;

        IdentityGuard {
            locks: self,
            identity: identity.to_string(),
            lock,
            guard: Some(guard),
        }
    }

    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

struct IdentityGuard<'a> {
    locks: &'a IdentityLocks,
    identity: String,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdentityGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self.locks.inner.lock().unwrap_or_else(|p| p.into_inner());
        // One reference in the map, one here: nobody else is waiting
        if Arc::strong_count(&self.lock) == 2 {
            map.remove(&self.identity);
        }
    }
}

/// Gate in front of the remote quota store
pub struct QuotaGate {
    store: Arc<dyn QuotaStore>,
    locks: IdentityLocks,
}

impl QuotaGate {
    /// Create a gate over `store`
    pub fn new(store: Arc<dyn QuotaStore>) -> Self {
        Self {
            store,
            locks: IdentityLocks::default(),
        }
    }

    /// Whether the account exists and has at least one turn.
    ///
    /// Lookup errors and unknown accounts both read as `false`.
    pub async fn has_remaining_turns(&self, identity: &str) -> bool {
        match self.store.fetch_turns(identity).await {
            Ok(Some(record)) => record.turns > 0,
            Ok(None) => {
                tracing::debug!("No quota row for {}", identity);
                false
            }
            Err(e) => {
                tracing::warn!(store = self.store.name(), "Quota lookup failed: {}", e);
                false
            }
        }
    }

    /// Debit one turn, returning the turns left afterwards.
    ///
    /// Debits for the same identity are serialized in this process, and the
    /// write only applies if the row still holds the value that was read. A
    /// row already at zero is never written.
    pub async fn decrement_turn(&self, identity: &str) -> Result<i64, PipelineError> {
        let _guard = self.locks.acquire(identity).await;

        let record = match self.store.fetch_turns(identity).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::error!("Quota row for {} disappeared before debit", identity);
                return Err(PipelineError::QuotaFetchFailed);
            }
            Err(e) => {
                tracing::error!(store = self.store.name(), "Quota fetch before debit failed: {}", e);
                return Err(PipelineError::QuotaFetchFailed);
            }
        };

        if record.turns <= 0 {
            tracing::warn!("Refusing to debit {}: no turns left", identity);
            return Err(PipelineError::QuotaUpdateFailed);
        }

        let remaining = record.turns - 1;
        match self
            .store
            .write_turns(identity, remaining, Utc::now(), Some(record.turns))
            .await
        {
            Ok(WriteOutcome::Applied) => Ok(remaining),
            Ok(WriteOutcome::NotApplied) => {
                tracing::error!(
                    "Quota debit for {} not applied: row changed since it was read",
                    identity
                );
                Err(PipelineError::QuotaUpdateFailed)
            }
            Err(e) => {
                tracing::error!(store = self.store.name(), "Quota debit write failed: {}", e);
                Err(PipelineError::QuotaUpdateFailed)
            }
        }
    }

    /// Identities with a debit in flight
    pub fn pending_debits(&self) -> usize {
        self.locks.len()
    }
}
