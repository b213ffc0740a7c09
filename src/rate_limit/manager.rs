//! Rate Limiter
//!
//! Process-wide admission gate shared by every in-flight invocation.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::clock::{Clock, SystemClock};
use super::config::RateLimitConfig;
use super::store::{Admission, WindowTable};
use crate::error::PipelineError;
use crate::metrics;

/// Result of a rate limit check
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    /// Whether the request is allowed
    pub allowed: bool,

    /// Requests left in the current window
    pub remaining: u32,

    /// Time until the window closes (if not allowed)
    pub retry_after: Option<Duration>,

    /// Reason for denial (if not allowed)
    pub reason: Option<String>,
}

impl RateLimitResult {
    /// Create an allowed result
    pub fn allowed(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after: None,
            reason: None,
        }
    }

    /// Create a denied result
    pub fn denied(retry_after: Duration, reason: &str) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            retry_after: Some(retry_after),
            reason: Some(reason.to_string()),
        }
    }
}

/// Per-identity fixed-window rate limiter
///
/// Clones share the same table. The check and the increment happen under one
/// write lock, so concurrent requests for the same identity cannot both take
/// the last slot.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Configuration
    config: Arc<RateLimitConfig>,

    /// Window counters
    table: Arc<RwLock<WindowTable>>,

    /// Time source
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a new rate limiter backed by the system clock
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a rate limiter reading time from `clock`
    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            table: Arc::new(RwLock::new(WindowTable::new(&config))),
            config: Arc::new(config),
            clock,
        }
    }

    /// Create with default configuration
    pub fn default_config() -> Self {
        Self::new(RateLimitConfig::default())
    }

    /// Create a disabled rate limiter (for local development)
    pub fn disabled() -> Self {
        Self::new(RateLimitConfig::disabled())
    }

    /// Check and count one request for `identity`
    pub async fn check(&self, identity: &str) -> RateLimitResult {
        if !self.config.enabled {
            return RateLimitResult::allowed(u32::MAX);
        }

        let now = self.clock.now();
        let (admission, tracked) = {
            let mut table = self.table.write().await;
            let admission = table.try_admit(identity, now);
            (admission, table.len())
        };
        metrics::RATE_LIMIT_TRACKED_IDENTITIES.set(tracked as i64);

        match admission {
            Admission::Admitted { remaining } => RateLimitResult::allowed(remaining),
            Admission::Rejected { retry_after } => {
                RateLimitResult::denied(retry_after, "Rate limit exceeded")
            }
        }
    }

    /// Admit a request or fail with `RateLimitExceeded`
    pub async fn admit(&self, identity: &str) -> Result<u32, PipelineError> {
        let result = self.check(identity).await;
        if result.allowed {
            Ok(result.remaining)
        } else {
            metrics::RATE_LIMIT_REJECTIONS_TOTAL.inc();
            Err(PipelineError::RateLimitExceeded {
                retry_after: result.retry_after.unwrap_or_else(|| self.config.window()),
            })
        }
    }

    /// Evict idle entries now
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut table = self.table.write().await;
        let removed = table.sweep(now);
        metrics::RATE_LIMIT_TRACKED_IDENTITIES.set(table.len() as i64);
        removed
    }

    /// Number of identities currently tracked
    pub async fn tracked_identities(&self) -> usize {
        self.table.read().await.len()
    }

    /// Run `sweep` on the configured interval until the handle is aborted
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let limiter = self.clone();
        let period = self.config.sweep_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                let removed = limiter.sweep().await;
                if removed > 0 {
                    tracing::debug!("Rate limiter sweep evicted {} idle identities", removed);
                }
            }
        })
    }

    /// Get current configuration
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}
