//! Rate Limit Configuration
//!
//! Configuration for the per-identity admission window and its eviction policy.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{env_flag, env_parse};

/// Default admission limits
pub const DEFAULT_MAX_REQUESTS: u32 = 10; // requests per window
pub const DEFAULT_WINDOW_SECS: u64 = 60;
pub const DEFAULT_IDLE_TTL_SECS: u64 = 600;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_MAX_IDENTITIES: usize = 100_000;

/// Rate limit configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,

    /// Requests admitted per identity per window
    pub max_requests: u32,

    /// Fixed window length in seconds
    pub window_secs: u64,

    /// Entries not seen for this long are evicted
    pub idle_ttl_secs: u64,

    /// How often the background sweep runs
    pub sweep_interval_secs: u64,

    /// Upper bound on tracked identities
    pub max_identities: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: DEFAULT_MAX_REQUESTS,
            window_secs: DEFAULT_WINDOW_SECS,
            idle_ttl_secs: DEFAULT_IDLE_TTL_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            max_identities: DEFAULT_MAX_IDENTITIES,
        }
    }
}

impl RateLimitConfig {
    /// Apply `CODEFLOW_RATE_*` overrides. Unparseable values are pushed to `problems`.
    pub fn apply_env_overrides(&mut self, problems: &mut Vec<String>) {
        if let Some(enabled) = env_flag("CODEFLOW_RATE_LIMIT_ENABLED", problems) {
            self.enabled = enabled;
        }
        if let Some(limit) = env_parse("CODEFLOW_RATE_LIMIT", problems) {
            self.max_requests = limit;
        }
        if let Some(secs) = env_parse("CODEFLOW_RATE_WINDOW_SECS", problems) {
            self.window_secs = secs;
        }
        if let Some(secs) = env_parse("CODEFLOW_RATE_IDLE_TTL_SECS", problems) {
            self.idle_ttl_secs = secs;
        }
        if let Some(secs) = env_parse("CODEFLOW_RATE_SWEEP_SECS", problems) {
            self.sweep_interval_secs = secs;
        }
        if let Some(max) = env_parse("CODEFLOW_RATE_MAX_IDENTITIES", problems) {
            self.max_identities = max;
        }
    }

    /// Get window duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Get idle eviction threshold; never shorter than one window
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs.max(self.window_secs))
    }

    /// Get sweep interval
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Disable rate limiting (for local development)
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            bail!("rate limit must admit at least one request per window");
        }
        if self.window_secs == 0 {
            bail!("rate limit window must be at least one second");
        }
        if self.max_identities == 0 {
            bail!("rate limiter must track at least one identity");
        }
        Ok(())
    }
}
