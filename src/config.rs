// Service Configuration
//
// All settings come from the environment. Credentials for the two external
// services use their conventional names (SUPABASE_URL, SUPABASE_KEY,
// GEMINI_API_KEY); everything else is prefixed with CODEFLOW_.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

pub use crate::rate_limit::RateLimitConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// MCP listener
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Per-identity admission window
    pub rate_limit: RateLimitConfig,

    /// Remote quota store
    pub quota_store: QuotaStoreConfig,

    /// Completion service
    pub generation: GenerationConfig,

    /// Limits on external calls
    pub timeouts: TimeoutConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,

    /// Environment values that could not be parsed, reported by `validate`
    #[serde(skip)]
    env_problems: Vec<String>,
}

/// MCP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub bind_addr: String,

    /// Port to bind
    pub port: u16,

    /// The one routed path carrying JSON-RPC
    pub mcp_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 8787,
            mcp_path: "/mcp".to_string(),
        }
    }
}

impl ServerConfig {
    /// Socket address for the listener
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_addr, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid bind address {}:{}: {}", self.bind_addr, self.port, e))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// PostgREST quota table
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuotaStoreConfig {
    /// Project URL, e.g. `https://abc.supabase.co`
    pub url: String,

    /// Service key sent as `apikey` and bearer token
    pub api_key: String,

    /// Table holding one row per account
    pub table: String,

    /// Column holding the account email
    pub identity_column: String,

    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
}

impl Default for QuotaStoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            table: "subscriptions".to_string(),
            identity_column: "gmail".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl QuotaStoreConfig {
    /// Whether credentials for the remote store were supplied
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.api_key.is_empty()
    }
}

// Keep the key out of logs
impl std::fmt::Debug for QuotaStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaStoreConfig")
            .field("url", &self.url)
            .field("api_key", &redact(&self.api_key))
            .field("table", &self.table)
            .field("identity_column", &self.identity_column)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Completion service configuration
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// API key
    pub api_key: String,

    /// API root
    pub base_url: String,

    /// Model name
    pub model: String,

    pub temperature: f32,
    pub max_tokens: u32,
    pub top_k: u32,
    pub top_p: f32,

    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.0-flash".to_string(),
            temperature: 0.7,
            max_tokens: 8192,
            top_k: 40,
            top_p: 0.95,
            request_timeout_secs: 120,
        }
    }
}

impl std::fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("top_k", &self.top_k)
            .field("top_p", &self.top_p)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

/// Timeouts around the external calls made by the pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Quota check and quota debit, each
    pub store_secs: u64,

    /// Completion call
    pub generation_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            store_secs: 10,
            generation_secs: 120,
        }
    }
}

impl TimeoutConfig {
    pub fn store(&self) -> Duration {
        Duration::from_secs(self.store_secs)
    }

    pub fn generation(&self) -> Duration {
        Duration::from_secs(self.generation_secs)
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to start the metrics listener
    pub enabled: bool,

    /// Port for metrics server
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

/// Parse `key` if it is set. Unparseable values are recorded in `problems`.
pub(crate) fn env_parse<T: std::str::FromStr>(key: &str, problems: &mut Vec<String>) -> Option<T> {
    let val = std::env::var(key).ok()?;
    match val.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            problems.push(format!("{}={:?} could not be parsed", key, val));
            None
        }
    }
}

/// Boolean switch: true/false, 1/0, yes/no, on/off
pub(crate) fn env_flag(key: &str, problems: &mut Vec<String>) -> Option<bool> {
    let val = std::env::var(key).ok()?;
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => {
            problems.push(format!("{}={:?} is not a boolean", key, val));
            None
        }
    }
}

impl Config {
    /// Apply environment variable overrides to the configuration
    ///
    /// - CODEFLOW_BIND_ADDR, CODEFLOW_PORT, CODEFLOW_MCP_PATH
    /// - CODEFLOW_LOG_LEVEL, CODEFLOW_LOG_FORMAT
    /// - CODEFLOW_RATE_* (see `RateLimitConfig::apply_env_overrides`)
    /// - SUPABASE_URL, SUPABASE_KEY, CODEFLOW_QUOTA_TABLE, CODEFLOW_QUOTA_IDENTITY_COLUMN
    /// - GEMINI_API_KEY, CODEFLOW_GEMINI_BASE_URL, CODEFLOW_GEMINI_MODEL,
    ///   CODEFLOW_TEMPERATURE, CODEFLOW_MAX_TOKENS, CODEFLOW_TOP_K, CODEFLOW_TOP_P
    /// - CODEFLOW_STORE_TIMEOUT_SECS, CODEFLOW_GENERATION_TIMEOUT_SECS
    /// - CODEFLOW_METRICS_ENABLED, CODEFLOW_METRICS_PORT
    ///
    /// Unparseable values leave the default in place and make `validate` fail.
    pub fn apply_env_overrides(mut self) -> Self {
        let mut problems = Vec::new();

        // Server
        if let Ok(addr) = std::env::var("CODEFLOW_BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        if let Some(port) = env_parse("CODEFLOW_PORT", &mut problems) {
            self.server.port = port;
        }
        if let Ok(path) = std::env::var("CODEFLOW_MCP_PATH") {
            self.server.mcp_path = path;
        }

        // Logging
        if let Ok(level) = std::env::var("CODEFLOW_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("CODEFLOW_LOG_FORMAT") {
            self.logging.format = format;
        }

        self.rate_limit.apply_env_overrides(&mut problems);

        // Quota store
        if let Ok(url) = std::env::var("SUPABASE_URL") {
            self.quota_store.url = url;
        }
        if let Ok(key) = std::env::var("SUPABASE_KEY") {
            self.quota_store.api_key = key;
        }
        if let Ok(table) = std::env::var("CODEFLOW_QUOTA_TABLE") {
            self.quota_store.table = table;
        }
        if let Ok(column) = std::env::var("CODEFLOW_QUOTA_IDENTITY_COLUMN") {
            self.quota_store.identity_column = column;
        }

        // Generation
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            self.generation.api_key = key;
        }
        if let Ok(url) = std::env::var("CODEFLOW_GEMINI_BASE_URL") {
            self.generation.base_url = url;
        }
        if let Ok(model) = std::env::var("CODEFLOW_GEMINI_MODEL") {
            self.generation.model = model;
        }
        if let Some(t) = env_parse("CODEFLOW_TEMPERATURE", &mut problems) {
            self.generation.temperature = t;
        }
        if let Some(n) = env_parse("CODEFLOW_MAX_TOKENS", &mut problems) {
            self.generation.max_tokens = n;
        }
        if let Some(k) = env_parse("CODEFLOW_TOP_K", &mut problems) {
            self.generation.top_k = k;
        }
        if let Some(p) = env_parse("CODEFLOW_TOP_P", &mut problems) {
            self.generation.top_p = p;
        }

        // Timeouts
        if let Some(secs) = env_parse("CODEFLOW_STORE_TIMEOUT_SECS", &mut problems) {
            self.timeouts.store_secs = secs;
            self.quota_store.request_timeout_secs = secs;
        }
        if let Some(secs) = env_parse("CODEFLOW_GENERATION_TIMEOUT_SECS", &mut problems) {
            self.timeouts.generation_secs = secs;
            self.generation.request_timeout_secs = secs;
        }

        // Metrics
        if let Some(enabled) = env_flag("CODEFLOW_METRICS_ENABLED", &mut problems) {
            self.metrics.enabled = enabled;
        }
        if let Some(port) = env_parse("CODEFLOW_METRICS_PORT", &mut problems) {
            self.metrics.port = port;
        }

        self.env_problems = problems;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.env_problems.is_empty() {
            bail!("Invalid environment: {}", self.env_problems.join("; "));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        if !self.server.mcp_path.starts_with('/') {
            bail!("MCP path must start with '/': {}", self.server.mcp_path);
        }

        self.rate_limit.validate()?;

        if self.quota_store.url.is_empty() != self.quota_store.api_key.is_empty() {
            bail!("SUPABASE_URL and SUPABASE_KEY must be set together");
        }
        if self.quota_store.table.is_empty() || self.quota_store.identity_column.is_empty() {
            bail!("Quota table and identity column must not be empty");
        }

        if !(0.0..=2.0).contains(&self.generation.temperature) {
            bail!("Temperature must be within 0.0..=2.0");
        }
        if !(0.0..=1.0).contains(&self.generation.top_p) {
            bail!("top_p must be within 0.0..=1.0");
        }
        if self.generation.max_tokens == 0 || self.generation.top_k == 0 {
            bail!("max_tokens and top_k must be > 0");
        }
        if self.generation.model.is_empty() {
            bail!("Generation model must not be empty");
        }

        if self.timeouts.store_secs == 0 || self.timeouts.generation_secs == 0 {
            bail!("Timeouts must be > 0");
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                bail!("Metrics port must be > 0");
            }
            if self.metrics.port == self.server.port {
                bail!("Metrics port must differ from the MCP port");
            }
        }

        Ok(())
    }
}
