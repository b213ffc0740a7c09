//! Completion Service Client
//!
//! The generation model is reached through the `CompletionClient` seam. The
//! production implementation talks to the Gemini `generateContent` REST
//! endpoint.
//!
//! # Request shape
//!
//! ```json
//! {
//!   "contents": [{ "role": "user", "parts": [{ "text": "<prompt>" }] }],
//!   "generationConfig": {
//!     "temperature": 0.7,
//!     "maxOutputTokens": 8192,
//!     "topK": 40,
//!     "topP": 0.95
//!   }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::config::GenerationConfig;

/// Sampling parameters passed with every completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_k: u32,
    pub top_p: f32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 8192,
            top_k: 40,
            top_p: 0.95,
        }
    }
}

impl From<&GenerationConfig> for SamplingConfig {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_k: config.top_k,
            top_p: config.top_p,
        }
    }
}

/// Errors from the completion service
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Transport(String),

    #[error("completion service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion response could not be decoded: {0}")]
    Decode(String),

    #[error("completion blocked: {0}")]
    Blocked(String),

    #[error("completion returned no text")]
    Empty,
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CompletionError::Decode(err.to_string())
        } else {
            CompletionError::Transport(err.to_string())
        }
    }
}

/// Text completion service
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Complete `prompt` and return the raw response text
    async fn complete(&self, prompt: &str, sampling: &SamplingConfig)
        -> Result<String, CompletionError>;

    /// Model identifier for logs
    fn model(&self) -> &str;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Pull the text out of a `generateContent` response body
fn extract_text(body: &str) -> Result<String, CompletionError> {
    let response: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| CompletionError::Decode(e.to_string()))?;

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(CompletionError::Blocked(reason));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(CompletionError::Empty)?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return match candidate.finish_reason.as_deref() {
            Some("SAFETY") | Some("RECITATION") | Some("PROHIBITED_CONTENT") => Err(
                CompletionError::Blocked(candidate.finish_reason.unwrap_or_default()),
            ),
            _ => Err(CompletionError::Empty),
        };
    }

    Ok(text)
}

/// Gemini REST client
pub struct GeminiClient {
    /// Reqwest HTTP client
    client: reqwest::Client,

    /// API root, e.g. `https://generativelanguage.googleapis.com/v1beta`
    base_url: String,

    /// Model name, e.g. `gemini-2.0-flash`
    model: String,

    /// API key
    api_key: String,
}

impl GeminiClient {
    /// Create a client from configuration
    pub fn new(config: &GenerationConfig) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CompletionError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// `generateContent` endpoint for the configured model
    pub fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    async fn complete(
        &self,
        prompt: &str,
        sampling: &SamplingConfig,
    ) -> Result<String, CompletionError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": sampling.temperature,
                "maxOutputTokens": sampling.max_tokens,
                "topK": sampling.top_k,
                "topP": sampling.top_p,
            },
        });

        tracing::debug!("Sending generateContent to {} ({} prompt bytes)", self.model, prompt.len());

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        extract_text(&text)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
