//! Generation Adapter
//!
//! Prompt in, sanitized document out. Provider failures are logged here and
//! collapse into `PipelineError::GenerationFailed`.

use std::sync::Arc;

use super::client::{CompletionClient, SamplingConfig};
use super::prompt::build_prompt;
use super::sanitize::strip_code_fences;
use crate::error::PipelineError;

/// Wraps the completion service for the pipeline
pub struct GenerationAdapter {
    client: Arc<dyn CompletionClient>,
    sampling: SamplingConfig,
}

impl GenerationAdapter {
    /// Create an adapter over `client`
    pub fn new(client: Arc<dyn CompletionClient>, sampling: SamplingConfig) -> Self {
        Self { client, sampling }
    }

    /// Generate the flowchart document for `code`.
    ///
    /// The returned text is not validated as HTML.
    pub async fn generate(&self, code: &str) -> Result<String, PipelineError> {
        if code.trim().is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let prompt = build_prompt(code);
        let raw = self
            .client
            .complete(&prompt, &self.sampling)
            .await
            .map_err(|e| {
                tracing::error!(model = self.client.model(), "Completion failed: {}", e);
                PipelineError::GenerationFailed
            })?;

        let document = strip_code_fences(&raw);
        tracing::debug!(
            "Generated {} bytes ({} raw) with {}",
            document.len(),
            raw.len(),
            self.client.model()
        );
        Ok(document)
    }
}
